//! Task engine: day rollover, stage gates, and the per-kind check
//! dispatch

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use terminus_core::{
    advance_stage, Error, Milestone, Player, Result, RewardRouting, StageAdvance,
    TaskCheckOutcome, TaskDefinition, TaskKind, TaskProgress,
};
use terminus_persistence::sqlite::{self, CreditOptions};
use tracing::{debug, instrument};

use crate::ledger;
use crate::verify::{verdict, ExternalVerifier};

/// Lazy day-rollover and gate re-evaluation, run before a snapshot.
///
/// Recurring tasks completed on an earlier day reset to incomplete;
/// staged tasks waiting at a gate advance from stored timestamps alone.
#[instrument(skip(pool))]
pub async fn refresh(pool: &SqlitePool, player_id: &str, now: DateTime<Utc>) -> Result<()> {
    let definitions = sqlite::list_definitions(pool).await?;

    for def in definitions {
        let mut progress = sqlite::get_progress(pool, player_id, def.id).await?;

        if def.kind.is_recurring()
            && progress.completed
            && progress.last_completed_date != Some(now.date_naive())
        {
            progress.completed = false;
            sqlite::save_progress(pool, &progress).await?;
            continue;
        }

        if progress.at_gate_stage() {
            if let Some(final_stage) = def.kind.final_stage() {
                match advance_stage(&mut progress, def.kind.gate_duration(), final_stage, now) {
                    Ok(StageAdvance::Finished) => {
                        debug!("Gate elapsed, task {} finished on refresh", def.id);
                        let player = sqlite::require_player(pool, player_id).await?;
                        complete(pool, &player, &def, &mut progress, now).await?;
                    }
                    Ok(StageAdvance::Advanced { .. }) => {
                        sqlite::save_progress(pool, &progress).await?;
                    }
                    Err(Error::TooEarly) => {}
                    Err(e) => return Err(e),
                }
            }
        }
    }

    Ok(())
}

/// Check one task for a player and dispatch by kind.
#[instrument(skip(pool, verifier))]
pub async fn check_task(
    pool: &SqlitePool,
    verifier: &dyn ExternalVerifier,
    player_id: &str,
    task_id: i64,
    now: DateTime<Utc>,
) -> Result<TaskCheckOutcome> {
    let player = sqlite::require_player(pool, player_id).await?;
    let def = sqlite::get_definition(pool, task_id).await?;
    let mut progress = sqlite::get_progress(pool, player_id, task_id).await?;

    let today = now.date_naive();

    // Recurring completion lapses at day rollover even without a
    // snapshot refresh in between.
    if def.kind.is_recurring()
        && progress.completed
        && progress.last_completed_date != Some(today)
    {
        progress.completed = false;
    }

    // Re-checking a finished task never re-credits.
    if progress.completed {
        return Ok(TaskCheckOutcome::AlreadyCompleted);
    }

    match &def.kind {
        TaskKind::OpenLink { .. } | TaskKind::MultiStageDelayed { .. } => {
            let final_stage = def
                .kind
                .final_stage()
                .ok_or_else(|| Error::InvalidData("staged kind without final stage".into()))?;
            match advance_stage(&mut progress, def.kind.gate_duration(), final_stage, now)? {
                StageAdvance::Finished => complete(pool, &player, &def, &mut progress, now).await,
                StageAdvance::Advanced { stage } => {
                    sqlite::save_progress(pool, &progress).await?;
                    Ok(TaskCheckOutcome::Advanced { stage })
                }
            }
        }

        TaskKind::NftOwnership { collection } => {
            let Some(wallet) = &player.wallet_address else {
                return Ok(pending("link a wallet address first"));
            };
            if verdict(verifier.check_nft_ownership(wallet, collection).await) {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending("no matching NFT found yet"))
            }
        }

        TaskKind::ChannelSubscription { channel_id } => {
            if verdict(verifier.check_channel_subscription(channel_id, player_id).await) {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending("subscription not confirmed yet"))
            }
        }

        TaskKind::OnChainTransfer {
            min_amount,
            to_address,
        } => {
            let Some(wallet) = &player.wallet_address else {
                return Ok(pending("link a wallet address first"));
            };
            if verdict(
                verifier
                    .check_onchain_transfer(wallet, *min_amount, to_address)
                    .await,
            ) {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending("transfer not found yet"))
            }
        }

        TaskKind::PeriodicRecurring => complete(pool, &player, &def, &mut progress, now).await,

        TaskKind::FriendCountThreshold { friends } => {
            let invited = sqlite::count_invitees(pool, player_id).await?;
            if invited >= *friends {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending(&format!("{invited} of {friends} friends invited")))
            }
        }

        TaskKind::InternalMilestone { milestone } => {
            let holds = match milestone {
                Milestone::LinkedWalletAddress => player.wallet_address.is_some(),
                Milestone::ClanCreator => sqlite::get_membership(pool, player_id)
                    .await?
                    .map(|m| m.is_creator())
                    .unwrap_or(false),
            };
            if holds {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending("milestone not reached yet"))
            }
        }

        TaskKind::SpendThreshold { threshold } => {
            let total = sqlite::get_purchase(pool, player_id)
                .await?
                .map(|r| r.total_accumulated)
                .unwrap_or(0.0);
            if total >= *threshold {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                Ok(pending("purchase total below threshold"))
            }
        }

        TaskKind::ConsecutiveDaysChallenge { target_days } => {
            // Self-verifying check-in: the check itself is the day's
            // success, capped at one per calendar day.
            if progress.last_completed_date == Some(today) {
                return Err(Error::AlreadyCheckedToday);
            }

            let yesterday = today - Duration::days(1);
            progress.streak_days = if progress.last_completed_date == Some(yesterday) {
                progress.streak_days + 1
            } else {
                1
            };
            progress.last_completed_date = Some(today);

            if progress.streak_days >= *target_days {
                complete(pool, &player, &def, &mut progress, now).await
            } else {
                let streak = progress.streak_days;
                sqlite::save_progress(pool, &progress).await?;
                Ok(TaskCheckOutcome::Advanced { stage: streak })
            }
        }
    }
}

/// Insert a definition and retroactively seed progress for every
/// existing player.
pub async fn add_definition(
    pool: &SqlitePool,
    title: &str,
    reward_coins: i64,
    routing: RewardRouting,
    kind: TaskKind,
) -> Result<TaskDefinition> {
    if reward_coins < 0 {
        return Err(Error::Validation("task reward must not be negative".into()));
    }

    let id = sqlite::add_definition_for_all(pool, title, reward_coins, routing, &kind).await?;
    debug!("Task definition {} added: {}", id, title);

    Ok(TaskDefinition {
        id,
        title: title.to_string(),
        reward_coins,
        routing,
        kind,
    })
}

fn pending(message: &str) -> TaskCheckOutcome {
    TaskCheckOutcome::Pending {
        message: message.to_string(),
    }
}

/// Mark the progress finished and pay the reward through the routing,
/// cascade included, in one transaction.
async fn complete(
    pool: &SqlitePool,
    player: &Player,
    def: &TaskDefinition,
    progress: &mut TaskProgress,
    now: DateTime<Utc>,
) -> Result<TaskCheckOutcome> {
    progress.completed = true;
    if def.kind.is_recurring() || matches!(def.kind, TaskKind::ConsecutiveDaysChallenge { .. }) {
        progress.last_completed_date = Some(now.date_naive());
    }

    let credit = match def.routing {
        RewardRouting::Coin => CreditOptions {
            cascade: ledger::cascade_for(
                pool,
                player,
                player.coins,
                player.coins + def.reward_coins,
            )
            .await?,
            ..Default::default()
        },
        RewardRouting::LeagueScore => CreditOptions::default(),
    };

    debug!("Task {} completed, paying {}", def.id, def.reward_coins);
    sqlite::complete_with_reward(pool, progress, def.reward_coins, def.routing, credit).await?;

    Ok(TaskCheckOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        seed_player, seed_player_with, t0, test_db, StubVerifier,
    };

    async fn add(
        db: &terminus_persistence::Database,
        reward: i64,
        routing: RewardRouting,
        kind: TaskKind,
    ) -> i64 {
        add_definition(db.pool(), "test task", reward, routing, kind)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn open_link_waits_a_day_between_steps() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            500,
            RewardRouting::Coin,
            TaskKind::OpenLink {
                url: "https://example.com".into(),
            },
        )
        .await;
        let verifier = StubVerifier::default();

        // Day 1 10:00: opening the link enters the gate stage
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 1 });

        // Day 2 09:59: one minute short
        let early = t0() + Duration::hours(23) + Duration::minutes(59);
        assert!(matches!(
            check_task(db.pool(), &verifier, "p1", task, early).await,
            Err(Error::TooEarly)
        ));
        let progress = sqlite::get_progress(db.pool(), "p1", task).await.unwrap();
        assert_eq!(progress.stage, 1);

        // Day 2 10:01: gate open, task finishes and pays
        let late = t0() + Duration::hours(24) + Duration::minutes(1);
        let out = check_task(db.pool(), &verifier, "p1", task, late).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);

        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 500);
    }

    #[tokio::test]
    async fn completed_task_is_idempotent() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            300,
            RewardRouting::Coin,
            TaskKind::FriendCountThreshold { friends: 0 },
        )
        .await;
        let verifier = StubVerifier::default();

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::AlreadyCompleted);

        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 300);
    }

    #[tokio::test]
    async fn recurring_task_resets_at_day_rollover() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(&db, 100, RewardRouting::Coin, TaskKind::PeriodicRecurring).await;
        let verifier = StubVerifier::default();

        check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::AlreadyCompleted);

        let tomorrow = t0() + Duration::days(1);
        let out = check_task(db.pool(), &verifier, "p1", task, tomorrow).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);

        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 200);
    }

    #[tokio::test]
    async fn failed_external_check_changes_nothing() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.wallet_address = Some("EQwallet".into())).await;
        let task = add(
            &db,
            1_000,
            RewardRouting::Coin,
            TaskKind::NftOwnership {
                collection: "EQcol".into(),
            },
        )
        .await;

        let verifier = StubVerifier::default();
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert!(matches!(out, TaskCheckOutcome::Pending { .. }));

        let progress = sqlite::get_progress(db.pool(), "p1", task).await.unwrap();
        assert!(!progress.completed);

        // Retry succeeds once the verifier says yes
        let verifier = StubVerifier {
            nft: true,
            ..Default::default()
        };
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);
    }

    #[tokio::test]
    async fn verifier_outage_is_a_retryable_negative() {
        struct DownVerifier;

        #[async_trait::async_trait]
        impl crate::verify::ExternalVerifier for DownVerifier {
            async fn check_nft_ownership(&self, _: &str, _: &str) -> terminus_core::Result<bool> {
                Err(Error::VerifierUnavailable("timeout".into()))
            }

            async fn check_channel_subscription(
                &self,
                _: &str,
                _: &str,
            ) -> terminus_core::Result<bool> {
                Err(Error::VerifierUnavailable("timeout".into()))
            }

            async fn check_onchain_transfer(
                &self,
                _: &str,
                _: i64,
                _: &str,
            ) -> terminus_core::Result<bool> {
                Err(Error::VerifierUnavailable("timeout".into()))
            }
        }

        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.wallet_address = Some("EQwallet".into())).await;
        let task = add(
            &db,
            1_000,
            RewardRouting::Coin,
            TaskKind::NftOwnership {
                collection: "EQcol".into(),
            },
        )
        .await;

        let out = check_task(db.pool(), &DownVerifier, "p1", task, t0()).await.unwrap();
        assert!(matches!(out, TaskCheckOutcome::Pending { .. }));

        let progress = sqlite::get_progress(db.pool(), "p1", task).await.unwrap();
        assert!(!progress.completed);
        assert_eq!(progress.stage, 0);
    }

    #[tokio::test]
    async fn nft_check_requires_linked_wallet() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            1_000,
            RewardRouting::Coin,
            TaskKind::NftOwnership {
                collection: "EQcol".into(),
            },
        )
        .await;

        let verifier = StubVerifier {
            nft: true,
            ..Default::default()
        };
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert!(matches!(out, TaskCheckOutcome::Pending { .. }));
    }

    #[tokio::test]
    async fn subscription_check_follows_the_verifier() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            800,
            RewardRouting::Coin,
            TaskKind::ChannelSubscription {
                channel_id: "@channel".into(),
            },
        )
        .await;

        let verifier = StubVerifier {
            subscribed: true,
            ..Default::default()
        };
        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);
    }

    #[tokio::test]
    async fn spend_threshold_reads_purchase_totals() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            5_000,
            RewardRouting::Coin,
            TaskKind::SpendThreshold { threshold: 500.0 },
        )
        .await;
        let verifier = StubVerifier::default();

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert!(matches!(out, TaskCheckOutcome::Pending { .. }));

        // A settled purchase over the threshold unlocks the task
        sqlite::upsert_pending(db.pool(), "p1", "prem_25", 600.0).await.unwrap();
        sqlite::confirm_premium(db.pool(), "p1", "prem_25", 600.0, t0()).await.unwrap();

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);
    }

    #[tokio::test]
    async fn consecutive_days_build_a_streak() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            2_000,
            RewardRouting::Coin,
            TaskKind::ConsecutiveDaysChallenge { target_days: 3 },
        )
        .await;
        let verifier = StubVerifier::default();

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 1 });

        // Same day again is rejected
        let later_today = t0() + Duration::hours(2);
        assert!(matches!(
            check_task(db.pool(), &verifier, "p1", task, later_today).await,
            Err(Error::AlreadyCheckedToday)
        ));

        let day2 = t0() + Duration::days(1);
        let out = check_task(db.pool(), &verifier, "p1", task, day2).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 2 });

        let day3 = t0() + Duration::days(2);
        let out = check_task(db.pool(), &verifier, "p1", task, day3).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);

        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 2_000);
    }

    #[tokio::test]
    async fn missed_day_resets_the_streak() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            2_000,
            RewardRouting::Coin,
            TaskKind::ConsecutiveDaysChallenge { target_days: 3 },
        )
        .await;
        let verifier = StubVerifier::default();

        check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        check_task(db.pool(), &verifier, "p1", task, t0() + Duration::days(1))
            .await
            .unwrap();

        // Skipping day 3 drops the streak back to 1
        let out = check_task(db.pool(), &verifier, "p1", task, t0() + Duration::days(3))
            .await
            .unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 1 });
    }

    #[tokio::test]
    async fn league_routed_reward_skips_coins() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            700,
            RewardRouting::LeagueScore,
            TaskKind::FriendCountThreshold { friends: 0 },
        )
        .await;
        let verifier = StubVerifier::default();

        check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();

        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 0);

        let standing = sqlite::get_standing(db.pool(), "p1").await.unwrap().unwrap();
        assert_eq!(standing.free_score, 700);
        assert_eq!(standing.score, 700);
    }

    #[tokio::test]
    async fn refresh_finishes_an_elapsed_gate() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            500,
            RewardRouting::Coin,
            TaskKind::OpenLink {
                url: "https://example.com".into(),
            },
        )
        .await;
        let verifier = StubVerifier::default();

        check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();

        refresh(db.pool(), "p1", t0() + Duration::hours(25)).await.unwrap();

        let progress = sqlite::get_progress(db.pool(), "p1", task).await.unwrap();
        assert!(progress.completed);
        let player = sqlite::require_player(db.pool(), "p1").await.unwrap();
        assert_eq!(player.coins, 500);
    }

    #[tokio::test]
    async fn multi_stage_walks_every_gate() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        let task = add(
            &db,
            1_500,
            RewardRouting::Coin,
            TaskKind::MultiStageDelayed {
                stages: 4,
                gate_hours: 24,
            },
        )
        .await;
        let verifier = StubVerifier::default();

        let out = check_task(db.pool(), &verifier, "p1", task, t0()).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 1 });

        let day2 = t0() + Duration::hours(25);
        let out = check_task(db.pool(), &verifier, "p1", task, day2).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 2 });

        // Even stage advances immediately into the next gate
        let out = check_task(db.pool(), &verifier, "p1", task, day2).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Advanced { stage: 3 });

        let day3 = day2 + Duration::hours(25);
        let out = check_task(db.pool(), &verifier, "p1", task, day3).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);
    }

    #[tokio::test]
    async fn new_definition_reaches_existing_players() {
        let db = test_db().await;
        seed_player(&db, "p1").await;
        seed_player(&db, "p2").await;

        let task = add(&db, 100, RewardRouting::Coin, TaskKind::PeriodicRecurring).await;

        for player in ["p1", "p2"] {
            let progress = sqlite::get_progress(db.pool(), player, task).await.unwrap();
            assert!(!progress.completed);
        }
    }
}
