//! Resource ledger: energy regeneration, spend-for-coins, and the
//! cascade-aware coin credit path

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use terminus_core::{
    burst_spend_cap, cascade_reward, BoostKind, Error, Player, Result, SpendOutcome,
    PASSIVE_ACCRUAL_INTERVAL_SECS,
};
use terminus_persistence::sqlite::{self, CascadeCredit, CreditOptions};
use tracing::{debug, instrument};

/// Referral cascade owed for a balance move, resolved against the
/// player's inviter. `None` when the player has no inviter or no
/// thousand-boundary was crossed.
pub(crate) async fn cascade_for(
    pool: &SqlitePool,
    player: &Player,
    old_balance: i64,
    new_balance: i64,
) -> Result<Option<CascadeCredit>> {
    let Some(code) = &player.referred_by else {
        return Ok(None);
    };

    let reward = cascade_reward(old_balance, new_balance);
    if reward == 0 {
        return Ok(None);
    }

    let Some(inviter) = sqlite::find_by_referral_code(pool, code).await? else {
        return Ok(None);
    };

    debug!("Cascade: inviter {} earns {}", inviter.id, reward);
    Ok(Some(CascadeCredit {
        inviter_id: inviter.id,
        invitee_id: player.id.clone(),
        reward,
    }))
}

/// Regenerate energy up to `now` and pay any passive accrual due.
///
/// Persists the sync timestamp even when nothing changed, so repeated
/// calls within the same second never double-credit elapsed time.
/// Returns the refreshed player.
#[instrument(skip(pool))]
pub async fn sync(pool: &SqlitePool, player_id: &str, now: DateTime<Utc>) -> Result<Player> {
    let player = sqlite::require_player(pool, player_id).await?;
    let premium = sqlite::is_premium_active(pool, player_id, now).await?;

    // Lapsed burst windows are cleared on every sync; reversion never
    // depends on an in-process timer.
    sqlite::clear_expired_burst(pool, player_id, now).await?;

    let elapsed = (now - player.last_sync_at).num_seconds();
    let energy = player.regenerated_energy(elapsed, premium);
    sqlite::apply_sync(pool, player_id, energy, now.max(player.last_sync_at)).await?;

    if let Some(boost) = sqlite::get_boost(pool, player_id, BoostKind::PassiveAccrual).await? {
        match player.last_passive_payout_at {
            None => {
                // First sync after buying the boost opens the window
                // without paying for time before ownership.
                sqlite::set_passive_payout_at(pool, player_id, now).await?;
            }
            Some(last) => {
                let accrued = (now - last)
                    .num_seconds()
                    .clamp(0, boost.passive_window_secs());
                let coins = accrued / PASSIVE_ACCRUAL_INTERVAL_SECS;
                if coins > 0 {
                    debug!("Passive accrual pays {} coin(s)", coins);
                    let cascade =
                        cascade_for(pool, &player, player.coins, player.coins + coins).await?;
                    sqlite::apply_coin_credit(
                        pool,
                        player_id,
                        coins,
                        CreditOptions {
                            passive_payout_at: Some(now),
                            cascade,
                            ..Default::default()
                        },
                    )
                    .await?;
                }
            }
        }
    }

    sqlite::require_player(pool, player_id).await
}

/// Convert energy into coins.
///
/// The spend cap is the energy ceiling, or the elevated burst cap
/// while a timed burst is active; burst spends skip the energy debit.
/// Energy debit, coin credit, and cascade land in one transaction.
#[instrument(skip(pool))]
pub async fn spend_for_coins(
    pool: &SqlitePool,
    player_id: &str,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<SpendOutcome> {
    if amount <= 0 {
        return Err(Error::Validation(format!(
            "spend amount must be positive, got {amount}"
        )));
    }

    let player = sync(pool, player_id, now).await?;

    let burst = sqlite::get_boost(pool, player_id, BoostKind::TimedBurst).await?;
    let burst_active = burst.map(|b| b.burst_active(now)).unwrap_or(false);

    let cap = if burst_active {
        let capacity_level = sqlite::get_boost(pool, player_id, BoostKind::EnergyCapacity)
            .await?
            .map(|b| b.level)
            .unwrap_or(1);
        burst_spend_cap(capacity_level)
    } else {
        player.max_energy
    };

    if amount > cap {
        return Err(Error::ExceedsCap {
            requested: amount,
            cap,
        });
    }

    let new_energy = if burst_active {
        player.current_energy
    } else {
        if player.current_energy < amount {
            return Err(Error::InsufficientEnergy {
                required: amount,
                available: player.current_energy,
            });
        }
        player.current_energy - amount
    };

    let new_balance = player.coins + amount;
    let cascade = cascade_for(pool, &player, player.coins, new_balance).await?;

    sqlite::apply_coin_credit(
        pool,
        player_id,
        amount,
        CreditOptions {
            new_energy: Some(new_energy),
            cascade,
            ..Default::default()
        },
    )
    .await?;

    Ok(SpendOutcome {
        new_energy,
        new_balance,
    })
}

/// Credit coins outside the spend path (task rewards use the same
/// mechanics through the task engine). `reason` is diagnostics only.
#[instrument(skip(pool))]
pub async fn credit(
    pool: &SqlitePool,
    player_id: &str,
    amount: i64,
    reason: &str,
) -> Result<i64> {
    let player = sqlite::require_player(pool, player_id).await?;
    let new_balance = player.coins + amount;
    let cascade = cascade_for(pool, &player, player.coins, new_balance).await?;

    debug!("Crediting {} coin(s): {}", amount, reason);
    sqlite::apply_coin_credit(
        pool,
        player_id,
        amount,
        CreditOptions {
            cascade,
            ..Default::default()
        },
    )
    .await?;

    Ok(new_balance)
}
