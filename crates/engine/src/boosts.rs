//! Boost upgrades and the timed-burst activation machine

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use terminus_core::{
    upgrade_price, BoostKind, BoostOwnership, BoostView, Error, Player, Result,
    BURST_DAILY_LIMIT, BURST_DURATION_SECS, ENERGY_CAP_STEP, MAX_BOOST_LEVEL,
    PREMIUM_BURST_DAILY_LIMIT,
};
use terminus_persistence::sqlite;
use tracing::{debug, instrument};

/// Result of a boost upgrade: the refreshed player, plus the burst end
/// time when the upgrade was a burst activation.
#[derive(Debug, Clone)]
pub struct UpgradeOutcome {
    pub player: Player,
    pub burst_ends_at: Option<DateTime<Utc>>,
}

/// A player's boost state for one kind; level 1 when never purchased
async fn get_or_default(
    pool: &SqlitePool,
    player_id: &str,
    kind: BoostKind,
) -> Result<BoostOwnership> {
    Ok(sqlite::get_boost(pool, player_id, kind)
        .await?
        .unwrap_or_else(|| BoostOwnership::new(player_id, kind)))
}

/// Upgrade a boost by one level, or activate a timed burst.
///
/// Price debit and state change apply atomically; an EnergyCapacity
/// upgrade also raises the energy ceiling by its fixed step.
#[instrument(skip(pool))]
pub async fn upgrade(
    pool: &SqlitePool,
    player_id: &str,
    kind: BoostKind,
    now: DateTime<Utc>,
) -> Result<UpgradeOutcome> {
    if kind == BoostKind::TimedBurst {
        return activate_burst(pool, player_id, now).await;
    }

    let player = sqlite::require_player(pool, player_id).await?;
    let boost = get_or_default(pool, player_id, kind).await?;

    if boost.level >= MAX_BOOST_LEVEL {
        return Err(Error::MaxLevelReached);
    }

    let price = upgrade_price(kind, boost.level);
    if player.coins < price {
        return Err(Error::InsufficientFunds {
            required: price,
            available: player.coins,
        });
    }

    let new_level = boost.level + 1;
    let new_max_energy = match kind {
        BoostKind::EnergyCapacity => Some(player.max_energy + ENERGY_CAP_STEP),
        _ => None,
    };

    debug!("Upgrading {} to level {} for {}", kind.as_str(), new_level, price);
    sqlite::apply_upgrade(pool, player_id, kind, price, new_level, new_max_energy).await?;

    Ok(UpgradeOutcome {
        player: sqlite::require_player(pool, player_id).await?,
        burst_ends_at: None,
    })
}

/// Activate the timed burst: flat price, bounded per calendar day,
/// rejected while one is already running.
async fn activate_burst(
    pool: &SqlitePool,
    player_id: &str,
    now: DateTime<Utc>,
) -> Result<UpgradeOutcome> {
    let player = sqlite::require_player(pool, player_id).await?;
    let boost = get_or_default(pool, player_id, BoostKind::TimedBurst).await?;

    if boost.burst_active(now) {
        return Err(Error::MaxLevelReached);
    }

    let today = now.date_naive();
    let used = boost.burst_used_today(today);
    let premium = sqlite::is_premium_active(pool, player_id, now).await?;
    let limit = if premium {
        PREMIUM_BURST_DAILY_LIMIT
    } else {
        BURST_DAILY_LIMIT
    };
    if used >= limit {
        return Err(Error::DailyLimitReached);
    }

    let price = BoostKind::TimedBurst.base_price();
    if player.coins < price {
        return Err(Error::InsufficientFunds {
            required: price,
            available: player.coins,
        });
    }

    let expires_at = now + Duration::seconds(BURST_DURATION_SECS);
    debug!("Burst active until {} ({} of {} today)", expires_at, used + 1, limit);
    sqlite::apply_burst_activation(pool, player_id, price, used + 1, today, expires_at).await?;

    Ok(UpgradeOutcome {
        player: sqlite::require_player(pool, player_id).await?,
        burst_ends_at: Some(expires_at),
    })
}

/// Boost lines for a player snapshot: owned levels with the price of
/// the next upgrade, plus any running burst window.
pub async fn snapshot_views(
    pool: &SqlitePool,
    player_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<BoostView>> {
    let owned = sqlite::list_boosts(pool, player_id).await?;

    Ok(BoostKind::ALL
        .iter()
        .map(|&kind| {
            let boost = owned
                .iter()
                .find(|b| b.kind == kind)
                .cloned()
                .unwrap_or_else(|| BoostOwnership::new(player_id, kind));
            BoostView {
                kind,
                level: boost.level,
                next_price: upgrade_price(kind, boost.level),
                burst_ends_at: boost.burst_expires_at.filter(|_| boost.burst_active(now)),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{grant_premium, seed_player_with, t0, test_db};

    #[tokio::test]
    async fn upgrade_debits_doubling_price() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 10_000).await;

        // Level 1 -> 2 costs the base price
        let out = upgrade(db.pool(), "p1", BoostKind::Multiplier, t0()).await.unwrap();
        assert_eq!(out.player.coins, 8_000);

        // Level 2 -> 3 costs double
        let out = upgrade(db.pool(), "p1", BoostKind::Multiplier, t0()).await.unwrap();
        assert_eq!(out.player.coins, 4_000);

        let boost = sqlite::get_boost(db.pool(), "p1", BoostKind::Multiplier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(boost.level, 3);
    }

    #[tokio::test]
    async fn upgrade_rejects_when_unaffordable() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 1_999).await;

        let err = upgrade(db.pool(), "p1", BoostKind::Multiplier, t0())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                required: 2_000,
                available: 1_999
            }
        ));
    }

    #[tokio::test]
    async fn upgrade_stops_at_the_level_cap() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = i64::MAX / 2).await;
        sqlite::apply_upgrade(db.pool(), "p1", BoostKind::PassiveAccrual, 0, MAX_BOOST_LEVEL, None)
            .await
            .unwrap();

        let err = upgrade(db.pool(), "p1", BoostKind::PassiveAccrual, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MaxLevelReached));
    }

    #[tokio::test]
    async fn capacity_upgrade_raises_energy_ceiling() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 2_000).await;

        let out = upgrade(db.pool(), "p1", BoostKind::EnergyCapacity, t0())
            .await
            .unwrap();
        assert_eq!(out.player.max_energy, 1_500);
    }

    #[tokio::test]
    async fn burst_respects_daily_limit() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 100_000).await;

        // Two activations succeed; waiting out each window first
        let out = upgrade(db.pool(), "p1", BoostKind::TimedBurst, t0()).await.unwrap();
        assert_eq!(out.burst_ends_at, Some(t0() + Duration::seconds(60)));

        let second = t0() + Duration::minutes(5);
        upgrade(db.pool(), "p1", BoostKind::TimedBurst, second).await.unwrap();

        // Third on the same day hits the cap
        let third = t0() + Duration::minutes(10);
        let err = upgrade(db.pool(), "p1", BoostKind::TimedBurst, third)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached));

        // Next calendar day the counter rolls over
        let tomorrow = t0() + Duration::days(1);
        upgrade(db.pool(), "p1", BoostKind::TimedBurst, tomorrow).await.unwrap();
    }

    #[tokio::test]
    async fn premium_raises_the_daily_burst_limit() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 100_000).await;
        grant_premium(&db, "p1", t0() + Duration::days(30)).await;

        for minutes in [0, 5, 10] {
            upgrade(db.pool(), "p1", BoostKind::TimedBurst, t0() + Duration::minutes(minutes))
                .await
                .unwrap();
        }

        let err = upgrade(db.pool(), "p1", BoostKind::TimedBurst, t0() + Duration::minutes(15))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DailyLimitReached));
    }

    #[tokio::test]
    async fn burst_rejects_reactivation_while_active() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 100_000).await;

        upgrade(db.pool(), "p1", BoostKind::TimedBurst, t0()).await.unwrap();
        let err = upgrade(db.pool(), "p1", BoostKind::TimedBurst, t0() + Duration::seconds(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MaxLevelReached));
    }

    #[tokio::test]
    async fn views_cover_all_kinds_with_next_price() {
        let db = test_db().await;
        seed_player_with(&db, "p1", |p| p.coins = 2_000).await;
        upgrade(db.pool(), "p1", BoostKind::Multiplier, t0()).await.unwrap();

        let views = snapshot_views(db.pool(), "p1", t0()).await.unwrap();
        assert_eq!(views.len(), 4);

        let multiplier = views
            .iter()
            .find(|v| v.kind == BoostKind::Multiplier)
            .unwrap();
        assert_eq!(multiplier.level, 2);
        assert_eq!(multiplier.next_price, 4_000);
    }
}
