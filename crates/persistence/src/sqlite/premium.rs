//! Premium entitlement reads

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use terminus_core::{Error, PremiumStatus, Result};

/// Get a player's premium row, if any purchase ever created one
pub async fn get_premium(pool: &SqlitePool, player_id: &str) -> Result<Option<PremiumStatus>> {
    let row: Option<(String, f64, Option<DateTime<Utc>>)> = sqlx::query_as(
        "SELECT player_id, amount_spent, ends_at FROM premium WHERE player_id = ?",
    )
    .bind(player_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(player_id, amount_spent, ends_at)| PremiumStatus {
        player_id,
        amount_spent,
        ends_at,
    }))
}

/// Whether the player's premium entitlement covers `now`
pub async fn is_premium_active(
    pool: &SqlitePool,
    player_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    Ok(get_premium(pool, player_id)
        .await?
        .map(|status| status.is_active(now))
        .unwrap_or(false))
}
