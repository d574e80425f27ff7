//! Boost ownership storage and atomic upgrade/activation application

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use terminus_core::{BoostKind, BoostOwnership, Error, Result};

#[derive(Debug, sqlx::FromRow)]
struct BoostRow {
    player_id: String,
    kind: String,
    level: i64,
    burst_activations_today: i64,
    burst_last_activation: Option<NaiveDate>,
    burst_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<BoostRow> for BoostOwnership {
    type Error = Error;

    fn try_from(row: BoostRow) -> Result<Self> {
        let kind = BoostKind::from_str(&row.kind)
            .ok_or_else(|| Error::InvalidData(format!("unknown boost kind: {}", row.kind)))?;
        Ok(BoostOwnership {
            player_id: row.player_id,
            kind,
            level: row.level,
            burst_activations_today: row.burst_activations_today,
            burst_last_activation: row.burst_last_activation,
            burst_expires_at: row.burst_expires_at,
        })
    }
}

const SELECT_BOOST: &str = r#"
    SELECT player_id, kind, level, burst_activations_today, burst_last_activation,
           burst_expires_at
    FROM boosts
"#;

/// Get one boost of a player, if owned
pub async fn get_boost(
    pool: &SqlitePool,
    player_id: &str,
    kind: BoostKind,
) -> Result<Option<BoostOwnership>> {
    let row: Option<BoostRow> =
        sqlx::query_as(&format!("{SELECT_BOOST} WHERE player_id = ? AND kind = ?"))
            .bind(player_id)
            .bind(kind.as_str())
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

    row.map(BoostOwnership::try_from).transpose()
}

/// List all boosts a player owns
pub async fn list_boosts(pool: &SqlitePool, player_id: &str) -> Result<Vec<BoostOwnership>> {
    let rows: Vec<BoostRow> =
        sqlx::query_as(&format!("{SELECT_BOOST} WHERE player_id = ? ORDER BY kind"))
            .bind(player_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

    rows.into_iter().map(BoostOwnership::try_from).collect()
}

/// Debit the purchase price and raise the boost level, as one transaction.
///
/// Inserts the ownership row at level 1 on first purchase. When the
/// upgrade also raises the energy ceiling, `new_max_energy` carries the
/// player update into the same transaction.
pub async fn apply_upgrade(
    pool: &SqlitePool,
    player_id: &str,
    kind: BoostKind,
    price: i64,
    new_level: i64,
    new_max_energy: Option<i64>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query("UPDATE players SET coins = coins - ? WHERE player_id = ?")
        .bind(price)
        .bind(player_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO boosts (player_id, kind, level)
        VALUES (?, ?, ?)
        ON CONFLICT (player_id, kind) DO UPDATE SET level = excluded.level
        "#,
    )
    .bind(player_id)
    .bind(kind.as_str())
    .bind(new_level)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    if let Some(max_energy) = new_max_energy {
        sqlx::query("UPDATE players SET max_energy = ? WHERE player_id = ?")
            .bind(max_energy)
            .bind(player_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
    }

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Debit the burst price and record the activation window, as one transaction
pub async fn apply_burst_activation(
    pool: &SqlitePool,
    player_id: &str,
    price: i64,
    activations_today: i64,
    activation_date: NaiveDate,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query("UPDATE players SET coins = coins - ? WHERE player_id = ?")
        .bind(price)
        .bind(player_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO boosts (player_id, kind, level, burst_activations_today,
                            burst_last_activation, burst_expires_at)
        VALUES (?, ?, 1, ?, ?, ?)
        ON CONFLICT (player_id, kind) DO UPDATE SET
            burst_activations_today = excluded.burst_activations_today,
            burst_last_activation = excluded.burst_last_activation,
            burst_expires_at = excluded.burst_expires_at
        "#,
    )
    .bind(player_id)
    .bind(BoostKind::TimedBurst.as_str())
    .bind(activations_today)
    .bind(activation_date)
    .bind(expires_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Drop the burst window once it has lapsed
pub async fn clear_expired_burst(
    pool: &SqlitePool,
    player_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE boosts SET burst_expires_at = NULL
        WHERE player_id = ? AND kind = ? AND burst_expires_at IS NOT NULL
          AND burst_expires_at <= ?
        "#,
    )
    .bind(player_id)
    .bind(BoostKind::TimedBurst.as_str())
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}
