//! Purchase bookkeeping and transactional entitlement application

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use terminus_core::{Error, PurchaseRecord, Result};

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    player_id: String,
    total_accumulated: f64,
    last_purchase_sku: Option<String>,
    pending_sku: Option<String>,
    pending_amount: f64,
}

impl From<PurchaseRow> for PurchaseRecord {
    fn from(row: PurchaseRow) -> Self {
        PurchaseRecord {
            player_id: row.player_id,
            total_accumulated: row.total_accumulated,
            last_purchase_sku: row.last_purchase_sku,
            pending_sku: row.pending_sku,
            pending_amount: row.pending_amount,
        }
    }
}

/// Get a player's purchase record, if any
pub async fn get_purchase(pool: &SqlitePool, player_id: &str) -> Result<Option<PurchaseRecord>> {
    let row: Option<PurchaseRow> = sqlx::query_as(
        r#"
        SELECT player_id, total_accumulated, last_purchase_sku, pending_sku, pending_amount
        FROM purchases WHERE player_id = ?
        "#,
    )
    .bind(player_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(PurchaseRecord::from))
}

/// Record the intent of a purchase; overwrites any earlier pending one
pub async fn upsert_pending(
    pool: &SqlitePool,
    player_id: &str,
    sku: &str,
    amount: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO purchases (player_id, pending_sku, pending_amount)
        VALUES (?, ?, ?)
        ON CONFLICT (player_id) DO UPDATE SET
            pending_sku = excluded.pending_sku,
            pending_amount = excluded.pending_amount
        "#,
    )
    .bind(player_id)
    .bind(sku)
    .bind(amount)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

async fn settle_purchase(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    player_id: &str,
    sku: &str,
    amount: f64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE purchases
        SET total_accumulated = total_accumulated + ?,
            last_purchase_sku = ?, pending_sku = NULL, pending_amount = 0
        WHERE player_id = ?
        "#,
    )
    .bind(amount)
    .bind(sku)
    .bind(player_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Settle a premium purchase: fold the amount into the record and move
/// the premium end date, as one transaction.
pub async fn confirm_premium(
    pool: &SqlitePool,
    player_id: &str,
    sku: &str,
    amount: f64,
    new_ends_at: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    settle_purchase(&mut tx, player_id, sku, amount).await?;

    sqlx::query(
        r#"
        INSERT INTO premium (player_id, amount_spent, ends_at)
        VALUES (?, ?, ?)
        ON CONFLICT (player_id) DO UPDATE SET
            amount_spent = amount_spent + excluded.amount_spent,
            ends_at = excluded.ends_at
        "#,
    )
    .bind(player_id)
    .bind(amount)
    .bind(new_ends_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Settle a clan-rating purchase: the buyer's clan gains the points and
/// the membership records the contribution, as one transaction.
pub async fn confirm_clan_rating(
    pool: &SqlitePool,
    player_id: &str,
    sku: &str,
    amount: f64,
    clan_id: &str,
    points: i64,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    settle_purchase(&mut tx, player_id, sku, amount).await?;

    sqlx::query("UPDATE clans SET rating = rating + ? WHERE clan_id = ?")
        .bind(points)
        .bind(clan_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query(
        "UPDATE clan_members SET contributed_rating = contributed_rating + ? WHERE player_id = ?",
    )
    .bind(points)
    .bind(player_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Settle a league-score purchase into the buy-score bucket, as one
/// transaction.
pub async fn confirm_league_score(
    pool: &SqlitePool,
    player_id: &str,
    sku: &str,
    amount: f64,
    points: i64,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    settle_purchase(&mut tx, player_id, sku, amount).await?;

    sqlx::query(
        r#"
        INSERT INTO league_standings (player_id, score, buy_score)
        VALUES (?, ?, ?)
        ON CONFLICT (player_id) DO UPDATE SET
            score = score + excluded.score,
            buy_score = buy_score + excluded.buy_score
        "#,
    )
    .bind(player_id)
    .bind(points)
    .bind(points)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}
