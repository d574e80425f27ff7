//! Player CRUD and atomic balance/energy application

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use terminus_core::{Error, Player, Result};

/// Database row for a player
#[derive(Debug, sqlx::FromRow)]
struct PlayerRow {
    player_id: String,
    name: String,
    coins: i64,
    current_energy: i64,
    max_energy: i64,
    last_sync_at: DateTime<Utc>,
    last_passive_payout_at: Option<DateTime<Utc>>,
    referral_code: String,
    referred_by: Option<String>,
    wallet_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PlayerRow> for Player {
    fn from(row: PlayerRow) -> Self {
        Player {
            id: row.player_id,
            name: row.name,
            coins: row.coins,
            current_energy: row.current_energy,
            max_energy: row.max_energy,
            last_sync_at: row.last_sync_at,
            last_passive_payout_at: row.last_passive_payout_at,
            referral_code: row.referral_code,
            referred_by: row.referred_by,
            wallet_address: row.wallet_address,
            created_at: row.created_at,
        }
    }
}

const SELECT_PLAYER: &str = r#"
    SELECT player_id, name, coins, current_energy, max_energy, last_sync_at,
           last_passive_payout_at, referral_code, referred_by, wallet_address, created_at
    FROM players
"#;

/// Get a player by id
pub async fn get_player(pool: &SqlitePool, player_id: &str) -> Result<Option<Player>> {
    let row: Option<PlayerRow> =
        sqlx::query_as(&format!("{SELECT_PLAYER} WHERE player_id = ?"))
            .bind(player_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(Player::from))
}

/// Get a player by id, failing if absent
pub async fn require_player(pool: &SqlitePool, player_id: &str) -> Result<Player> {
    get_player(pool, player_id)
        .await?
        .ok_or_else(|| Error::PlayerNotFound(player_id.to_string()))
}

/// Resolve a referral code to its owner
pub async fn find_by_referral_code(pool: &SqlitePool, code: &str) -> Result<Option<Player>> {
    let row: Option<PlayerRow> =
        sqlx::query_as(&format!("{SELECT_PLAYER} WHERE referral_code = ?"))
            .bind(code)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(Player::from))
}

/// Check if a player with the given id exists
pub async fn player_exists(pool: &SqlitePool, player_id: &str) -> Result<bool> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players WHERE player_id = ?")
        .bind(player_id)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0 > 0)
}

/// Create a player together with one progress row per task definition,
/// as one transaction so a crash cannot leave a half-initialized player.
pub async fn create_player_with_tasks(
    pool: &SqlitePool,
    player: &Player,
    task_ids: &[i64],
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    insert_player(&mut tx, player).await?;
    for task_id in task_ids {
        seed_progress(&mut tx, &player.id, *task_id).await?;
    }

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

pub(crate) async fn insert_player(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    player: &Player,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO players (player_id, name, coins, current_energy, max_energy, last_sync_at,
                             last_passive_payout_at, referral_code, referred_by, wallet_address,
                             created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&player.id)
    .bind(&player.name)
    .bind(player.coins)
    .bind(player.current_energy)
    .bind(player.max_energy)
    .bind(player.last_sync_at)
    .bind(player.last_passive_payout_at)
    .bind(&player.referral_code)
    .bind(&player.referred_by)
    .bind(&player.wallet_address)
    .bind(player.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

pub(crate) async fn seed_progress(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    player_id: &str,
    task_id: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO task_progress (player_id, task_id) VALUES (?, ?)",
    )
    .bind(player_id)
    .bind(task_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Persist the regenerated energy and the sync timestamp.
///
/// Always written, even when unchanged, so repeated syncs within the
/// same second never double-credit elapsed time.
pub async fn apply_sync(
    pool: &SqlitePool,
    player_id: &str,
    current_energy: i64,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE players SET current_energy = ?, last_sync_at = ? WHERE player_id = ?",
    )
    .bind(current_energy)
    .bind(synced_at)
    .bind(player_id)
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Inviter credit attached to a coin credit, applied in the same transaction
#[derive(Debug, Clone)]
pub struct CascadeCredit {
    pub inviter_id: String,
    pub invitee_id: String,
    pub reward: i64,
}

/// Optional side effects of a coin credit
#[derive(Debug, Clone, Default)]
pub struct CreditOptions {
    /// Set the player's energy to this value (spend debits)
    pub new_energy: Option<i64>,
    /// Record a passive-accrual payout at this instant
    pub passive_payout_at: Option<DateTime<Utc>>,
    /// Referral cascade to apply alongside the credit
    pub cascade: Option<CascadeCredit>,
}

/// Credit (or debit) coins with optional energy/cascade side effects,
/// all applied as one transaction.
pub async fn apply_coin_credit(
    pool: &SqlitePool,
    player_id: &str,
    delta: i64,
    options: CreditOptions,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    credit_in_tx(&mut tx, player_id, delta, &options).await?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}

pub(crate) async fn credit_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    player_id: &str,
    delta: i64,
    options: &CreditOptions,
) -> Result<()> {
    sqlx::query("UPDATE players SET coins = coins + ? WHERE player_id = ?")
        .bind(delta)
        .bind(player_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    if let Some(energy) = options.new_energy {
        sqlx::query("UPDATE players SET current_energy = ? WHERE player_id = ?")
            .bind(energy)
            .bind(player_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
    }

    if let Some(payout_at) = options.passive_payout_at {
        sqlx::query("UPDATE players SET last_passive_payout_at = ? WHERE player_id = ?")
            .bind(payout_at)
            .bind(player_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;
    }

    if let Some(cascade) = &options.cascade {
        sqlx::query("UPDATE players SET coins = coins + ? WHERE player_id = ?")
            .bind(cascade.reward)
            .bind(&cascade.inviter_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO referrals (inviter_id, invitee_id, referral_coins)
            VALUES (?, ?, ?)
            ON CONFLICT (inviter_id, invitee_id)
            DO UPDATE SET referral_coins = referral_coins + excluded.referral_coins
            "#,
        )
        .bind(&cascade.inviter_id)
        .bind(&cascade.invitee_id)
        .bind(cascade.reward)
        .execute(&mut **tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;
    }

    Ok(())
}

/// Record the first passive-payout timestamp without crediting coins
pub async fn set_passive_payout_at(
    pool: &SqlitePool,
    player_id: &str,
    payout_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE players SET last_passive_payout_at = ? WHERE player_id = ?")
        .bind(payout_at)
        .bind(player_id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}

/// Link an external wallet address to the player
pub async fn set_wallet_address(
    pool: &SqlitePool,
    player_id: &str,
    address: &str,
) -> Result<()> {
    sqlx::query("UPDATE players SET wallet_address = ? WHERE player_id = ?")
        .bind(address)
        .bind(player_id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(())
}
