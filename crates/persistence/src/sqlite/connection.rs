//! Database connection and initialization

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use terminus_core::{Error, Result};

/// Database wrapper for SQLite operations
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to database at the given path, creating if necessary
    pub async fn connect(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::DatabaseError(e.to_string()))?;
        }

        let path_str = path.to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| Error::DatabaseError(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Connect to in-memory database (for testing)
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::DatabaseError(e.to_string()))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                player_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                coins INTEGER NOT NULL DEFAULT 0,
                current_energy INTEGER NOT NULL,
                max_energy INTEGER NOT NULL,
                last_sync_at TIMESTAMP NOT NULL,
                last_passive_payout_at TIMESTAMP,
                referral_code TEXT NOT NULL UNIQUE,
                referred_by TEXT,
                wallet_address TEXT,
                created_at TIMESTAMP NOT NULL
            );

            CREATE TABLE IF NOT EXISTS boosts (
                player_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                level INTEGER NOT NULL DEFAULT 1,
                burst_activations_today INTEGER NOT NULL DEFAULT 0,
                burst_last_activation DATE,
                burst_expires_at TIMESTAMP,
                PRIMARY KEY (player_id, kind),
                FOREIGN KEY (player_id) REFERENCES players(player_id)
            );

            CREATE TABLE IF NOT EXISTS task_definitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                reward_coins INTEGER NOT NULL,
                routing TEXT NOT NULL DEFAULT 'coin',
                kind TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_progress (
                player_id TEXT NOT NULL,
                task_id INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                stage INTEGER NOT NULL DEFAULT 0,
                stage_entered_at TIMESTAMP,
                last_completed_date DATE,
                streak_days INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (player_id, task_id),
                FOREIGN KEY (player_id) REFERENCES players(player_id),
                FOREIGN KEY (task_id) REFERENCES task_definitions(id)
            );

            CREATE TABLE IF NOT EXISTS referrals (
                inviter_id TEXT NOT NULL,
                invitee_id TEXT NOT NULL,
                referral_coins INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (inviter_id, invitee_id),
                FOREIGN KEY (inviter_id) REFERENCES players(player_id)
            );

            CREATE TABLE IF NOT EXISTS purchases (
                player_id TEXT PRIMARY KEY,
                total_accumulated REAL NOT NULL DEFAULT 0,
                last_purchase_sku TEXT,
                pending_sku TEXT,
                pending_amount REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS premium (
                player_id TEXT PRIMARY KEY,
                amount_spent REAL NOT NULL DEFAULT 0,
                ends_at TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS league_standings (
                player_id TEXT PRIMARY KEY,
                score INTEGER NOT NULL DEFAULT 0,
                buy_score INTEGER NOT NULL DEFAULT 0,
                free_score INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS clans (
                clan_id TEXT PRIMARY KEY,
                rating INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS clan_members (
                player_id TEXT PRIMARY KEY,
                clan_id TEXT NOT NULL,
                role TEXT NOT NULL,
                contributed_rating INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (clan_id) REFERENCES clans(clan_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
