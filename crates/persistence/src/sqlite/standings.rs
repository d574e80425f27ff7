//! League standing and clan membership reads (plus the minimal clan
//! writes milestone predicates and tests need)

use sqlx::SqlitePool;
use terminus_core::{ClanMembership, Error, LeagueStanding, Result};

/// Get a player's league standing row, if any score was ever routed there
pub async fn get_standing(pool: &SqlitePool, player_id: &str) -> Result<Option<LeagueStanding>> {
    let row: Option<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT player_id, score, buy_score, free_score FROM league_standings WHERE player_id = ?",
    )
    .bind(player_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(player_id, score, buy_score, free_score)| LeagueStanding {
        player_id,
        score,
        buy_score,
        free_score,
    }))
}

/// Get a player's clan membership, if any
pub async fn get_membership(pool: &SqlitePool, player_id: &str) -> Result<Option<ClanMembership>> {
    let row: Option<(String, String, String, i64)> = sqlx::query_as(
        "SELECT player_id, clan_id, role, contributed_rating FROM clan_members WHERE player_id = ?",
    )
    .bind(player_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(player_id, clan_id, role, contributed_rating)| ClanMembership {
        player_id,
        clan_id,
        role,
        contributed_rating,
    }))
}

/// Get a clan's rating
pub async fn get_clan_rating(pool: &SqlitePool, clan_id: &str) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT rating FROM clans WHERE clan_id = ?")
        .bind(clan_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(rating,)| rating))
}

/// Create a clan with the given player as its creator member
pub async fn create_clan(pool: &SqlitePool, clan_id: &str, creator_id: &str) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query("INSERT INTO clans (clan_id, rating) VALUES (?, 0)")
        .bind(clan_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query(
        "INSERT INTO clan_members (player_id, clan_id, role, contributed_rating) VALUES (?, ?, 'creator', 0)",
    )
    .bind(creator_id)
    .bind(clan_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}
