//! Referral edges and transactional invitee registration

use sqlx::SqlitePool;
use terminus_core::{Error, InvitedPlayer, Player, ReferralEdge, Result};

use super::players;

/// Get the edge between one inviter and one invitee
pub async fn get_edge(
    pool: &SqlitePool,
    inviter_id: &str,
    invitee_id: &str,
) -> Result<Option<ReferralEdge>> {
    let row: Option<(String, String, i64)> = sqlx::query_as(
        "SELECT inviter_id, invitee_id, referral_coins FROM referrals WHERE inviter_id = ? AND invitee_id = ?",
    )
    .bind(inviter_id)
    .bind(invitee_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(row.map(|(inviter_id, invitee_id, referral_coins)| ReferralEdge {
        inviter_id,
        invitee_id,
        referral_coins,
    }))
}

/// Count players an inviter has brought in
pub async fn count_invitees(pool: &SqlitePool, inviter_id: &str) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM referrals WHERE inviter_id = ?")
        .bind(inviter_id)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(count.0)
}

/// List an inviter's invitees with their running edge rewards
pub async fn list_invited(pool: &SqlitePool, inviter_id: &str) -> Result<Vec<InvitedPlayer>> {
    let rows: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT r.invitee_id, p.name, r.referral_coins
        FROM referrals r
        JOIN players p ON p.player_id = r.invitee_id
        WHERE r.inviter_id = ?
        ORDER BY r.referral_coins DESC
        "#,
    )
    .bind(inviter_id)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|(player_id, name, referral_coins)| InvitedPlayer {
            player_id,
            name,
            referral_coins,
        })
        .collect())
}

/// Register an invited player: insert the player with seeded task
/// progress, record the edge, and credit the inviter's signup bonus,
/// all as one transaction.
pub async fn register_invitee(
    pool: &SqlitePool,
    invitee: &Player,
    task_ids: &[i64],
    inviter_id: &str,
    signup_bonus: i64,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    players::insert_player(&mut tx, invitee).await?;
    for task_id in task_ids {
        players::seed_progress(&mut tx, &invitee.id, *task_id).await?;
    }

    sqlx::query(
        "INSERT INTO referrals (inviter_id, invitee_id, referral_coins) VALUES (?, ?, ?)",
    )
    .bind(inviter_id)
    .bind(&invitee.id)
    .bind(signup_bonus)
    .execute(&mut *tx)
    .await
    .map_err(|e| Error::DatabaseError(e.to_string()))?;

    sqlx::query("UPDATE players SET coins = coins + ? WHERE player_id = ?")
        .bind(signup_bonus)
        .bind(inviter_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| Error::DatabaseError(e.to_string()))
}
