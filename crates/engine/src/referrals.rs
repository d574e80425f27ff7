//! Invite registration and referral-code generation

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use terminus_core::{signup_bonus, Error, Player, Result, BASELINE_ENERGY};
use terminus_persistence::sqlite;
use tracing::{debug, instrument};

const CODE_PREFIX: &str = "UC_";
const CODE_LENGTH: usize = 9;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random `UC_`-prefixed invite code
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{CODE_PREFIX}{suffix}")
}

/// Generate a code not yet owned by any player
pub(crate) async fn unique_referral_code(pool: &SqlitePool) -> Result<String> {
    loop {
        let code = generate_referral_code();
        if sqlite::find_by_referral_code(pool, &code).await?.is_none() {
            return Ok(code);
        }
    }
}

/// Fresh player at the baseline economy state
pub(crate) fn new_player(
    id: &str,
    name: &str,
    referral_code: String,
    referred_by: Option<String>,
    now: DateTime<Utc>,
) -> Player {
    Player {
        id: id.to_string(),
        name: name.to_string(),
        coins: 0,
        current_energy: BASELINE_ENERGY,
        max_energy: BASELINE_ENERGY,
        last_sync_at: now,
        last_passive_payout_at: None,
        referral_code,
        referred_by,
        wallet_address: None,
        created_at: now,
    }
}

/// Register a new player who arrived through an invite code.
///
/// Creates the invitee, the referral edge, and the inviter's one-time
/// signup bonus in a single transaction. Fails `InviterNotFound` on an
/// unresolved code and `Conflict` when the invitee already exists.
#[instrument(skip(pool))]
pub async fn register_invite(
    pool: &SqlitePool,
    inviter_code: &str,
    invitee_id: &str,
    invitee_name: &str,
    premium_invitee: bool,
    now: DateTime<Utc>,
) -> Result<Player> {
    let inviter = sqlite::find_by_referral_code(pool, inviter_code)
        .await?
        .ok_or_else(|| Error::InviterNotFound(inviter_code.to_string()))?;

    if sqlite::player_exists(pool, invitee_id).await? {
        return Err(Error::Conflict(format!(
            "player {invitee_id} is already registered"
        )));
    }
    if inviter.id == invitee_id {
        return Err(Error::Validation("players cannot invite themselves".into()));
    }

    let code = unique_referral_code(pool).await?;
    let invitee = new_player(
        invitee_id,
        invitee_name,
        code,
        Some(inviter_code.to_string()),
        now,
    );
    let task_ids = sqlite::list_definition_ids(pool).await?;
    let bonus = signup_bonus(premium_invitee);

    debug!("Inviter {} earns signup bonus {}", inviter.id, bonus);
    sqlite::register_invitee(pool, &invitee, &task_ids, &inviter.id, bonus).await?;

    sqlite::require_player(pool, invitee_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{seed_player, t0, test_db};

    #[test]
    fn codes_carry_the_invite_prefix() {
        let code = generate_referral_code();
        assert!(code.starts_with("UC_"));
        assert_eq!(code.len(), 12);
        assert!(code[3..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn invite_pays_the_signup_bonus_once() {
        let db = test_db().await;
        let inviter = seed_player(&db, "inviter").await;

        let invitee = register_invite(
            db.pool(),
            &inviter.referral_code,
            "invitee",
            "Friend",
            false,
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(invitee.referred_by, Some(inviter.referral_code.clone()));
        assert_eq!(invitee.coins, 0);

        let inviter_row = sqlite::require_player(db.pool(), "inviter").await.unwrap();
        assert_eq!(inviter_row.coins, 500);

        // Repeating the registration is a conflict, never a second bonus
        let err = register_invite(
            db.pool(),
            &inviter.referral_code,
            "invitee",
            "Friend",
            false,
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn premium_invitee_pays_the_elevated_bonus() {
        let db = test_db().await;
        let inviter = seed_player(&db, "inviter").await;

        register_invite(db.pool(), &inviter.referral_code, "vip", "Vip", true, t0())
            .await
            .unwrap();

        let inviter_row = sqlite::require_player(db.pool(), "inviter").await.unwrap();
        assert_eq!(inviter_row.coins, 2_500);
    }

    #[tokio::test]
    async fn unknown_code_is_rejected() {
        let db = test_db().await;

        let err = register_invite(db.pool(), "UC_NOSUCHCOD", "p1", "P", false, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InviterNotFound(_)));
    }

    #[tokio::test]
    async fn invited_list_tracks_edge_totals() {
        let db = test_db().await;
        let inviter = seed_player(&db, "inviter").await;
        register_invite(db.pool(), &inviter.referral_code, "a", "A", false, t0())
            .await
            .unwrap();
        register_invite(db.pool(), &inviter.referral_code, "b", "B", false, t0())
            .await
            .unwrap();

        assert_eq!(sqlite::count_invitees(db.pool(), "inviter").await.unwrap(), 2);
        let invited = sqlite::list_invited(db.pool(), "inviter").await.unwrap();
        assert_eq!(invited.len(), 2);
        assert!(invited.iter().all(|i| i.referral_coins == 500));
    }
}
