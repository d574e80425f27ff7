//! Referral edges and cascade arithmetic

use serde::{Deserialize, Serialize};

/// Flat bonus paid to the inviter when an invitee signs up
pub const SIGNUP_BONUS: i64 = 500;

/// Signup bonus for a recognized premium-tier invitee
pub const PREMIUM_SIGNUP_BONUS: i64 = 2500;

/// Cascade milestone width in coins
pub const CASCADE_STEP: i64 = 1000;

/// Inviter reward per milestone crossed
pub const CASCADE_REWARD: i64 = 100;

/// Inviter/invitee edge with a running reward total
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEdge {
    pub inviter_id: String,
    pub invitee_id: String,
    /// Monotonically non-decreasing cumulative reward paid along this edge
    pub referral_coins: i64,
}

/// Invitee line in a player snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitedPlayer {
    pub player_id: String,
    pub name: String,
    pub referral_coins: i64,
}

/// Inviter reward owed when an invitee's balance moves from
/// `old_balance` to `new_balance`: 100 per thousand-boundary crossed.
pub fn cascade_reward(old_balance: i64, new_balance: i64) -> i64 {
    let crossed = new_balance / CASCADE_STEP - old_balance / CASCADE_STEP;
    if crossed > 0 {
        crossed * CASCADE_REWARD
    } else {
        0
    }
}

/// Signup bonus for a new invitee
pub fn signup_bonus(premium_invitee: bool) -> i64 {
    if premium_invitee {
        PREMIUM_SIGNUP_BONUS
    } else {
        SIGNUP_BONUS
    }
}
