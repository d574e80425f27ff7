//! Player state and snapshot models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::boost::BoostView;
use crate::models::premium::PremiumStatus;
use crate::models::referral::InvitedPlayer;
use crate::models::task::TaskView;

/// Baseline energy for a fresh player (current and max)
pub const BASELINE_ENERGY: i64 = 1000;

/// Energy regeneration rate in points per second
pub const ENERGY_REGEN_PER_SEC: i64 = 1;

/// Regeneration rate while a premium entitlement is active
pub const PREMIUM_ENERGY_REGEN_PER_SEC: i64 = 2;

/// A player's persistent resource state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub coins: i64,
    pub current_energy: i64,
    pub max_energy: i64,
    /// Timestamp of the last energy sync; never moves backward
    pub last_sync_at: DateTime<Utc>,
    /// Last passive-accrual payout, if the player ever owned that boost
    pub last_passive_payout_at: Option<DateTime<Utc>>,
    /// This player's own invite code (`UC_` namespace)
    pub referral_code: String,
    /// Invite code of the player who referred this one, if any
    pub referred_by: Option<String>,
    pub wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Player {
    /// Energy regeneration rate for this player, given premium status
    pub fn regen_rate(premium_active: bool) -> i64 {
        if premium_active {
            PREMIUM_ENERGY_REGEN_PER_SEC
        } else {
            ENERGY_REGEN_PER_SEC
        }
    }

    /// Regenerated energy after `elapsed_secs`, clamped to the cap.
    /// Negative elapsed time (clock skew) never drains energy.
    pub fn regenerated_energy(&self, elapsed_secs: i64, premium_active: bool) -> i64 {
        let recovered = elapsed_secs.max(0) * Self::regen_rate(premium_active);
        (self.current_energy + recovered).min(self.max_energy)
    }
}

/// Full player view returned to the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    #[serde(flatten)]
    pub player: Player,
    pub boosts: Vec<BoostView>,
    pub tasks: Vec<TaskView>,
    pub invited: Vec<InvitedPlayer>,
    pub premium: Option<PremiumStatus>,
}

/// Result of a spend-for-coins operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendOutcome {
    pub new_energy: i64,
    pub new_balance: i64,
}
