//! Boost kinds, the pricing curve, and timed-burst derivation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on boost levels
pub const MAX_BOOST_LEVEL: i64 = 50;

/// Extra max-energy granted per EnergyCapacity upgrade
pub const ENERGY_CAP_STEP: i64 = 500;

/// How long a timed burst stays active after activation
pub const BURST_DURATION_SECS: i64 = 60;

/// Baseline spend cap while a burst is active, before capacity scaling
pub const BURST_BASE_CAP: i64 = 3000;

/// Burst activations allowed per calendar day
pub const BURST_DAILY_LIMIT: i64 = 2;

/// Burst activations allowed per calendar day under premium
pub const PREMIUM_BURST_DAILY_LIMIT: i64 = 3;

/// Passive-accrual window at level 1, in seconds
pub const PASSIVE_BASELINE_SECS: i64 = 300;

/// Extra passive-accrual window per level above 1, in seconds
pub const PASSIVE_LEVEL_STEP_SECS: i64 = 300;

/// One coin accrues passively every this many seconds
pub const PASSIVE_ACCRUAL_INTERVAL_SECS: i64 = 2;

/// The four upgradeable boost kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoostKind {
    /// Scales the spend cap ("multitap" in the mini-app UI)
    Multiplier,
    /// Raises max energy by a fixed step per level
    EnergyCapacity,
    /// Accrues coins while the player is away ("tapBoot")
    PassiveAccrual,
    /// Temporary elevated level with auto-revert ("turbo")
    TimedBurst,
}

impl BoostKind {
    pub const ALL: [BoostKind; 4] = [
        BoostKind::Multiplier,
        BoostKind::EnergyCapacity,
        BoostKind::PassiveAccrual,
        BoostKind::TimedBurst,
    ];

    /// Stable store key for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostKind::Multiplier => "multiplier",
            BoostKind::EnergyCapacity => "energy_capacity",
            BoostKind::PassiveAccrual => "passive_accrual",
            BoostKind::TimedBurst => "timed_burst",
        }
    }

    pub fn from_str(s: &str) -> Option<BoostKind> {
        match s {
            "multiplier" => Some(BoostKind::Multiplier),
            "energy_capacity" => Some(BoostKind::EnergyCapacity),
            "passive_accrual" => Some(BoostKind::PassiveAccrual),
            "timed_burst" => Some(BoostKind::TimedBurst),
            _ => None,
        }
    }

    /// Base price at level 1
    pub fn base_price(&self) -> i64 {
        match self {
            BoostKind::Multiplier => 2000,
            BoostKind::EnergyCapacity => 1500,
            BoostKind::PassiveAccrual => 3500,
            BoostKind::TimedBurst => 5000,
        }
    }
}

/// Price of the next upgrade from `level` to `level + 1`.
///
/// Standard kinds double every level; a timed burst always costs its
/// flat base price since its elevation is temporary.
pub fn upgrade_price(kind: BoostKind, level: i64) -> i64 {
    match kind {
        BoostKind::TimedBurst => kind.base_price(),
        _ => kind.base_price() * 2_i64.pow((level - 1).max(0) as u32),
    }
}

/// Per-player, per-kind boost ownership row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostOwnership {
    pub player_id: String,
    pub kind: BoostKind,
    pub level: i64,
    /// Burst activations counted against today's limit
    pub burst_activations_today: i64,
    /// Calendar day the counter above belongs to
    pub burst_last_activation: Option<NaiveDate>,
    /// When the current burst reverts; derivable without a live timer
    pub burst_expires_at: Option<DateTime<Utc>>,
}

impl BoostOwnership {
    /// Fresh level-1 ownership row
    pub fn new(player_id: &str, kind: BoostKind) -> Self {
        Self {
            player_id: player_id.to_string(),
            kind,
            level: 1,
            burst_activations_today: 0,
            burst_last_activation: None,
            burst_expires_at: None,
        }
    }

    /// Whether the timed burst is active at `now`, derived purely from
    /// stored state. Reversion therefore happens "exactly at expiresAt"
    /// with no reliance on an in-process timer.
    pub fn burst_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.burst_expires_at, Some(expires) if expires > now)
    }

    /// Activations already used today; a stored date other than today
    /// means the counter has rolled over.
    pub fn burst_used_today(&self, today: NaiveDate) -> i64 {
        if self.burst_last_activation == Some(today) {
            self.burst_activations_today
        } else {
            0
        }
    }

    /// Passive-accrual window for this level, in seconds
    pub fn passive_window_secs(&self) -> i64 {
        PASSIVE_BASELINE_SECS + PASSIVE_LEVEL_STEP_SECS * (self.level - 1).max(0)
    }
}

/// Spend cap while a burst is active, scaled by the energy-capacity level
pub fn burst_spend_cap(energy_capacity_level: i64) -> i64 {
    BURST_BASE_CAP * 2 * energy_capacity_level.max(1)
}

/// Boost line in a player snapshot: level plus the price of the next upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostView {
    pub kind: BoostKind,
    pub level: i64,
    pub next_price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_ends_at: Option<DateTime<Utc>>,
}
