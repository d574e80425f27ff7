//! League standings and minimal clan membership
//!
//! Leaderboard read views live outside this engine; these rows exist
//! only because entitlements and milestone predicates write to them.

use serde::{Deserialize, Serialize};

/// Per-player league score row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueStanding {
    pub player_id: String,
    pub score: i64,
    /// Portion bought through purchases
    pub buy_score: i64,
    /// Portion earned through task rewards
    pub free_score: i64,
}

/// A player's clan membership, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMembership {
    pub player_id: String,
    pub clan_id: String,
    pub role: String,
    pub contributed_rating: i64,
}

impl ClanMembership {
    pub fn is_creator(&self) -> bool {
        self.role == "creator"
    }
}
