//! Task definitions, per-player progress, and the stage machine

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Where a task reward is routed on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewardRouting {
    /// Credit the player's coin balance
    Coin,
    /// Credit the player's league free score instead of coins
    LeagueScore,
}

/// Named player-state predicates for internal milestone tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Milestone {
    /// The player has linked an external wallet address
    LinkedWalletAddress,
    /// The player created a clan
    ClanCreator,
}

/// Tagged task-kind union, stored as JSON alongside the definition.
///
/// One verifier/predicate per tag behind a single exhaustive dispatch
/// in the task engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskKind {
    /// Visit a link, then pass one time gate
    OpenLink { url: String },
    /// One-time external check: player owns an NFT from a collection
    NftOwnership { collection: String },
    /// One-time external check: player is subscribed to a channel
    ChannelSubscription { channel_id: String },
    /// One-time external check: an on-chain transfer was made
    OnChainTransfer { min_amount: i64, to_address: String },
    /// Completable once per calendar day
    PeriodicRecurring,
    /// Several real-time-delayed steps before completion
    MultiStageDelayed { stages: i64, gate_hours: i64 },
    /// Completed once the player has invited enough friends
    FriendCountThreshold { friends: i64 },
    /// Completed once a named player-state predicate holds
    InternalMilestone { milestone: Milestone },
    /// Completed once accumulated purchases reach a threshold
    SpendThreshold { threshold: f64 },
    /// Check in N days in a row
    ConsecutiveDaysChallenge { target_days: i64 },
}

impl TaskKind {
    /// Final stage for stage-machine kinds; `None` for the rest
    pub fn final_stage(&self) -> Option<i64> {
        match self {
            TaskKind::OpenLink { .. } => Some(2),
            TaskKind::MultiStageDelayed { stages, .. } => Some(*stages),
            _ => None,
        }
    }

    /// Gate duration for stage-machine kinds (rolling window)
    pub fn gate_duration(&self) -> Duration {
        match self {
            TaskKind::MultiStageDelayed { gate_hours, .. } => Duration::hours(*gate_hours),
            _ => Duration::hours(24),
        }
    }

    /// Recurring tasks reset at day rollover instead of staying done
    pub fn is_recurring(&self) -> bool {
        matches!(self, TaskKind::PeriodicRecurring)
    }
}

/// A task definition shared by all players
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub id: i64,
    pub title: String,
    pub reward_coins: i64,
    pub routing: RewardRouting,
    pub kind: TaskKind,
}

/// Per-player progress against one definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub player_id: String,
    pub task_id: i64,
    pub completed: bool,
    /// Monotonically non-decreasing except the recurring day-rollover reset
    pub stage: i64,
    pub stage_entered_at: Option<DateTime<Utc>>,
    pub last_completed_date: Option<NaiveDate>,
    /// Consecutive-days counter
    pub streak_days: i64,
}

impl TaskProgress {
    pub fn new(player_id: &str, task_id: i64) -> Self {
        Self {
            player_id: player_id.to_string(),
            task_id,
            completed: false,
            stage: 0,
            stage_entered_at: None,
            last_completed_date: None,
            streak_days: 0,
        }
    }

    /// Whether this progress sits at a gate stage (odd stages wait on a
    /// time gate; even stages advance immediately).
    pub fn at_gate_stage(&self) -> bool {
        !self.completed && self.stage % 2 == 1
    }
}

/// One transition of the stage machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    /// Stage moved forward; not done yet
    Advanced { stage: i64 },
    /// Final stage reached; reward is due
    Finished,
}

/// Advance a staged task by one step.
///
/// Even stages record `stage_entered_at` and move on; odd stages open
/// only once the rolling gate window has elapsed, failing `TooEarly`
/// with the stage unchanged otherwise.
pub fn advance_stage(
    progress: &mut TaskProgress,
    gate: Duration,
    final_stage: i64,
    now: DateTime<Utc>,
) -> Result<StageAdvance> {
    if progress.stage % 2 == 0 {
        progress.stage += 1;
        progress.stage_entered_at = Some(now);
    } else {
        let entered = progress
            .stage_entered_at
            .ok_or_else(|| Error::InvalidData("gate stage without entry timestamp".into()))?;
        if now < entered + gate {
            return Err(Error::TooEarly);
        }
        progress.stage += 1;
    }

    if progress.stage >= final_stage {
        progress.completed = true;
        Ok(StageAdvance::Finished)
    } else {
        Ok(StageAdvance::Advanced {
            stage: progress.stage,
        })
    }
}

/// Task line in a player snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task_id: i64,
    pub title: String,
    pub reward_coins: i64,
    pub routing: RewardRouting,
    pub kind: TaskKind,
    pub completed: bool,
    pub stage: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_date: Option<NaiveDate>,
}

/// Outcome of a `check_task` call: either the task moved (or finished),
/// or the external condition is not satisfied yet and nothing changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum TaskCheckOutcome {
    /// Task completed; reward credited
    Completed,
    /// Stage machine moved forward without finishing
    Advanced { stage: i64 },
    /// Already completed earlier; idempotent no-op
    AlreadyCompleted,
    /// Condition not satisfied; safely retryable, no state changed
    Pending { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn even_stage_advances_and_records_entry() {
        let mut p = TaskProgress::new("p1", 1);
        let out = advance_stage(&mut p, Duration::hours(24), 4, at(10, 0)).unwrap();
        assert_eq!(out, StageAdvance::Advanced { stage: 1 });
        assert_eq!(p.stage_entered_at, Some(at(10, 0)));
        assert!(p.at_gate_stage());
    }

    #[test]
    fn gate_stage_rejects_before_window() {
        let mut p = TaskProgress::new("p1", 1);
        advance_stage(&mut p, Duration::hours(24), 4, at(10, 0)).unwrap();

        // 23h59m later: still closed, stage unchanged
        let early = at(10, 0) + Duration::hours(23) + Duration::minutes(59);
        assert!(matches!(
            advance_stage(&mut p, Duration::hours(24), 4, early),
            Err(Error::TooEarly)
        ));
        assert_eq!(p.stage, 1);

        // 24h01m later: opens
        let late = at(10, 0) + Duration::hours(24) + Duration::minutes(1);
        let out = advance_stage(&mut p, Duration::hours(24), 4, late).unwrap();
        assert_eq!(out, StageAdvance::Advanced { stage: 2 });
    }

    #[test]
    fn final_stage_completes() {
        let mut p = TaskProgress::new("p1", 1);
        advance_stage(&mut p, Duration::hours(24), 2, at(10, 0)).unwrap();
        let late = at(10, 0) + Duration::hours(25);
        let out = advance_stage(&mut p, Duration::hours(24), 2, late).unwrap();
        assert_eq!(out, StageAdvance::Finished);
        assert!(p.completed);
    }

    #[test]
    fn kind_json_round_trips_with_tag() {
        let kind = TaskKind::NftOwnership {
            collection: "EQcollection".into(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"nftOwnership\""));
        let back: TaskKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
