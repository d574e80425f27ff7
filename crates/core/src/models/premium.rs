//! Premium entitlement state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A player's premium subscription window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumStatus {
    pub player_id: String,
    pub amount_spent: f64,
    pub ends_at: Option<DateTime<Utc>>,
}

impl PremiumStatus {
    /// Whether the entitlement covers `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.ends_at, Some(ends) if ends >= now)
    }

    /// Base date for an extension: the later of the current end and now,
    /// so stacked purchases never lose days.
    pub fn extension_base(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.ends_at {
            Some(ends) if ends > now => ends,
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn extension_stacks_on_future_end() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let status = PremiumStatus {
            player_id: "p1".into(),
            amount_spent: 7.0,
            ends_at: Some(now + Duration::days(3)),
        };
        assert!(status.is_active(now));
        assert_eq!(status.extension_base(now), now + Duration::days(3));
    }

    #[test]
    fn expired_extension_bases_on_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let status = PremiumStatus {
            player_id: "p1".into(),
            amount_spent: 7.0,
            ends_at: Some(now - Duration::days(1)),
        };
        assert!(!status.is_active(now));
        assert_eq!(status.extension_base(now), now);
    }
}
