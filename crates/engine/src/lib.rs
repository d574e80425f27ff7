//! Terminus Engine - Economy operations over the store and the
//! external verification/payment collaborators

pub mod boosts;
pub mod ledger;
pub mod purchases;
pub mod referrals;
pub mod service;
pub mod tasks;
pub mod verify;

pub use service::GameService;
pub use verify::{ExternalVerifier, LivePaymentGateway, LiveVerifier, PaymentGateway};

#[cfg(test)]
pub(crate) mod testutil {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use terminus_core::{Player, Result, BASELINE_ENERGY};
    use terminus_persistence::{sqlite, Database};

    use crate::verify::{ExternalVerifier, PaymentGateway};
    use terminus_networking::LabeledPrice;

    /// Fixed reference instant used across engine tests
    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    pub async fn test_db() -> Database {
        Database::connect_in_memory().await.unwrap()
    }

    pub async fn seed_player(db: &Database, id: &str) -> Player {
        seed_player_with(db, id, |_| {}).await
    }

    /// Insert a player at the baseline state, tweaked by `adjust`
    pub async fn seed_player_with(
        db: &Database,
        id: &str,
        adjust: impl FnOnce(&mut Player),
    ) -> Player {
        let mut player = Player {
            id: id.to_string(),
            name: id.to_string(),
            coins: 0,
            current_energy: BASELINE_ENERGY,
            max_energy: BASELINE_ENERGY,
            last_sync_at: t0(),
            last_passive_payout_at: None,
            referral_code: format!("UC_{}", id.to_uppercase()),
            referred_by: None,
            wallet_address: None,
            created_at: t0(),
        };
        adjust(&mut player);

        let task_ids = sqlite::list_definition_ids(db.pool()).await.unwrap();
        sqlite::create_player_with_tasks(db.pool(), &player, &task_ids)
            .await
            .unwrap();
        player
    }

    /// Grant a premium window directly at the store level
    pub async fn grant_premium(db: &Database, player_id: &str, ends_at: DateTime<Utc>) {
        sqlx::query("INSERT INTO premium (player_id, amount_spent, ends_at) VALUES (?, 0, ?)")
            .bind(player_id)
            .bind(ends_at)
            .execute(db.pool())
            .await
            .unwrap();
    }

    /// Verifier answering from fixed flags
    #[derive(Debug, Default)]
    pub struct StubVerifier {
        pub nft: bool,
        pub subscribed: bool,
        pub transfer: bool,
    }

    #[async_trait]
    impl ExternalVerifier for StubVerifier {
        async fn check_nft_ownership(&self, _wallet: &str, _collection: &str) -> Result<bool> {
            Ok(self.nft)
        }

        async fn check_channel_subscription(&self, _channel: &str, _user: &str) -> Result<bool> {
            Ok(self.subscribed)
        }

        async fn check_onchain_transfer(
            &self,
            _wallet: &str,
            _min_amount: i64,
            _to: &str,
        ) -> Result<bool> {
            Ok(self.transfer)
        }
    }

    /// Gateway returning a canned invoice URL
    pub struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_invoice(
            &self,
            _title: &str,
            _description: &str,
            payload: &str,
            _prices: &[LabeledPrice],
        ) -> Result<String> {
            Ok(format!("https://t.me/invoice/{payload}"))
        }
    }
}
