//! Game service facade exposed to the API layer
//!
//! Owns the database handle and the external collaborators; every
//! operation stamps `Utc::now()` and delegates to the engine modules.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use terminus_core::{
    AppliedEffect, BoostKind, Error, PlayerSnapshot, Result, RewardRouting, SpendOutcome,
    TaskCheckOutcome, TaskDefinition, TaskKind,
};
use terminus_persistence::{sqlite, Database};
use tracing::instrument;

use crate::boosts::{self, UpgradeOutcome};
use crate::verify::{ExternalVerifier, PaymentGateway};
use crate::{ledger, purchases, referrals, tasks};

/// The economy engine's single entry point
pub struct GameService {
    db: Database,
    verifier: Arc<dyn ExternalVerifier>,
    gateway: Arc<dyn PaymentGateway>,
}

impl GameService {
    pub fn new(
        db: Database,
        verifier: Arc<dyn ExternalVerifier>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            verifier,
            gateway,
        }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Create a player on first app open; an existing player just gets
    /// their current snapshot back.
    #[instrument(skip(self))]
    pub async fn create_player(&self, player_id: &str, name: &str) -> Result<PlayerSnapshot> {
        let now = Utc::now();

        if !sqlite::player_exists(self.pool(), player_id).await? {
            let code = referrals::unique_referral_code(self.pool()).await?;
            let player = referrals::new_player(player_id, name, code, None, now);
            let task_ids = sqlite::list_definition_ids(self.pool()).await?;
            sqlite::create_player_with_tasks(self.pool(), &player, &task_ids).await?;
        }

        self.snapshot(player_id, now).await
    }

    /// Register a player who arrived through an invite code
    #[instrument(skip(self))]
    pub async fn register_invite(
        &self,
        inviter_code: &str,
        player_id: &str,
        name: &str,
        premium_invitee: bool,
    ) -> Result<PlayerSnapshot> {
        let now = Utc::now();
        referrals::register_invite(self.pool(), inviter_code, player_id, name, premium_invitee, now)
            .await?;
        self.snapshot(player_id, now).await
    }

    /// Sync energy, run day rollover, and return the full snapshot
    #[instrument(skip(self))]
    pub async fn get_player_state(&self, player_id: &str) -> Result<PlayerSnapshot> {
        let now = Utc::now();
        ledger::sync(self.pool(), player_id, now).await?;
        tasks::refresh(self.pool(), player_id, now).await?;
        self.snapshot(player_id, now).await
    }

    /// Convert energy into coins
    #[instrument(skip(self))]
    pub async fn spend_for_coins(&self, player_id: &str, amount: i64) -> Result<SpendOutcome> {
        ledger::spend_for_coins(self.pool(), player_id, amount, Utc::now()).await
    }

    /// Upgrade a boost or activate the timed burst
    #[instrument(skip(self))]
    pub async fn upgrade_boost(&self, player_id: &str, kind: BoostKind) -> Result<UpgradeOutcome> {
        boosts::upgrade(self.pool(), player_id, kind, Utc::now()).await
    }

    /// Check one task, dispatching to its verifier or stage machine
    #[instrument(skip(self))]
    pub async fn check_task(&self, player_id: &str, task_id: i64) -> Result<TaskCheckOutcome> {
        tasks::check_task(
            self.pool(),
            self.verifier.as_ref(),
            player_id,
            task_id,
            Utc::now(),
        )
        .await
    }

    /// Record a purchase intent and return its invoice URL
    #[instrument(skip(self))]
    pub async fn initiate_purchase(
        &self,
        player_id: &str,
        sku: &str,
        amount: f64,
    ) -> Result<String> {
        purchases::initiate_purchase(self.pool(), self.gateway.as_ref(), player_id, sku, amount)
            .await
    }

    /// Apply a confirmed charge to its entitlement
    #[instrument(skip(self))]
    pub async fn confirm_purchase(&self, charge_id: &str, amount: f64) -> Result<AppliedEffect> {
        purchases::confirm_purchase(self.pool(), charge_id, amount, Utc::now()).await
    }

    /// Add a task definition, visible to every player immediately
    #[instrument(skip(self))]
    pub async fn add_task_definition(
        &self,
        title: &str,
        reward_coins: i64,
        routing: RewardRouting,
        kind: TaskKind,
    ) -> Result<TaskDefinition> {
        tasks::add_definition(self.pool(), title, reward_coins, routing, kind).await
    }

    /// Link the external wallet address on-chain verifiers check against
    #[instrument(skip(self))]
    pub async fn link_wallet_address(&self, player_id: &str, address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(Error::Validation("wallet address must not be empty".into()));
        }
        sqlite::require_player(self.pool(), player_id).await?;
        sqlite::set_wallet_address(self.pool(), player_id, address).await
    }

    async fn snapshot(&self, player_id: &str, now: DateTime<Utc>) -> Result<PlayerSnapshot> {
        let player = sqlite::require_player(self.pool(), player_id).await?;
        let boosts = boosts::snapshot_views(self.pool(), player_id, now).await?;
        let tasks = sqlite::list_task_views(self.pool(), player_id).await?;
        let invited = sqlite::list_invited(self.pool(), player_id).await?;
        let premium = sqlite::get_premium(self.pool(), player_id).await?;

        Ok(PlayerSnapshot {
            player,
            boosts,
            tasks,
            invited,
            premium,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{StubGateway, StubVerifier};

    async fn service() -> GameService {
        let db = Database::connect_in_memory().await.unwrap();
        GameService::new(db, Arc::new(StubVerifier::default()), Arc::new(StubGateway))
    }

    #[tokio::test]
    async fn create_player_is_idempotent() {
        let svc = service().await;

        let first = svc.create_player("p1", "Player One").await.unwrap();
        assert_eq!(first.player.coins, 0);
        assert_eq!(first.player.current_energy, 1_000);
        assert!(first.player.referral_code.starts_with("UC_"));

        let again = svc.create_player("p1", "Player One").await.unwrap();
        assert_eq!(again.player.referral_code, first.player.referral_code);
    }

    #[tokio::test]
    async fn full_flow_spend_then_snapshot() {
        let svc = service().await;
        svc.add_task_definition(
            "daily check-in",
            100,
            RewardRouting::Coin,
            TaskKind::PeriodicRecurring,
        )
        .await
        .unwrap();
        svc.create_player("p1", "Player One").await.unwrap();

        let outcome = svc.spend_for_coins("p1", 250).await.unwrap();
        assert_eq!(outcome.new_balance, 250);

        let task_outcome = svc.check_task("p1", 1).await.unwrap();
        assert_eq!(task_outcome, TaskCheckOutcome::Completed);

        let snapshot = svc.get_player_state("p1").await.unwrap();
        assert_eq!(snapshot.player.coins, 350);
        assert_eq!(snapshot.tasks.len(), 1);
        assert!(snapshot.tasks[0].completed);
        assert_eq!(snapshot.boosts.len(), 4);
        assert!(snapshot.premium.is_none());
    }

    #[tokio::test]
    async fn invite_flow_links_the_players() {
        let svc = service().await;
        let inviter = svc.create_player("inviter", "Inviter").await.unwrap();

        let invitee = svc
            .register_invite(&inviter.player.referral_code, "invitee", "Invitee", false)
            .await
            .unwrap();
        assert_eq!(
            invitee.player.referred_by,
            Some(inviter.player.referral_code.clone())
        );

        let inviter = svc.get_player_state("inviter").await.unwrap();
        assert_eq!(inviter.player.coins, 500);
        assert_eq!(inviter.invited.len(), 1);
    }

    #[tokio::test]
    async fn wallet_link_enables_the_milestone_task() {
        let svc = service().await;
        svc.create_player("p1", "Player One").await.unwrap();
        let def = svc
            .add_task_definition(
                "link your wallet",
                400,
                RewardRouting::Coin,
                TaskKind::InternalMilestone {
                    milestone: terminus_core::Milestone::LinkedWalletAddress,
                },
            )
            .await
            .unwrap();

        let out = svc.check_task("p1", def.id).await.unwrap();
        assert!(matches!(out, TaskCheckOutcome::Pending { .. }));

        svc.link_wallet_address("p1", "EQwallet").await.unwrap();
        let out = svc.check_task("p1", def.id).await.unwrap();
        assert_eq!(out, TaskCheckOutcome::Completed);
    }
}
