//! External verification and payment seams
//!
//! Task checks and purchases depend on the outside world only through
//! these traits, so tests swap in stubs and the task engine can map
//! any upstream failure to a retryable negative result.

use async_trait::async_trait;
use terminus_core::Result;
use terminus_networking::{LabeledPrice, TelegramClient, TonApiClient};
use tracing::warn;

/// External fact checks consumed by the task engine
#[async_trait]
pub trait ExternalVerifier: Send + Sync {
    /// Does the wallet hold an NFT from the collection?
    async fn check_nft_ownership(&self, wallet_address: &str, collection: &str) -> Result<bool>;

    /// Is the user subscribed to the channel?
    async fn check_channel_subscription(&self, channel_id: &str, user_id: &str) -> Result<bool>;

    /// Did the wallet send at least `min_amount` to `to_address`?
    async fn check_onchain_transfer(
        &self,
        wallet_address: &str,
        min_amount: i64,
        to_address: &str,
    ) -> Result<bool>;
}

/// Invoice creation for the purchase flow
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an invoice and return its URL. The payload is the charge
    /// id that confirmation later carries back.
    async fn create_invoice(
        &self,
        title: &str,
        description: &str,
        payload: &str,
        prices: &[LabeledPrice],
    ) -> Result<String>;
}

/// Production verifier backed by tonapi.io and the Telegram Bot API
pub struct LiveVerifier {
    ton: TonApiClient,
    telegram: TelegramClient,
}

impl LiveVerifier {
    pub fn new(ton: TonApiClient, telegram: TelegramClient) -> Self {
        Self { ton, telegram }
    }
}

#[async_trait]
impl ExternalVerifier for LiveVerifier {
    async fn check_nft_ownership(&self, wallet_address: &str, collection: &str) -> Result<bool> {
        self.ton
            .owns_nft_from_collection(wallet_address, collection)
            .await
    }

    async fn check_channel_subscription(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.telegram.is_channel_member(channel_id, user_id).await
    }

    async fn check_onchain_transfer(
        &self,
        wallet_address: &str,
        min_amount: i64,
        to_address: &str,
    ) -> Result<bool> {
        self.ton
            .has_transfer_to(wallet_address, to_address, min_amount)
            .await
    }
}

/// Production payment gateway over Telegram Stars invoices
pub struct LivePaymentGateway {
    telegram: TelegramClient,
}

impl LivePaymentGateway {
    pub fn new(telegram: TelegramClient) -> Self {
        Self { telegram }
    }
}

#[async_trait]
impl PaymentGateway for LivePaymentGateway {
    async fn create_invoice(
        &self,
        title: &str,
        description: &str,
        payload: &str,
        prices: &[LabeledPrice],
    ) -> Result<String> {
        self.telegram
            .create_invoice_link(title, description, payload, prices)
            .await
    }
}

/// Collapse a verifier result to a yes/no answer: upstream failures
/// count as "not satisfied" and never mutate state.
pub(crate) fn verdict(result: Result<bool>) -> bool {
    match result {
        Ok(satisfied) => satisfied,
        Err(e) => {
            warn!("Verifier check failed, treating as unsatisfied: {}", e);
            false
        }
    }
}
