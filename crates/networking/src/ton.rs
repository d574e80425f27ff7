//! TON blockchain lookups through the tonapi.io REST API

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use terminus_core::{Error, Result};
use tracing::{debug, error, instrument};

const TONAPI_BASE: &str = "https://tonapi.io/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for on-chain ownership and transfer checks
pub struct TonApiClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NftItemsResponse {
    nft_items: Vec<NftItem>,
}

#[derive(Debug, Deserialize)]
struct NftItem {
    #[allow(dead_code)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    #[serde(default)]
    out_msgs: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    value: i64,
    destination: Option<AccountAddress>,
}

#[derive(Debug, Deserialize)]
struct AccountAddress {
    address: String,
}

impl TonApiClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: TONAPI_BASE.to_string(),
        }
    }

    /// Create a client against a different endpoint (for testing)
    pub fn with_base_url(base_url: &str) -> Self {
        let mut client = Self::new();
        client.base_url = base_url.trim_end_matches('/').to_string();
        client
    }

    /// Check whether the wallet holds at least one NFT from the collection
    #[instrument(skip(self))]
    pub async fn owns_nft_from_collection(
        &self,
        wallet_address: &str,
        collection: &str,
    ) -> Result<bool> {
        let url = format!("{}/accounts/{}/nfts", self.base_url, wallet_address);

        debug!("Fetching NFTs for {}", wallet_address);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("collection", collection),
                ("limit", "10"),
                ("indirect_ownership", "false"),
            ])
            .send()
            .await?;

        let response = response.error_for_status().map_err(|e| {
            error!("NFT lookup failed: {}", e);
            Error::VerifierUnavailable(e.to_string())
        })?;

        let items: NftItemsResponse = response.json().await.map_err(|e| {
            error!("Failed to parse NFT response: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        debug!("Found {} NFT(s) in collection", items.nft_items.len());
        Ok(!items.nft_items.is_empty())
    }

    /// Check whether the wallet ever sent at least `min_amount` nanotons
    /// to the given address.
    #[instrument(skip(self))]
    pub async fn has_transfer_to(
        &self,
        wallet_address: &str,
        to_address: &str,
        min_amount: i64,
    ) -> Result<bool> {
        let url = format!(
            "{}/blockchain/accounts/{}/transactions",
            self.base_url, wallet_address
        );

        debug!("Fetching transactions for {}", wallet_address);

        let response = self
            .http
            .get(&url)
            .query(&[("limit", "100")])
            .send()
            .await?;

        let response = response.error_for_status().map_err(|e| {
            error!("Transaction lookup failed: {}", e);
            Error::VerifierUnavailable(e.to_string())
        })?;

        let body: TransactionsResponse = response.json().await.map_err(|e| {
            error!("Failed to parse transactions response: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        let found = body.transactions.iter().any(|tx| {
            tx.out_msgs.iter().any(|msg| {
                msg.value >= min_amount
                    && msg
                        .destination
                        .as_ref()
                        .map(|dest| dest.address == to_address)
                        .unwrap_or(false)
            })
        });

        debug!("Matching transfer found: {}", found);
        Ok(found)
    }
}

impl Default for TonApiClient {
    fn default() -> Self {
        Self::new()
    }
}
