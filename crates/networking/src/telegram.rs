//! Telegram Bot API wrapper for membership checks and Stars invoices

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use terminus_core::{Error, Result};
use tracing::{debug, error, instrument};

const TELEGRAM_BASE: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Invoice currency for Telegram Stars payments
const STARS_CURRENCY: &str = "XTR";

/// Client for the Telegram Bot API
pub struct TelegramClient {
    http: Client,
    base_url: String,
    bot_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
}

/// One line item on an invoice
#[derive(Debug, Clone, Serialize)]
pub struct LabeledPrice {
    pub label: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceLink<'a> {
    title: &'a str,
    description: &'a str,
    payload: &'a str,
    provider_token: &'a str,
    currency: &'a str,
    prices: &'a [LabeledPrice],
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: TELEGRAM_BASE.to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    /// Create a client against a different endpoint (for testing)
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Self {
        let mut client = Self::new(bot_token);
        client.base_url = base_url.trim_end_matches('/').to_string();
        client
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }

    /// Check whether the user is a member of the channel.
    ///
    /// Counts `member`, `administrator`, and `creator`; a `left` or
    /// `kicked` record means not subscribed.
    #[instrument(skip(self))]
    pub async fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        let url = self.method_url("getChatMember");

        debug!("Checking channel membership for {}", user_id);

        let response = self
            .http
            .get(&url)
            .query(&[("chat_id", channel_id), ("user_id", user_id)])
            .send()
            .await?;

        let body: ApiResponse<ChatMember> = response.json().await.map_err(|e| {
            error!("Failed to parse getChatMember response: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "unknown".to_string());
            error!("getChatMember failed: {}", description);
            return Err(Error::VerifierUnavailable(description));
        }

        let member = body
            .result
            .ok_or_else(|| Error::InvalidData("getChatMember returned no result".into()))?;

        debug!("Membership status: {}", member.status);
        Ok(matches!(
            member.status.as_str(),
            "member" | "administrator" | "creator"
        ))
    }

    /// Create a Stars invoice link for one sku.
    ///
    /// The payload carries the charge id (`{player_id}_{nonce}`) that
    /// confirmation later resolves back to a player.
    #[instrument(skip(self))]
    pub async fn create_invoice_link(
        &self,
        title: &str,
        description: &str,
        payload: &str,
        prices: &[LabeledPrice],
    ) -> Result<String> {
        let url = self.method_url("createInvoiceLink");

        debug!("Creating invoice link for payload {}", payload);

        let request = CreateInvoiceLink {
            title,
            description,
            payload,
            // Stars invoices use an empty provider token
            provider_token: "",
            currency: STARS_CURRENCY,
            prices,
        };

        let response = self.http.post(&url).json(&request).send().await?;

        let body: ApiResponse<String> = response.json().await.map_err(|e| {
            error!("Failed to parse createInvoiceLink response: {}", e);
            Error::InvalidData(e.to_string())
        })?;

        if !body.ok {
            let description = body.description.unwrap_or_else(|| "unknown".to_string());
            error!("createInvoiceLink failed: {}", description);
            return Err(Error::PaymentGatewayError(description));
        }

        body.result
            .ok_or_else(|| Error::InvalidData("createInvoiceLink returned no result".into()))
    }
}
