//! Purchase initiation and confirmed-charge reconciliation

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use terminus_core::{
    parse_sku, player_id_from_charge, sku_in_catalog, AppliedEffect, Error, Result, SkuEffect,
    PRICE_EPSILON,
};
use terminus_networking::LabeledPrice;
use terminus_persistence::sqlite;
use tracing::{debug, instrument};

use crate::verify::PaymentGateway;

const NONCE_LENGTH: usize = 8;

fn charge_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LENGTH)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

fn invoice_title(effect: SkuEffect) -> &'static str {
    match effect {
        SkuEffect::PremiumDays { .. } => "Premium",
        SkuEffect::ClanRating { .. } => "Clan rating",
        SkuEffect::LeagueScore { .. } => "League score",
    }
}

/// Record a purchase intent and create its invoice.
///
/// Only cataloged skus get an invoice; the pending record is what a
/// later confirmation is matched against.
#[instrument(skip(pool, gateway))]
pub async fn initiate_purchase(
    pool: &SqlitePool,
    gateway: &dyn PaymentGateway,
    player_id: &str,
    sku: &str,
    amount: f64,
) -> Result<String> {
    sqlite::require_player(pool, player_id).await?;

    if !sku_in_catalog(sku) {
        return Err(Error::UnsupportedSku(sku.to_string()));
    }
    if amount <= 0.0 {
        return Err(Error::Validation(format!(
            "purchase amount must be positive, got {amount}"
        )));
    }
    let effect = parse_sku(sku)?;

    sqlite::upsert_pending(pool, player_id, sku, amount).await?;

    let charge_id = format!("{}_{}", player_id, charge_nonce());
    let prices = [LabeledPrice {
        label: sku.to_string(),
        amount: amount.round() as i64,
    }];

    debug!("Invoice requested for {} ({})", sku, charge_id);
    gateway
        .create_invoice(invoice_title(effect), sku, &charge_id, &prices)
        .await
}

/// Reconcile a confirmed charge against the pending purchase and apply
/// its entitlement atomically.
#[instrument(skip(pool))]
pub async fn confirm_purchase(
    pool: &SqlitePool,
    charge_id: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<AppliedEffect> {
    let player_id = player_id_from_charge(charge_id)?;
    sqlite::require_player(pool, player_id).await?;

    let record = sqlite::get_purchase(pool, player_id)
        .await?
        .ok_or_else(|| Error::PurchaseNotFound(player_id.to_string()))?;
    let sku = record
        .pending_sku
        .ok_or_else(|| Error::PurchaseNotFound(player_id.to_string()))?;

    if (amount - record.pending_amount).abs() > PRICE_EPSILON {
        return Err(Error::PriceMismatch {
            expected: record.pending_amount,
            actual: amount,
        });
    }

    let effect = parse_sku(&sku)?;
    match effect {
        SkuEffect::PremiumDays { days } => {
            let base = sqlite::get_premium(pool, player_id)
                .await?
                .map(|status| status.extension_base(now))
                .unwrap_or(now);
            let ends_at = base + Duration::days(days);
            debug!("Premium extended to {}", ends_at);
            sqlite::confirm_premium(pool, player_id, &sku, amount, ends_at).await?;
        }
        SkuEffect::ClanRating { points } => {
            let membership = sqlite::get_membership(pool, player_id)
                .await?
                .ok_or_else(|| {
                    Error::Validation(format!("player {player_id} is not in a clan"))
                })?;
            debug!("Clan {} gains {} rating", membership.clan_id, points);
            sqlite::confirm_clan_rating(pool, player_id, &sku, amount, &membership.clan_id, points)
                .await?;
        }
        SkuEffect::LeagueScore { points } => {
            debug!("League buy-score gains {}", points);
            sqlite::confirm_league_score(pool, player_id, &sku, amount, points).await?;
        }
    }

    Ok(AppliedEffect {
        player_id: player_id.to_string(),
        sku,
        amount,
        effect,
    })
}
