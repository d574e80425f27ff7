//! Purchase records, the SKU catalog, and entitlement dispatch

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Tolerance when comparing a confirmed amount to the pending one
pub const PRICE_EPSILON: f64 = 1e-5;

/// Every sku the payment surface may sell
pub const SKU_CATALOG: [&str; 13] = [
    "prem_7",
    "prem_12",
    "prem_25",
    "upClan_1000",
    "upClan_5000",
    "upClan_10000",
    "upClan_25000",
    "upClan_50000",
    "upUsLv_150",
    "upUsLv_350",
    "upUsLv_550",
    "upUsLv_1000",
    "upUsLv_2500",
];

/// Per-player purchase bookkeeping, created lazily on first intent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub player_id: String,
    /// Running total of confirmed purchase amounts
    pub total_accumulated: f64,
    pub last_purchase_sku: Option<String>,
    pub pending_sku: Option<String>,
    pub pending_amount: f64,
}

/// Entitlement effect encoded by a sku prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "effect")]
pub enum SkuEffect {
    /// `prem_N`: extend the premium end date by N days
    PremiumDays { days: i64 },
    /// `upClan_N`: raise clan rating (and member contribution) by N
    ClanRating { points: i64 },
    /// `upUsLv_N`: raise league buy-score by N * 10
    LeagueScore { points: i64 },
}

/// Parse a sku into its entitlement effect.
///
/// Fails `UnsupportedSku` for anything outside the known prefixes.
pub fn parse_sku(sku: &str) -> Result<SkuEffect> {
    let (prefix, value) = sku
        .split_once('_')
        .ok_or_else(|| Error::UnsupportedSku(sku.to_string()))?;
    let n: i64 = value
        .parse()
        .map_err(|_| Error::UnsupportedSku(sku.to_string()))?;
    if n <= 0 {
        return Err(Error::UnsupportedSku(sku.to_string()));
    }

    match prefix {
        "prem" => Ok(SkuEffect::PremiumDays { days: n }),
        "upClan" => Ok(SkuEffect::ClanRating { points: n }),
        "upUsLv" => Ok(SkuEffect::LeagueScore { points: n * 10 }),
        _ => Err(Error::UnsupportedSku(sku.to_string())),
    }
}

/// Whether a sku is sellable at all (purchase initiation is stricter
/// than confirmation: only cataloged skus get an invoice).
pub fn sku_in_catalog(sku: &str) -> bool {
    SKU_CATALOG.contains(&sku)
}

/// Split a charge id of the form `{player_id}_{nonce}` on its last
/// underscore; the nonce never contains one, so player ids with
/// underscores survive the round trip.
pub fn player_id_from_charge(charge_id: &str) -> Result<&str> {
    match charge_id.rsplit_once('_') {
        Some((player_id, _)) if !player_id.is_empty() => Ok(player_id),
        _ => Err(Error::Validation(format!(
            "malformed charge id: {charge_id}"
        ))),
    }
}

/// Descriptor of the effect applied by a confirmed purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedEffect {
    pub player_id: String,
    pub sku: String,
    pub amount: f64,
    #[serde(flatten)]
    pub effect: SkuEffect,
}
