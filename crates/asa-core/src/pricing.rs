// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pricing options, guidance, and selection.
//!
//! Each product carries at least one [`PricingOption`]; each package either
//! references one by id (preferred) or names a [`PricingModel`] the product
//! offers. [`select_pricing_option`] runs the full validation matrix and
//! returns the collapsed [`ResolvedPricing`] the adapter layer consumes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use asa_error::{AdcpError, AdcpResult};

/// Pricing model for a pricing option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PricingModel {
    /// Cost per mille (thousand impressions).
    Cpm,
    /// Cost per completed view.
    Cpcv,
    /// Cost per click.
    Cpc,
    /// Cost per rating point.
    Cpp,
    /// Cost per view.
    Cpv,
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cpm => "cpm",
            Self::Cpcv => "cpcv",
            Self::Cpc => "cpc",
            Self::Cpp => "cpp",
            Self::Cpv => "cpv",
        };
        f.write_str(s)
    }
}

/// Auction price guidance. Only `floor` is required; absent percentiles are
/// omitted from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriceGuidance {
    /// Minimum acceptable bid.
    pub floor: f64,

    /// 25th percentile of clearing prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p25: Option<f64>,

    /// Median clearing price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,

    /// 75th percentile of clearing prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p75: Option<f64>,

    /// 90th percentile of clearing prices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
}

/// A pricing contract offered on a product.
///
/// Exactly one of `rate` (fixed) or `price_guidance` (auction) is populated,
/// discriminated by the internal `is_fixed` flag. `is_fixed` never reaches
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PricingOption {
    /// Identifier unique within the product.
    pub pricing_option_id: String,

    /// Pricing model.
    pub pricing_model: PricingModel,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Internal fixed-vs-auction discriminator; stripped from responses.
    #[serde(skip_serializing, default)]
    pub is_fixed: bool,

    /// Fixed rate; present iff the option is fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Auction guidance; present iff the option is auction-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_guidance: Option<PriceGuidance>,

    /// Minimum budget a package selecting this option must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_spend_per_package: Option<f64>,
}

/// The pricing contract resolved for one package, ready for the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedPricing {
    /// The chosen option's id.
    pub pricing_option_id: String,
    /// The chosen model.
    pub pricing_model: PricingModel,
    /// Campaign currency (equals the option's currency).
    pub currency: String,
    /// Fixed rate, for fixed options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    /// Whether the option is fixed-rate.
    pub is_fixed: bool,
    /// Buyer bid, for auction options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,
}

/// The slice of a package request that pricing selection looks at.
#[derive(Debug, Clone, Default)]
pub struct PricingSelector<'a> {
    /// Preferred: the id of an option on the product.
    pub pricing_option_id: Option<&'a str>,
    /// Alternative: a model the product must offer.
    pub pricing_model: Option<PricingModel>,
    /// Buyer bid for auction options.
    pub bid_price: Option<f64>,
    /// Package budget, checked against option minimums.
    pub budget: f64,
}

/// Select and validate a pricing option for one package.
///
/// Implements the full matrix: missing `pricing_options` is a
/// data-integrity defect of the stored product; an unoffered model or a
/// currency mismatch is a request validation failure; a fixed option with
/// no rate is again data integrity; auction options demand a bid at or
/// above the floor; and the package budget must clear the option's
/// minimum spend.
///
/// # Errors
///
/// `data_integrity_error` or `validation_error` per the rules above.
pub fn select_pricing_option(
    product_id: &str,
    options: &[PricingOption],
    selector: &PricingSelector<'_>,
    campaign_currency: &str,
) -> AdcpResult<ResolvedPricing> {
    if options.is_empty() {
        return Err(AdcpError::data_integrity(format!(
            "data integrity error: product '{product_id}' has no pricing_options configured"
        ))
        .with_detail("product_id", product_id));
    }

    let option = if let Some(option_id) = selector.pricing_option_id {
        options
            .iter()
            .find(|o| o.pricing_option_id == option_id)
            .ok_or_else(|| {
                AdcpError::validation(format!(
                    "product '{product_id}' has no pricing option '{option_id}'"
                ))
                .with_detail("pricing_option_id", option_id)
            })?
    } else if let Some(model) = selector.pricing_model {
        options
            .iter()
            .find(|o| o.pricing_model == model && o.currency == campaign_currency)
            .ok_or_else(|| {
                AdcpError::validation(format!(
                    "product '{product_id}' does not offer pricing model '{model}' in {campaign_currency}"
                ))
                .with_detail("pricing_model", model.to_string())
                .with_detail("currency", campaign_currency)
            })?
    } else {
        return Err(AdcpError::validation(format!(
            "package for product '{product_id}' must specify pricing_option_id or pricing_model"
        )));
    };

    if option.currency != campaign_currency {
        return Err(AdcpError::validation(format!(
            "pricing option '{}' is denominated in {} but the campaign currency is {campaign_currency}",
            option.pricing_option_id, option.currency
        )));
    }

    let mut resolved = ResolvedPricing {
        pricing_option_id: option.pricing_option_id.clone(),
        pricing_model: option.pricing_model,
        currency: option.currency.clone(),
        rate: None,
        is_fixed: option.is_fixed,
        bid_price: None,
    };

    if option.is_fixed {
        let rate = option.rate.ok_or_else(|| {
            AdcpError::data_integrity(format!(
                "data integrity error: fixed pricing option '{}' on product '{product_id}' has no rate specified",
                option.pricing_option_id
            ))
        })?;
        resolved.rate = Some(rate);
    } else {
        let guidance = option.price_guidance.as_ref().ok_or_else(|| {
            AdcpError::data_integrity(format!(
                "data integrity error: auction pricing option '{}' on product '{product_id}' has no price_guidance",
                option.pricing_option_id
            ))
        })?;
        let bid = selector.bid_price.ok_or_else(|| {
            AdcpError::validation(format!(
                "pricing option '{}' is auction-based and requires bid_price",
                option.pricing_option_id
            ))
        })?;
        if bid < guidance.floor {
            return Err(AdcpError::validation(format!(
                "bid_price {bid} is below floor price {} for pricing option '{}'",
                guidance.floor, option.pricing_option_id
            )));
        }
        resolved.bid_price = Some(bid);
    }

    if let Some(min_spend) = option.min_spend_per_package {
        if selector.budget < min_spend {
            return Err(AdcpError::validation(format!(
                "package budget {} is below minimum spend {min_spend} for pricing option '{}'",
                selector.budget, option.pricing_option_id
            )));
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_error::ErrorCode;

    fn fixed(id: &str, model: PricingModel, currency: &str, rate: Option<f64>) -> PricingOption {
        PricingOption {
            pricing_option_id: id.into(),
            pricing_model: model,
            currency: currency.into(),
            is_fixed: true,
            rate,
            price_guidance: None,
            min_spend_per_package: None,
        }
    }

    fn auction(id: &str, floor: f64) -> PricingOption {
        PricingOption {
            pricing_option_id: id.into(),
            pricing_model: PricingModel::Cpm,
            currency: "USD".into(),
            is_fixed: false,
            rate: None,
            price_guidance: Some(PriceGuidance {
                floor,
                p25: None,
                p50: Some(floor + 5.0),
                p75: None,
                p90: None,
            }),
            min_spend_per_package: None,
        }
    }

    #[test]
    fn product_without_options_is_data_integrity_error() {
        let selector = PricingSelector {
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("legacy_product", &[], &selector, "USD").unwrap_err();
        assert_eq!(err.code, ErrorCode::DataIntegrityError);
        assert!(err.message.contains("has no pricing_options configured"));
    }

    #[test]
    fn matching_model_resolves() {
        let options = vec![fixed("cpcv_usd", PricingModel::Cpcv, "USD", Some(0.25))];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpcv),
            budget: 10_000.0,
            ..Default::default()
        };
        let resolved = select_pricing_option("video_product", &options, &selector, "USD").unwrap();
        assert_eq!(resolved.pricing_model, PricingModel::Cpcv);
        assert_eq!(resolved.rate, Some(0.25));
        assert!(resolved.is_fixed);
    }

    #[test]
    fn unoffered_model_is_validation_error() {
        let options = vec![fixed("cpm_usd", PricingModel::Cpm, "USD", Some(10.0))];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpp),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("display_product", &options, &selector, "USD").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("does not offer pricing model"));
        assert!(err.message.contains("cpp"));
    }

    #[test]
    fn currency_mismatch_is_validation_error() {
        let options = vec![fixed("cpm_usd", PricingModel::Cpm, "USD", Some(10.0))];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpm),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &options, &selector, "EUR").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("EUR"));
    }

    #[test]
    fn explicit_option_id_with_wrong_currency_is_validation_error() {
        let options = vec![fixed("cpm_usd", PricingModel::Cpm, "USD", Some(10.0))];
        let selector = PricingSelector {
            pricing_option_id: Some("cpm_usd"),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &options, &selector, "EUR").unwrap_err();
        assert!(err.message.contains("denominated in USD"));
    }

    #[test]
    fn auction_without_bid_is_validation_error() {
        let options = vec![auction("cpm_auction", 10.0)];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpm),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &options, &selector, "USD").unwrap_err();
        assert!(err.message.contains("requires bid_price"));
    }

    #[test]
    fn bid_below_floor_is_rejected() {
        let options = vec![auction("cpm_auction", 15.0)];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpm),
            bid_price: Some(10.0),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &options, &selector, "USD").unwrap_err();
        assert!(err.message.contains("below floor price"));
    }

    #[test]
    fn valid_auction_bid_resolves() {
        let options = vec![auction("cpm_auction", 10.0)];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpm),
            bid_price: Some(18.0),
            budget: 5000.0,
            ..Default::default()
        };
        let resolved = select_pricing_option("product_1", &options, &selector, "USD").unwrap();
        assert!(!resolved.is_fixed);
        assert_eq!(resolved.bid_price, Some(18.0));
        assert_eq!(resolved.rate, None);
    }

    #[test]
    fn fixed_without_rate_is_data_integrity_error() {
        let options = vec![fixed("cpm_usd", PricingModel::Cpm, "USD", None)];
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpm),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &options, &selector, "USD").unwrap_err();
        assert_eq!(err.code, ErrorCode::DataIntegrityError);
        assert!(err.message.contains("no rate specified"));
    }

    #[test]
    fn budget_below_minimum_spend_is_rejected() {
        let mut option = fixed("cpcv_usd", PricingModel::Cpcv, "USD", Some(0.3));
        option.min_spend_per_package = Some(10_000.0);
        let selector = PricingSelector {
            pricing_model: Some(PricingModel::Cpcv),
            budget: 5000.0,
            ..Default::default()
        };
        let err = select_pricing_option("product_1", &[option], &selector, "USD").unwrap_err();
        assert!(err.message.contains("below minimum spend"));
    }

    #[test]
    fn is_fixed_never_serialized() {
        let option = fixed("cpm_usd_fixed", PricingModel::Cpm, "USD", Some(12.5));
        let json = serde_json::to_value(&option).unwrap();
        assert!(json.get("is_fixed").is_none());
        assert_eq!(json["rate"], 12.5);
        assert!(json.get("price_guidance").is_none());
    }

    #[test]
    fn auction_option_omits_null_rate() {
        let option = auction("cpm_auction", 5.0);
        let json = serde_json::to_value(&option).unwrap();
        assert!(json.get("rate").is_none());
        assert!(json.get("is_fixed").is_none());
        assert_eq!(json["price_guidance"]["floor"], 5.0);
        assert!(json["price_guidance"].get("p25").is_none());
        assert_eq!(json["price_guidance"]["p50"], 10.0);
    }
}
