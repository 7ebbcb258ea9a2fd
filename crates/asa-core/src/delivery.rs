// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery reporting request/response models.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use asa_error::{AdcpError, AdcpResult, ErrorObject};

use crate::media_buy::MediaBuyStatus;

/// `status_filter` accepts a single status or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum StatusFilter {
    /// A single status.
    One(MediaBuyStatus),
    /// Any of these statuses.
    Many(Vec<MediaBuyStatus>),
}

impl StatusFilter {
    /// The statuses this filter admits.
    pub fn statuses(&self) -> Vec<MediaBuyStatus> {
        match self {
            Self::One(s) => vec![*s],
            Self::Many(list) => list.clone(),
        }
    }
}

/// `get_media_buy_delivery` request. All filters optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetMediaBuyDeliveryRequest {
    /// Restrict to these media buys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_buy_ids: Vec<String>,

    /// Restrict to buys with these buyer refs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buyer_refs: Vec<String>,

    /// Restrict to buys in these statuses. Unknown status strings fail
    /// deserialization and surface as `validation_error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<StatusFilter>,

    /// Reporting period start (inclusive, UTC date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    /// Reporting period end (inclusive, UTC date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl GetMediaBuyDeliveryRequest {
    /// Reject an inverted reporting period.
    ///
    /// # Errors
    ///
    /// `validation_error` when `end_date < start_date`.
    pub fn validate_period(&self) -> AdcpResult<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(AdcpError::validation(format!(
                    "end_date {end} precedes start_date {start}"
                )));
            }
        }
        Ok(())
    }
}

/// Delivered totals for one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackageDelivery {
    /// The package these totals describe.
    pub package_id: String,

    /// Impressions delivered in the period.
    pub impressions: u64,

    /// Spend in the period, in the buy's currency.
    pub spend: f64,

    /// Clicks, where the ad server reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clicks: Option<u64>,

    /// Video completions, where the ad server reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_completions: Option<u64>,
}

/// Delivery report for one media buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MediaBuyDelivery {
    /// The buy this report describes.
    pub media_buy_id: String,

    /// The buyer's reference for the buy.
    pub buyer_ref: String,

    /// Status at reporting time.
    pub status: MediaBuyStatus,

    /// Per-package totals.
    pub by_package: Vec<PackageDelivery>,

    /// Sum of package impressions.
    pub total_impressions: u64,

    /// Sum of package spend.
    pub total_spend: f64,
}

/// `get_media_buy_delivery` response.
///
/// Either `deliveries` (success) or `errors` is populated; the sum type
/// keeps the shapes from co-occurring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum GetMediaBuyDeliveryResponse {
    /// Reports fetched.
    Success(DeliverySuccess),
    /// The fetch failed.
    Error(DeliveryError),
}

/// Success shape of the delivery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliverySuccess {
    /// One report per matched media buy.
    pub deliveries: Vec<MediaBuyDelivery>,

    /// Currency the totals are denominated in.
    pub currency: String,
}

/// Error shape of the delivery response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryError {
    /// What went wrong. Never empty.
    pub errors: Vec<ErrorObject>,
}

impl fmt::Display for GetMediaBuyDeliveryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(s) => {
                let impressions: u64 = s.deliveries.iter().map(|d| d.total_impressions).sum();
                write!(
                    f,
                    "{} report(s), {impressions} impression(s)",
                    s.deliveries.len()
                )
            }
            Self::Error(e) => write!(
                f,
                "delivery fetch failed: {}",
                e.errors
                    .first()
                    .map(|err| err.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_accepts_single_value() {
        let req: GetMediaBuyDeliveryRequest =
            serde_json::from_str(r#"{"status_filter": "active"}"#).unwrap();
        assert_eq!(
            req.status_filter.unwrap().statuses(),
            vec![MediaBuyStatus::Active]
        );
    }

    #[test]
    fn status_filter_accepts_list() {
        let req: GetMediaBuyDeliveryRequest =
            serde_json::from_str(r#"{"status_filter": ["active", "completed"]}"#).unwrap();
        assert_eq!(
            req.status_filter.unwrap().statuses(),
            vec![MediaBuyStatus::Active, MediaBuyStatus::Completed]
        );
    }

    #[test]
    fn unknown_status_fails_deserialization() {
        let res = serde_json::from_str::<GetMediaBuyDeliveryRequest>(
            r#"{"status_filter": "launching"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn inverted_period_is_rejected() {
        let req = GetMediaBuyDeliveryRequest {
            start_date: Some(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()),
            end_date: Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
            ..Default::default()
        };
        assert!(req.validate_period().is_err());
    }

    #[test]
    fn success_shape_serializes_without_errors_key() {
        let resp = GetMediaBuyDeliveryResponse::Success(DeliverySuccess {
            deliveries: vec![],
            currency: "USD".into(),
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("errors").is_none());
        assert!(json.get("deliveries").is_some());
    }

    #[test]
    fn optional_click_metrics_omitted() {
        let pkg = PackageDelivery {
            package_id: "pkg_1".into(),
            impressions: 100,
            spend: 1.5,
            clicks: None,
            video_completions: None,
        };
        let json = serde_json::to_value(&pkg).unwrap();
        assert!(json.get("clicks").is_none());
        assert!(json.get("video_completions").is_none());
    }
}
