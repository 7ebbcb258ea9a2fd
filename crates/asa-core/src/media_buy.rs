// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media-buy lifecycle request/response models.
//!
//! `CreateMediaBuyResponse` and `UpdateMediaBuyResponse` are tagged unions
//! with exactly two constructors. Success carries `media_buy_id` and
//! `packages`; error carries an `errors` array; the two shapes can never
//! co-occur because the type has no constructor for it. Every use site
//! pattern-matches rather than probing fields.

use chrono::{DateTime, FixedOffset, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use asa_error::{AdcpError, AdcpResult, ErrorObject};

use crate::budget::BudgetInput;
use crate::pricing::PricingModel;
use crate::time::StartTime;

// ---------------------------------------------------------------------------
// Status machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a media buy.
///
/// Forward path: `pending_activation → scheduled|active → completed`.
/// `paused` and `failed` are absorbing side branches. No backward
/// transition is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaBuyStatus {
    /// Created but awaiting approval or creative readiness.
    PendingActivation,
    /// Approved, waiting for the flight start.
    Scheduled,
    /// Delivering.
    Active,
    /// Flight ended.
    Completed,
    /// Explicitly paused by the buyer.
    Paused,
    /// Creation or activation failed.
    Failed,
}

impl MediaBuyStatus {
    /// Ordinal along the forward path; side branches share the terminal rank.
    fn rank(&self) -> u8 {
        match self {
            Self::PendingActivation => 0,
            Self::Scheduled => 1,
            Self::Active => 2,
            Self::Completed | Self::Paused | Self::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Pause is legal from any non-terminal state and an explicit resume
    /// may leave it again; everything else must move strictly forward.
    pub fn can_transition_to(&self, next: MediaBuyStatus) -> bool {
        if *self == next {
            return false;
        }
        if *self == Self::Paused {
            return matches!(next, Self::Scheduled | Self::Active | Self::Completed);
        }
        match next {
            MediaBuyStatus::Paused | MediaBuyStatus::Failed => {
                !matches!(self, Self::Completed | Self::Failed)
            }
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for MediaBuyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingActivation => "pending_activation",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Webhook endpoint a buyer registers for delivery reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportingWebhook {
    /// Endpoint URL.
    pub url: String,

    /// Reporting frequency (`"hourly"`, `"daily"`, `"monthly"`). Only daily
    /// is currently honored by the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,

    /// Inline authentication used when no registered push-notification
    /// config matches the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<WebhookAuthentication>,
}

/// Inline webhook authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookAuthentication {
    /// Accepted schemes, first entry wins (e.g. `["Bearer"]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,

    /// Credential string for the chosen scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

/// One requested line-item within a `create_media_buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackageRequest {
    /// Buyer's reference for this package.
    pub buyer_ref: String,

    /// Product this package buys.
    pub product_id: String,

    /// Package budget. Current-spec clients send a bare number whose
    /// currency is inherited from the selected pricing option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInput>,

    /// Preferred pricing selection: an option id on the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_option_id: Option<String>,

    /// Alternative pricing selection: a model the product offers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<PricingModel>,

    /// Buyer bid for auction pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,

    /// Creatives to assign to this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creative_ids: Vec<String>,

    /// Buyer targeting overlay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_overlay: Option<crate::targeting::TargetingOverlay>,
}

/// `create_media_buy` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateMediaBuyRequest {
    /// Buyer's reference for the whole buy.
    pub buyer_ref: String,

    /// Brand manifest: a URL string or an inline object. Required.
    pub brand_manifest: serde_json::Value,

    /// Requested packages; at least one.
    pub packages: Vec<PackageRequest>,

    /// Flight start: a timezone-aware datetime or `"asap"`.
    pub start_time: StartTime,

    /// Flight end: a timezone-aware datetime strictly after the start.
    pub end_time: DateTime<FixedOffset>,

    /// Purchase-order number; may feed the media-buy naming template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,

    /// Campaign currency default for bare-number budgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Delivery-report webhook registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_webhook: Option<ReportingWebhook>,
}

impl CreateMediaBuyRequest {
    /// Sum of all package budgets, in the campaign currency.
    pub fn get_total_budget(&self) -> f64 {
        let currency = self.currency.as_deref().unwrap_or("USD");
        self.packages
            .iter()
            .map(|p| crate::budget::extract_budget_amount(p.budget.as_ref(), currency).0)
            .sum()
    }

    /// Validate the request envelope before any product resolution.
    ///
    /// Rejects empty packages, a past start (unless `"asap"`), an end not
    /// strictly after the start, and negative package budgets.
    ///
    /// # Errors
    ///
    /// `validation_error` describing the first violation found.
    pub fn validate_envelope(&self, now: DateTime<Utc>) -> AdcpResult<()> {
        if self.packages.is_empty() {
            return Err(AdcpError::validation(
                "create_media_buy requires at least one package",
            ));
        }

        if let StartTime::At(start) = self.start_time {
            if start.with_timezone(&Utc) < now {
                return Err(AdcpError::validation(format!(
                    "start_time {} is in the past",
                    start.to_rfc3339()
                )));
            }
        }

        let start = self.start_time.resolve(now);
        let end = self.end_time.with_timezone(&Utc);
        if end <= start {
            return Err(AdcpError::validation(format!(
                "end_time {} must be after start_time {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }

        let currency = self.currency.as_deref().unwrap_or("USD");
        for package in &self.packages {
            let (amount, _) =
                crate::budget::extract_budget_amount(package.budget.as_ref(), currency);
            if amount < 0.0 {
                return Err(AdcpError::validation(format!(
                    "package '{}' has a negative budget",
                    package.buyer_ref
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Create response (oneOf)
// ---------------------------------------------------------------------------

/// One line-item in a successful create response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackageResponse {
    /// Adapter-assigned package identifier.
    pub package_id: String,

    /// Buyer's reference for the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,

    /// Whether the package was created paused.
    #[serde(default)]
    pub paused: bool,

    /// Creatives assigned to the package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creative_assignments: Vec<String>,
}

/// Success shape of `create_media_buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateMediaBuySuccess {
    /// Adapter-assigned media buy identifier.
    pub media_buy_id: String,

    /// Echo of the buyer's reference.
    pub buyer_ref: String,

    /// Created packages.
    pub packages: Vec<PackageResponse>,

    /// Deadline by which creatives must be synced, when the adapter
    /// imposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_deadline: Option<DateTime<Utc>>,
}

/// Error shape of `create_media_buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreateMediaBuyError {
    /// Echo of the buyer's reference, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,

    /// What went wrong. Never empty.
    pub errors: Vec<ErrorObject>,
}

/// `create_media_buy` response: success or error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CreateMediaBuyResponse {
    /// The buy was created.
    Success(CreateMediaBuySuccess),
    /// The buy was rejected; nothing was persisted.
    Error(CreateMediaBuyError),
}

impl CreateMediaBuyResponse {
    /// Build an error response from a single agent error.
    pub fn from_error(buyer_ref: Option<String>, err: &AdcpError) -> Self {
        Self::Error(CreateMediaBuyError {
            buyer_ref,
            errors: vec![err.to_object()],
        })
    }
}

impl fmt::Display for CreateMediaBuyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(s) => write!(
                f,
                "media buy {} created with {} package(s)",
                s.media_buy_id,
                s.packages.len()
            ),
            Self::Error(e) => write!(
                f,
                "media buy creation failed: {}",
                e.errors
                    .first()
                    .map(|err| err.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Update request / response
// ---------------------------------------------------------------------------

/// Per-package mutation within an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackageUpdate {
    /// The package to mutate.
    pub package_id: String,

    /// New budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInput>,

    /// Pause or resume the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    /// New bid for auction packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,
}

/// `update_media_buy` request.
///
/// Exactly one of `media_buy_id` or `buyer_ref` selects the buy; the
/// transport boundary enforces the oneOf via [`Self::validate_selector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMediaBuyRequest {
    /// Select by server-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_buy_id: Option<String>,

    /// Select by the buyer's reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_ref: Option<String>,

    /// Pause or resume the whole buy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    /// New flight start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<StartTime>,

    /// New flight end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,

    /// New campaign-level budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInput>,

    /// Per-package mutations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageUpdate>,
}

impl UpdateMediaBuyRequest {
    /// Enforce the `media_buy_id` XOR `buyer_ref` oneOf.
    ///
    /// # Errors
    ///
    /// `invalid_request` when neither or both selectors are present.
    pub fn validate_selector(&self) -> AdcpResult<()> {
        match (&self.media_buy_id, &self.buyer_ref) {
            (Some(_), Some(_)) => Err(AdcpError::invalid_request(
                "update_media_buy accepts media_buy_id or buyer_ref, not both",
            )),
            (None, None) => Err(AdcpError::invalid_request(
                "update_media_buy requires media_buy_id or buyer_ref",
            )),
            _ => Ok(()),
        }
    }
}

/// Success shape of `update_media_buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMediaBuySuccess {
    /// The updated buy.
    pub media_buy_id: String,

    /// Status after the update.
    pub status: MediaBuyStatus,

    /// Packages the adapter applied changes to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_packages: Vec<String>,
}

/// Error shape of `update_media_buy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMediaBuyError {
    /// What went wrong. Never empty.
    pub errors: Vec<ErrorObject>,
}

/// `update_media_buy` response: success or error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum UpdateMediaBuyResponse {
    /// The update was applied.
    Success(UpdateMediaBuySuccess),
    /// The update was rejected; the local record is unchanged.
    Error(UpdateMediaBuyError),
}

impl fmt::Display for UpdateMediaBuyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(s) => write!(f, "media buy {} updated ({})", s.media_buy_id, s.status),
            Self::Error(e) => write!(
                f,
                "media buy update failed: {}",
                e.errors
                    .first()
                    .map(|err| err.message.as_str())
                    .unwrap_or("unknown error")
            ),
        }
    }
}
