// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Shared adapter abstractions for the ad-server boundary.
//!
//! Every backend (GAM, Kevel, Triton, mock) implements [`AdServerAdapter`].
//! The trait's results are plain `Result`s: the wire's success-or-error
//! oneOf is the `Ok`/`Err` split, so no adapter can ever hand the lifecycle
//! a shape that is both.

/// Line-item automation policy.
pub mod policy;
/// Timeout and bounded-retry wrappers for adapter calls.
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use asa_context::RequestContext;
use asa_core::creative::Creative;
use asa_core::delivery::MediaBuyDelivery;
use asa_core::media_buy::{MediaBuyStatus, UpdateMediaBuyRequest};
use asa_core::pricing::ResolvedPricing;
use asa_core::targeting::{TargetingCapability, TargetingOverlay, validate_overlay};
use asa_error::{AdcpError, AdcpResult};

pub use policy::{ActivationDecision, LineItemType, NonGuaranteedAutomation, activation_decision};
pub use retry::{RetryPolicy, with_timeout};

/// Default budget for adapter create/update calls.
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 300;

/// Identity metadata for an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterIdentity {
    /// Stable adapter id (`"mock"`, `"google_ad_manager"`, `"kevel"`,
    /// `"triton"`).
    pub id: String,
    /// Adapter implementation version.
    pub adapter_version: Option<String>,
}

/// One package as handed to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterPackageRequest {
    /// Server-proposed package id.
    pub package_id: String,
    /// Buyer's reference.
    pub buyer_ref: String,
    /// Product bought.
    pub product_id: String,
    /// Resolved pricing contract.
    pub pricing: ResolvedPricing,
    /// Budget amount in the campaign currency.
    pub budget: f64,
    /// Creatives rendered for dispatch (tracking URLs already lifted).
    pub creatives: Vec<Creative>,
    /// Buyer targeting overlay.
    pub targeting_overlay: Option<TargetingOverlay>,
    /// Line-item type from the product's implementation config.
    pub line_item_type: LineItemType,
    /// Automation mode for non-guaranteed types.
    pub automation: NonGuaranteedAutomation,
}

/// The create call as handed to an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterCreateRequest {
    /// Server-derived media buy id (from the naming template).
    pub media_buy_id: String,
    /// Buyer's reference for the buy.
    pub buyer_ref: String,
    /// Purchase-order number, when supplied.
    pub po_number: Option<String>,
    /// Campaign currency.
    pub currency: String,
    /// Sum of package budgets.
    pub total_budget: f64,
    /// Flight start, UTC.
    pub start_time: DateTime<Utc>,
    /// Flight end, UTC.
    pub end_time: DateTime<Utc>,
    /// Packages to create.
    pub packages: Vec<AdapterPackageRequest>,
}

/// One package in a successful adapter create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterPackageOutcome {
    /// Platform package id.
    pub package_id: String,
    /// Buyer's reference.
    pub buyer_ref: String,
    /// Whether the platform created the line item paused.
    pub paused: bool,
    /// Creatives linked during the create.
    pub creative_ids: Vec<String>,
}

/// Successful adapter create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterCreateSuccess {
    /// Platform media buy id.
    pub media_buy_id: String,
    /// Buyer's reference.
    pub buyer_ref: String,
    /// Created packages.
    pub packages: Vec<AdapterPackageOutcome>,
    /// Creative sync deadline, when the platform imposes one.
    pub creative_deadline: Option<DateTime<Utc>>,
    /// The order needs a human confirmation before it can serve.
    pub manual_approval_required: bool,
}

/// Successful adapter update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterUpdateSuccess {
    /// The updated buy.
    pub media_buy_id: String,
    /// Status after the update, as the platform reports it.
    pub status: MediaBuyStatus,
    /// Packages the platform applied changes to.
    pub affected_packages: Vec<String>,
}

/// Uploaded-creative mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedCreative {
    /// Library creative id.
    pub creative_id: String,
    /// Platform-side creative id.
    pub platform_creative_id: String,
}

/// One media buy a delivery query asks about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// The buy.
    pub media_buy_id: String,
    /// Buyer's reference.
    pub buyer_ref: String,
    /// Status at query time.
    pub status: MediaBuyStatus,
    /// Packages to report on.
    pub package_ids: Vec<String>,
}

/// One page of discovered inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Upstream identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Names from the hierarchy root down.
    pub path: Vec<String>,
    /// Upstream status.
    pub status: String,
    /// Adapter-specific metadata.
    pub metadata: serde_json::Value,
}

/// Inventory kinds an adapter can discover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    /// Ad units.
    AdUnits,
    /// Placements.
    Placements,
    /// Labels.
    Labels,
    /// Custom targeting keys.
    CustomTargetingKeys,
    /// First-party audience segments.
    AudienceSegments,
}

impl InventoryKind {
    /// Wire string for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdUnits => "ad_units",
            Self::Placements => "placements",
            Self::Labels => "labels",
            Self::CustomTargetingKeys => "custom_targeting_keys",
            Self::AudienceSegments => "audience_segments",
        }
    }

    /// Whether the upstream API supports `lastModified` filtering for this
    /// kind. Kinds without it are fetched in full even on incremental
    /// syncs.
    pub fn supports_incremental(&self) -> bool {
        matches!(self, Self::AdUnits | Self::Placements | Self::AudienceSegments)
    }
}

/// A backend that speaks one ad server's API.
#[async_trait]
pub trait AdServerAdapter: std::fmt::Debug + Send + Sync {
    /// Identity metadata for this adapter.
    fn identity(&self) -> AdapterIdentity;

    /// The targeting dimensions this ad server supports, by access level.
    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability>;

    /// Create a media buy.
    ///
    /// In dry-run contexts the adapter logs intended operations and returns
    /// a synthetic success without external effects.
    async fn create_media_buy(
        &self,
        ctx: &RequestContext,
        request: AdapterCreateRequest,
    ) -> AdcpResult<AdapterCreateSuccess>;

    /// Update a media buy.
    async fn update_media_buy(
        &self,
        ctx: &RequestContext,
        request: &UpdateMediaBuyRequest,
    ) -> AdcpResult<AdapterUpdateSuccess>;

    /// Upload creatives to the platform library.
    async fn upload_creatives(
        &self,
        ctx: &RequestContext,
        creatives: &[Creative],
    ) -> AdcpResult<Vec<UploadedCreative>>;

    /// Fetch delivery metrics for the given buys over a date range.
    async fn get_media_buy_delivery(
        &self,
        ctx: &RequestContext,
        targets: &[DeliveryTarget],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AdcpResult<Vec<MediaBuyDelivery>>;

    /// Discover inventory of one kind, paged internally.
    ///
    /// `since` filters to items modified after the instant, for kinds where
    /// the upstream supports it (see [`InventoryKind::supports_incremental`]).
    async fn discover_inventory(
        &self,
        ctx: &RequestContext,
        kind: InventoryKind,
        since: Option<DateTime<Utc>>,
    ) -> AdcpResult<Vec<InventoryItem>>;

    /// Fetch values for one custom targeting key (lazy-load path).
    async fn discover_custom_targeting_values(
        &self,
        ctx: &RequestContext,
        key_id: &str,
        max_values: Option<usize>,
    ) -> AdcpResult<Vec<InventoryItem>>;
}

/// Fail the buyer contract when an overlay uses unsupported dimensions.
///
/// Silently dropping targeting a buyer paid for would misrepresent what was
/// bought, so the contract fails loudly instead.
///
/// # Errors
///
/// `adapter_error` with message `"Cannot fulfill buyer contract"` and the
/// violating dimensions in detail.
pub fn ensure_overlay_supported(
    overlay: Option<&TargetingOverlay>,
    capabilities: &BTreeMap<String, TargetingCapability>,
) -> AdcpResult<()> {
    let Some(overlay) = overlay else {
        return Ok(());
    };
    let violations = validate_overlay(overlay, capabilities);
    if violations.is_empty() {
        return Ok(());
    }
    Err(
        AdcpError::adapter(format!(
            "Cannot fulfill buyer contract: {}",
            violations.join("; ")
        ))
        .with_detail("violations", violations),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_core::targeting::platform_capabilities;

    #[test]
    fn empty_overlay_is_always_supported() {
        let caps = platform_capabilities();
        assert!(ensure_overlay_supported(None, &caps).is_ok());
        assert!(ensure_overlay_supported(Some(&TargetingOverlay::default()), &caps).is_ok());
    }

    #[test]
    fn managed_only_dimension_fails_the_contract() {
        let caps = platform_capabilities();
        let mut overlay = TargetingOverlay::default();
        overlay
            .dimensions
            .insert("aee_score".into(), serde_json::json!(0.9));
        let err = ensure_overlay_supported(Some(&overlay), &caps).unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::AdapterError);
        assert!(err.message.starts_with("Cannot fulfill buyer contract"));
    }

    #[test]
    fn adapter_without_geo_rejects_geo_overlay() {
        // An adapter that narrowed geo away entirely.
        let mut caps = platform_capabilities();
        caps.remove("geo_zip");
        let mut overlay = TargetingOverlay::default();
        overlay
            .dimensions
            .insert("geo_zip_any_of".into(), serde_json::json!(["94110"]));
        let err = ensure_overlay_supported(Some(&overlay), &caps).unwrap_err();
        assert!(err.message.contains("geo_zip"));
    }

    #[test]
    fn incremental_support_by_kind() {
        assert!(InventoryKind::AdUnits.supports_incremental());
        assert!(InventoryKind::Placements.supports_incremental());
        assert!(!InventoryKind::Labels.supports_incremental());
        assert!(!InventoryKind::CustomTargetingKeys.supports_incremental());
        assert!(InventoryKind::AudienceSegments.supports_incremental());
    }
}
