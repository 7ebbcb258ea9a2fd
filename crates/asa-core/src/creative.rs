// SPDX-License-Identifier: MIT OR Apache-2.0
//! Creative assets, statuses, and tracking-URL lifting.
//!
//! A creative is a named bundle of asset slots bound to a format. Buyer
//! tracking pixels arrive inside `assets` under `impression_tracker_*` keys
//! (or with `url_type = "tracker_pixel"`) and are lifted into
//! `delivery_settings.tracking_urls.impression` when the creative is
//! rendered for an adapter; the original asset entries are preserved.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use asa_error::{AdcpError, AdcpResult};

use crate::format::{FormatId, FormatSpec};

/// Review status of a creative in the tenant library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CreativeStatus {
    /// Awaiting human review.
    PendingReview,
    /// Approved for delivery.
    Approved,
    /// Rejected by review.
    Rejected,
    /// Needs adaptation to fit the format.
    AdaptationRequired,
}

/// One asset slot value supplied by the buyer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeAsset {
    /// Asset URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Height in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Duration for time-based assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Inline content (text assets, third-party tags).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// How the URL is used (`"tracker_pixel"`, `"clickthrough"`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_type: Option<String>,
}

/// Tracking URLs grouped by event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrackingUrls {
    /// Impression trackers, fired on render.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impression: Vec<String>,

    /// Click trackers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub click: Vec<String>,
}

/// Delivery-time settings rendered for an adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliverySettings {
    /// Tracking URLs by event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_urls: Option<TrackingUrls>,

    /// Override clickthrough URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickthrough_url: Option<String>,
}

/// An ad asset in the tenant's creative library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Creative {
    /// Identifier unique within the tenant.
    pub creative_id: String,

    /// Display name.
    pub name: String,

    /// The format this creative fills.
    pub format_id: FormatId,

    /// Asset-role name → asset descriptor.
    pub assets: BTreeMap<String, CreativeAsset>,

    /// Delivery settings; populated by tracking-URL lifting before adapter
    /// dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_settings: Option<DeliverySettings>,
}

impl fmt::Display for Creative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.creative_id)
    }
}

/// Key prefix that marks an asset entry as an impression tracker.
const IMPRESSION_TRACKER_PREFIX: &str = "impression_tracker_";

/// URL type that marks an asset entry as an impression tracker.
const TRACKER_PIXEL_URL_TYPE: &str = "tracker_pixel";

/// Lift buyer-provided tracking pixels into delivery settings.
///
/// Walks `assets`; every entry whose key starts with `impression_tracker_`
/// or whose `url_type` is `tracker_pixel` contributes its URL to
/// `delivery_settings.tracking_urls.impression`. Asset entries are left in
/// place. Existing delivery settings are preserved and appended to. Keys
/// are walked in name order, so tracker ordering is deterministic.
pub fn lift_tracking_urls(creative: &mut Creative) {
    let mut lifted: Vec<String> = Vec::new();
    for (key, asset) in &creative.assets {
        let is_tracker = key.starts_with(IMPRESSION_TRACKER_PREFIX)
            || asset.url_type.as_deref() == Some(TRACKER_PIXEL_URL_TYPE);
        if is_tracker {
            if let Some(url) = &asset.url {
                lifted.push(url.clone());
            }
        }
    }

    if lifted.is_empty() {
        return;
    }

    let settings = creative.delivery_settings.get_or_insert_with(Default::default);
    let tracking = settings.tracking_urls.get_or_insert_with(Default::default);
    for url in lifted {
        if !tracking.impression.contains(&url) {
            tracking.impression.push(url);
        }
    }
}

/// Validate a creative against its resolved format spec.
///
/// Checks that every asset slot the format flags `required` is present and
/// carries either an explicit URL, inline content, or a format-defined
/// fallback URL.
///
/// # Errors
///
/// Returns a `validation_error` naming the first missing or URL-less asset.
pub fn validate_against_format(creative: &Creative, spec: &FormatSpec) -> AdcpResult<()> {
    for requirement in spec.required_assets() {
        let Some(asset) = creative.assets.get(&requirement.name) else {
            return Err(AdcpError::validation(format!(
                "creative '{}' is missing required asset '{}' for format '{}'",
                creative.creative_id, requirement.name, spec.format_id
            ))
            .with_detail("asset", requirement.name.clone()));
        };

        let has_url =
            asset.url.is_some() || asset.content.is_some() || requirement.fallback_url.is_some();
        if !has_url {
            return Err(AdcpError::validation(format!(
                "creative '{}' asset '{}' has no URL and format '{}' defines no fallback",
                creative.creative_id, requirement.name, spec.format_id
            ))
            .with_detail("asset", requirement.name.clone()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// sync_creatives
// ---------------------------------------------------------------------------

/// `sync_creatives` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncCreativesRequest {
    /// Creatives to create or update.
    pub creatives: Vec<Creative>,

    /// creative_id → package_ids to assign after the upsert.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assignments: BTreeMap<String, Vec<String>>,

    /// Merge supplied fields into existing rows instead of replacing.
    #[serde(default)]
    pub patch: bool,

    /// Remove library creatives not named in this payload.
    #[serde(default)]
    pub delete_missing: bool,

    /// Validate and report without persisting.
    #[serde(default)]
    pub dry_run: bool,

    /// `"strict"` fails the whole request on the first invalid creative;
    /// `"lenient"` (default) reports per-creative failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_mode: Option<String>,
}

/// Action taken for one creative during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncCreativeAction {
    /// A new library row was created.
    Created,
    /// An existing row was updated.
    Updated,
    /// The creative failed validation; see `errors`.
    Failed,
}

/// Per-creative result row in a `sync_creatives` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncCreativeResult {
    /// The creative this row describes.
    pub creative_id: String,

    /// What happened.
    pub action: SyncCreativeAction,

    /// Review status after the sync, for non-failed rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CreativeStatus>,

    /// Field names that changed, for updates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,

    /// Validation errors, for failed rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<asa_error::ErrorObject>,
}

/// `sync_creatives` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SyncCreativesResponse {
    /// One row per submitted creative, in request order.
    pub results: Vec<SyncCreativeResult>,

    /// Assignment failures; these do not roll back creative upserts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignment_errors: Vec<asa_error::ErrorObject>,

    /// Whether this was a dry run.
    #[serde(default)]
    pub dry_run: bool,
}

impl fmt::Display for SyncCreativesResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created = self
            .results
            .iter()
            .filter(|r| r.action == SyncCreativeAction::Created)
            .count();
        let updated = self
            .results
            .iter()
            .filter(|r| r.action == SyncCreativeAction::Updated)
            .count();
        let failed = self
            .results
            .iter()
            .filter(|r| r.action == SyncCreativeAction::Failed)
            .count();
        write!(f, "synced creatives: {created} created, {updated} updated, {failed} failed")
    }
}

// ---------------------------------------------------------------------------
// list_creatives
// ---------------------------------------------------------------------------

/// Filters accepted by `list_creatives`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeFilters {
    /// Restrict to a review status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CreativeStatus>,

    /// Restrict to a format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_id: Option<FormatId>,

    /// Restrict to creatives carrying all of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Created on or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,

    /// Created on or before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,

    /// Restrict to creatives assigned to these media buys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_buy_ids: Vec<String>,

    /// Restrict to creatives assigned to media buys with these buyer refs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buyer_refs: Vec<String>,

    /// Case-insensitive substring match over the creative name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

/// Sort order for `list_creatives`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeSort {
    /// Field to sort on (`"created_at"`, `"name"`, `"status"`).
    pub field: String,

    /// `"asc"` or `"desc"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// Pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pagination {
    /// Maximum rows to return.
    pub limit: usize,

    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// `list_creatives` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListCreativesRequest {
    /// Structured filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<CreativeFilters>,

    /// Pagination window; defaults to the first 20 rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,

    /// Sort order; defaults to `created_at` descending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<CreativeSort>,
}

/// Library row returned by `list_creatives`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreativeListItem {
    /// The creative itself.
    #[serde(flatten)]
    pub creative: Creative,

    /// Review status.
    pub status: CreativeStatus,

    /// When the row was created.
    pub created_at: DateTime<Utc>,

    /// When the row last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Summary block of a `list_creatives` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuerySummary {
    /// Rows matching the filters, before pagination.
    pub total_matching: usize,
}

/// Pagination block of a `list_creatives` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PageInfo {
    /// 1-based page index derived from limit/offset.
    pub current_page: usize,

    /// Whether rows remain past this page.
    pub has_more: bool,
}

/// `list_creatives` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListCreativesResponse {
    /// The page of creatives.
    pub creatives: Vec<CreativeListItem>,

    /// Match summary.
    pub query_summary: QuerySummary,

    /// Page position.
    pub pagination: PageInfo,
}

impl fmt::Display for ListCreativesResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} creative(s)",
            self.creatives.len(),
            self.query_summary.total_matching
        )
    }
}
