// SPDX-License-Identifier: MIT OR Apache-2.0
//! Row types persisted by the store.
//!
//! Every row carries `tenant_id`; read paths filter on it so one tenant can
//! never observe another's state. JSON columns (`package_config`,
//! `inventory_metadata`, `raw_request`) carry adapter-specific and
//! legacy-compatibility payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use asa_core::creative::{Creative, CreativeStatus};
use asa_core::media_buy::MediaBuyStatus;
use asa_core::tasks::TaskStatus;

/// How a tenant approves incoming creatives and manual orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// Everything is approved without human review.
    AutoApprove,
    /// A human must approve via the task queue.
    RequireHuman,
}

/// A publisher/agency container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRow {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Display name.
    pub name: String,
    /// Subdomain the tenant answers on.
    pub subdomain: String,
    /// Exact virtual host, when fronted by a domain mapper.
    pub virtual_host: Option<String>,
    /// Adapter selector (`"mock"`, `"google_ad_manager"`, `"kevel"`,
    /// `"triton"`).
    pub ad_server: String,
    /// Creative/order approval policy.
    pub approval_mode: ApprovalMode,
    /// Emails allowed into the admin surface.
    pub authorized_emails: Vec<String>,
    /// Email domains allowed into the admin surface.
    pub authorized_domains: Vec<String>,
    /// Format ids that bypass creative review even under
    /// [`ApprovalMode::RequireHuman`].
    pub auto_approve_format_ids: Vec<String>,
    /// Inactive tenants never resolve from headers.
    pub is_active: bool,
}

/// An authenticated buyer identity within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrincipalRow {
    /// Principal identifier.
    pub principal_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Display name.
    pub name: String,
    /// Bearer token; resolves to `(tenant, principal)` in constant time.
    pub access_token: String,
    /// Per-adapter foreign keys (e.g. GAM advertiser_id).
    pub platform_mappings: BTreeMap<String, serde_json::Value>,
}

/// A creative in the tenant library, with server-side state alongside the
/// wire model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeRow {
    /// Owning tenant.
    pub tenant_id: String,
    /// Principal that synced the creative.
    pub principal_id: String,
    /// The wire creative.
    pub creative: Creative,
    /// Review status.
    pub status: CreativeStatus,
    /// Buyer-supplied tags.
    pub tags: Vec<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: Option<DateTime<Utc>>,
}

/// A confirmed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBuyRow {
    /// Server-assigned identifier, derived from the naming template.
    pub media_buy_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Buying principal.
    pub principal_id: String,
    /// Buyer's reference.
    pub buyer_ref: String,
    /// Lifecycle status.
    pub status: MediaBuyStatus,
    /// Flight start, UTC. Absent for date-only legacy rows.
    pub start_time: Option<DateTime<Utc>>,
    /// Flight end, UTC. Absent for date-only legacy rows.
    pub end_time: Option<DateTime<Utc>>,
    /// Legacy date-only start; synthesized to midnight UTC when needed.
    pub start_date: Option<NaiveDate>,
    /// Legacy date-only end; synthesized to end-of-day UTC when needed.
    pub end_date: Option<NaiveDate>,
    /// Campaign currency.
    pub currency: String,
    /// Purchase-order number, when supplied.
    pub po_number: Option<String>,
    /// The original request, kept to re-derive reporting_webhook and
    /// other buyer intent.
    pub raw_request: serde_json::Value,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// One line-item within a media buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPackageRow {
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning media buy.
    pub media_buy_id: String,
    /// Package identifier, unique within the buy.
    pub package_id: String,
    /// Product bought.
    pub product_id: String,
    /// Buyer's reference for the package.
    pub buyer_ref: String,
    /// Budget (typed column).
    pub budget: Option<f64>,
    /// Auction bid (typed column).
    pub bid_price: Option<f64>,
    /// Pacing strategy (typed column).
    pub pacing: Option<String>,
    /// Whether the package is paused.
    pub paused: bool,
    /// Legacy JSON projection; kept in lockstep with the typed columns by
    /// [`crate::Store::update_media_package_fields`].
    pub package_config: serde_json::Value,
}

/// Link between a creative and a `(media_buy, package)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeAssignmentRow {
    /// Assignment identifier.
    pub assignment_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Target media buy.
    pub media_buy_id: String,
    /// Target package.
    pub package_id: String,
    /// Assigned creative.
    pub creative_id: String,
    /// Rotation weight.
    pub weight: u32,
    /// Rotation type, when the ad server distinguishes them.
    pub rotation_type: Option<String>,
    /// Override clickthrough URL.
    pub override_click_url: Option<String>,
    /// Override flight start for this assignment.
    pub override_start_time: Option<DateTime<Utc>>,
    /// Override flight end for this assignment.
    pub override_end_time: Option<DateTime<Utc>>,
}

/// Conversation context a workflow step belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRow {
    /// Context identifier.
    pub context_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A human-in-the-loop or async task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepRow {
    /// Step identifier.
    pub step_id: String,
    /// Context the step belongs to; carries the tenant linkage.
    pub context_id: String,
    /// The tool that created the step.
    pub tool_name: String,
    /// Step type (`"approval"`, `"background"`, …).
    pub step_type: String,
    /// Current status.
    pub status: TaskStatus,
    /// Owner (`"principal"`, `"publisher"`, `"system"`).
    pub owner: Option<String>,
    /// The request that created the step.
    pub request_data: Option<serde_json::Value>,
    /// The step's result, once completed.
    pub response_data: Option<serde_json::Value>,
    /// Failure detail.
    pub error_message: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Link between a workflow step and a business object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectWorkflowMappingRow {
    /// The step.
    pub step_id: String,
    /// Object type (`"media_buy"`, `"creative"`, `"product"`).
    pub object_type: String,
    /// Object identifier.
    pub object_id: String,
    /// What the step does to the object.
    pub action: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Inventory kinds synchronized from the ad server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryType {
    /// Ad unit in the serving hierarchy. Never auto-marked stale.
    AdUnit,
    /// Placement grouping ad units.
    Placement,
    /// Label.
    Label,
    /// Custom targeting key.
    CustomTargetingKey,
    /// Custom targeting value under a key.
    CustomTargetingValue,
    /// First-party audience segment.
    AudienceSegment,
}

impl InventoryType {
    /// Wire string for the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdUnit => "ad_unit",
            Self::Placement => "placement",
            Self::Label => "label",
            Self::CustomTargetingKey => "custom_targeting_key",
            Self::CustomTargetingValue => "custom_targeting_value",
            Self::AudienceSegment => "audience_segment",
        }
    }
}

/// Canonical local projection of one publisher-side inventory entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    /// Owning tenant.
    pub tenant_id: String,
    /// Entity kind.
    pub inventory_type: InventoryType,
    /// Upstream identifier; unique per `(tenant, type)`.
    pub inventory_id: String,
    /// Display name.
    pub name: String,
    /// Names from the hierarchy root down to this entity.
    pub path: Vec<String>,
    /// Upstream status (`"ACTIVE"`, `"INACTIVE"`, or `"STALE"` once
    /// reconciliation retires the row).
    pub status: String,
    /// Adapter-specific metadata.
    pub inventory_metadata: serde_json::Value,
    /// When a sync last touched this row.
    pub last_synced: DateTime<Utc>,
}

/// Inventory sync job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJobRow {
    /// Job identifier.
    pub sync_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Adapter that produced the data.
    pub adapter_type: String,
    /// `"inventory"`, `"orders"`, `"full"`, or `"selective"`.
    pub sync_type: String,
    /// `"pending"`, `"running"`, `"completed"`, or `"failed"`.
    pub status: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result summary.
    pub summary: Option<serde_json::Value>,
    /// Failure detail.
    pub error_message: Option<String>,
    /// Who/what triggered the job.
    pub triggered_by: String,
}

/// One webhook delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDeliveryLogRow {
    /// Log row identifier.
    pub id: u64,
    /// Owning tenant.
    pub tenant_id: String,
    /// The media buy the notification concerns.
    pub media_buy_id: String,
    /// Task type (`"media_buy_delivery"`).
    pub task_type: String,
    /// `"scheduled"`, `"triggered"`, or `"final"`.
    pub notification_type: String,
    /// Monotonic per `(media_buy, task_type)`.
    pub sequence_number: u64,
    /// `"success"` or `"failed"`.
    pub status: String,
    /// Attempt time.
    pub created_at: DateTime<Utc>,
}

/// A registered webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotificationConfigRow {
    /// Config identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning principal.
    pub principal_id: String,
    /// Endpoint URL.
    pub url: String,
    /// Authentication scheme (e.g. `"Bearer"`).
    pub authentication_type: Option<String>,
    /// Credential for the scheme.
    pub authentication_token: Option<String>,
    /// Inactive configs are never used for delivery.
    pub is_active: bool,
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRow {
    /// Owning tenant.
    pub tenant_id: String,
    /// Operation name (tool or internal action).
    pub operation: String,
    /// Acting principal.
    pub principal_id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Structured details.
    pub details: serde_json::Value,
    /// Entry time.
    pub created_at: DateTime<Utc>,
}
