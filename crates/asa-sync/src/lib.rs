// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Streaming inventory sync engine.
//!
//! Reconciles publisher ad-server inventory into local storage one type at
//! a time: discover a type, convert, flush in bounded batches, drop the
//! buffer, move on. Peak memory stays bounded regardless of inventory
//! size. A type that times out or fails is logged and skipped; the
//! remaining types still sync. Stale marking runs only on full syncs and
//! never touches ad units.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use asa_adapter_core::{AdServerAdapter, InventoryItem, InventoryKind, with_timeout};
use asa_context::RequestContext;
use asa_error::AdcpResult;
use asa_store::{BulkUpsertOutcome, InventoryRow, InventoryType, Store, SyncJobRow};

/// Rows per storage flush.
const BATCH_SIZE: usize = 500;

/// Budget for one batch commit.
const COMMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// The order types are synced in.
const SYNC_ORDER: [InventoryKind; 5] = [
    InventoryKind::AdUnits,
    InventoryKind::Placements,
    InventoryKind::Labels,
    InventoryKind::CustomTargetingKeys,
    InventoryKind::AudienceSegments,
];

/// What a sync run covers.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMode {
    /// Re-fetch everything and mark unreached rows stale.
    Full,
    /// Fetch only items modified since the instant; never marks stale.
    Incremental {
        /// Lower bound on upstream modification time.
        since: DateTime<Utc>,
    },
    /// Fetch a named subset of types; never marks stale.
    Selective {
        /// The types to sync.
        kinds: Vec<InventoryKind>,
    },
}

impl SyncMode {
    fn sync_type(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental { .. } => "inventory",
            Self::Selective { .. } => "selective",
        }
    }

    fn since(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Incremental { since } => Some(*since),
            _ => None,
        }
    }

    fn kinds(&self) -> Vec<InventoryKind> {
        match self {
            Self::Selective { kinds } => kinds.clone(),
            _ => SYNC_ORDER.to_vec(),
        }
    }
}

/// Tuning knobs for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Run even when a sync already ran today.
    pub force: bool,
    /// Eagerly fetch custom-targeting values (default: lazy).
    pub fetch_custom_targeting_values: bool,
    /// Cap on values fetched per key in eager mode.
    pub max_values_per_key: Option<usize>,
}

/// Per-type counts in a sync report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    /// Items fetched from the adapter.
    pub total: usize,
    /// Rows newly inserted.
    pub inserted: usize,
    /// Rows overwritten.
    pub updated: usize,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// The sync job id.
    pub sync_id: String,
    /// Counts keyed by the kind's wire string.
    pub counts: std::collections::BTreeMap<String, TypeCounts>,
    /// Custom-targeting values fetched (eager mode only).
    pub custom_targeting_values: usize,
    /// Rows marked stale (full syncs only).
    pub stale_marked: usize,
    /// Types that failed or timed out; the rest of the sync continued.
    pub failed_types: Vec<String>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Aggregate view over a tenant's recent sync jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Job count per status within the window.
    pub status_counts: std::collections::BTreeMap<String, usize>,
    /// Up to five most recent failed jobs.
    pub recent_failures: Vec<SyncJobRow>,
}

/// The sync engine.
pub struct SyncEngine {
    store: Store,
}

impl SyncEngine {
    /// Build an engine over the store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Run one sync for the context's tenant.
    ///
    /// Returns the completed report, or the report of a sync that already
    /// ran today when `force` is unset.
    ///
    /// # Errors
    ///
    /// Fails only on job bookkeeping problems; per-type faults are
    /// recorded in [`SyncReport::failed_types`] instead of aborting.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        adapter: &dyn AdServerAdapter,
        mode: SyncMode,
        options: &SyncOptions,
    ) -> AdcpResult<SyncReport> {
        let tenant_id = ctx.tenant_id().to_string();
        let now = Utc::now();

        if !options.force {
            if let Some(existing) = self.recent_sync(&tenant_id, mode.sync_type(), now).await {
                info!(tenant_id, sync_id = %existing.sync_id, "recent sync exists, skipping");
                let mut report = SyncReport {
                    sync_id: existing.sync_id,
                    ..Default::default()
                };
                if let Some(summary) = existing.summary {
                    if let Ok(prior) = serde_json::from_value::<SyncReport>(summary) {
                        report = prior;
                    }
                }
                return Ok(report);
            }
        }

        let sync_id = format!(
            "sync_{tenant_id}_{}_{}",
            mode.sync_type(),
            uuid::Uuid::new_v4().simple()
        );
        self.store
            .insert_sync_job(SyncJobRow {
                sync_id: sync_id.clone(),
                tenant_id: tenant_id.clone(),
                adapter_type: adapter.identity().id,
                sync_type: mode.sync_type().to_string(),
                status: "pending".to_string(),
                started_at: now,
                completed_at: None,
                summary: None,
                error_message: None,
                triggered_by: ctx.tool_name.clone(),
            })
            .await;
        self.store.set_sync_job_status(&sync_id, "running").await;

        if ctx.testing.dry_run {
            info!(tenant_id, "[DRY RUN] simulated inventory sync");
            let report = SyncReport {
                sync_id: sync_id.clone(),
                dry_run: true,
                ..Default::default()
            };
            self.store
                .finish_sync_job(
                    &sync_id,
                    "completed",
                    Utc::now(),
                    serde_json::to_value(&report).ok(),
                    None,
                )
                .await;
            return Ok(report);
        }

        let sync_start = Utc::now();
        let mut report = SyncReport {
            sync_id: sync_id.clone(),
            ..Default::default()
        };

        for kind in mode.kinds() {
            match self
                .sync_one_kind(ctx, adapter, kind, mode.since(), options, sync_start, &mut report)
                .await
            {
                Ok(counts) => {
                    report.counts.insert(kind.as_str().to_string(), counts);
                    info!(tenant_id, kind = kind.as_str(), total = counts.total, "synced type");
                }
                Err(err) => {
                    error!(
                        tenant_id,
                        kind = kind.as_str(),
                        %err,
                        "type sync failed, continuing with remaining types"
                    );
                    report.counts.insert(kind.as_str().to_string(), TypeCounts::default());
                    report.failed_types.push(kind.as_str().to_string());
                }
            }
        }

        // Reconciliation: only a full sync saw the complete upstream set,
        // so only a full sync may conclude that unreached rows are gone.
        if matches!(mode, SyncMode::Full) {
            let cutoff = sync_start - ChronoDuration::seconds(1);
            report.stale_marked = self.store.mark_inventory_stale(&tenant_id, cutoff).await;
            info!(tenant_id, stale = report.stale_marked, "marked unreached rows stale");
        }

        let status = if report.failed_types.is_empty() {
            "completed"
        } else {
            "completed_with_errors"
        };
        self.store
            .finish_sync_job(
                &sync_id,
                status,
                Utc::now(),
                serde_json::to_value(&report).ok(),
                (!report.failed_types.is_empty())
                    .then(|| format!("types failed: {}", report.failed_types.join(", "))),
            )
            .await;

        Ok(report)
    }

    /// Sync one inventory kind: discover, convert, flush in batches.
    async fn sync_one_kind(
        &self,
        ctx: &RequestContext,
        adapter: &dyn AdServerAdapter,
        kind: InventoryKind,
        since: Option<DateTime<Utc>>,
        options: &SyncOptions,
        sync_time: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> AdcpResult<TypeCounts> {
        let items = adapter.discover_inventory(ctx, kind, since).await?;
        let mut counts = TypeCounts {
            total: items.len(),
            ..Default::default()
        };

        let inventory_type = canonical_type(kind);
        let outcome = self
            .flush_items(ctx.tenant_id(), inventory_type, &items, sync_time)
            .await?;
        counts.inserted += outcome.inserted;
        counts.updated += outcome.updated;

        // Values are lazy-loaded on demand unless the run asked for the
        // bounded eager mode.
        if kind == InventoryKind::CustomTargetingKeys && options.fetch_custom_targeting_values {
            for key in &items {
                let values = adapter
                    .discover_custom_targeting_values(ctx, &key.id, options.max_values_per_key)
                    .await?;
                report.custom_targeting_values += values.len();
                let value_outcome = self
                    .flush_items(
                        ctx.tenant_id(),
                        InventoryType::CustomTargetingValue,
                        &values,
                        sync_time,
                    )
                    .await?;
                counts.inserted += value_outcome.inserted;
                counts.updated += value_outcome.updated;
            }
        }

        // `items` drops here; nothing of this type stays buffered while the
        // next type streams.
        Ok(counts)
    }

    /// Flush items in bounded batches under the commit timeout.
    async fn flush_items(
        &self,
        tenant_id: &str,
        inventory_type: InventoryType,
        items: &[InventoryItem],
        sync_time: DateTime<Utc>,
    ) -> AdcpResult<BulkUpsertOutcome> {
        let mut total = BulkUpsertOutcome::default();
        for chunk in items.chunks(BATCH_SIZE) {
            let rows: Vec<InventoryRow> = chunk
                .iter()
                .map(|item| convert_item(tenant_id, inventory_type, item, sync_time))
                .collect();
            let outcome = match with_timeout("inventory batch commit", COMMIT_TIMEOUT, async {
                Ok(self.store.bulk_upsert_inventory(rows).await)
            })
            .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        tenant_id,
                        inventory_type = inventory_type.as_str(),
                        inserted = total.inserted,
                        updated = total.updated,
                        "batch commit timed out"
                    );
                    return Err(err);
                }
            };
            total.inserted += outcome.inserted;
            total.updated += outcome.updated;
        }
        Ok(total)
    }

    /// A sync of this type already started today (running or completed).
    async fn recent_sync(
        &self,
        tenant_id: &str,
        sync_type: &str,
        now: DateTime<Utc>,
    ) -> Option<SyncJobRow> {
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())?;
        self.store
            .find_sync_jobs(
                tenant_id,
                sync_type,
                &["running", "completed", "completed_with_errors"],
                today_start,
            )
            .await
            .into_iter()
            .next()
    }

    /// A tenant's sync job status, by id.
    pub async fn sync_status(&self, tenant_id: &str, sync_id: &str) -> Option<SyncJobRow> {
        self.store.get_sync_job(tenant_id, sync_id).await
    }

    /// Page through a tenant's sync history, newest first.
    ///
    /// Returns `(page, total_matching)`.
    pub async fn sync_history(
        &self,
        tenant_id: &str,
        status_filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> (Vec<SyncJobRow>, usize) {
        self.store
            .list_sync_jobs(tenant_id, status_filter, limit, offset)
            .await
    }

    /// Status counts and recent failures over a lookback window.
    pub async fn sync_stats(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        lookback_hours: i64,
    ) -> SyncStats {
        let since = now - ChronoDuration::hours(lookback_hours);
        let (jobs, _) = self.store.list_sync_jobs(tenant_id, None, usize::MAX, 0).await;
        let mut stats = SyncStats::default();
        for job in jobs.into_iter().filter(|j| j.started_at >= since) {
            *stats.status_counts.entry(job.status.clone()).or_insert(0) += 1;
            if job.status == "failed" && stats.recent_failures.len() < 5 {
                stats.recent_failures.push(job);
            }
        }
        stats
    }

    /// Lazy-load values for one custom targeting key and persist them.
    ///
    /// # Errors
    ///
    /// Propagates adapter and commit failures.
    pub async fn load_values_for_key(
        &self,
        ctx: &RequestContext,
        adapter: &dyn AdServerAdapter,
        key_id: &str,
        max_values: Option<usize>,
    ) -> AdcpResult<usize> {
        let values = adapter
            .discover_custom_targeting_values(ctx, key_id, max_values)
            .await?;
        let count = values.len();
        self.flush_items(
            ctx.tenant_id(),
            InventoryType::CustomTargetingValue,
            &values,
            Utc::now(),
        )
        .await?;
        Ok(count)
    }
}

fn canonical_type(kind: InventoryKind) -> InventoryType {
    match kind {
        InventoryKind::AdUnits => InventoryType::AdUnit,
        InventoryKind::Placements => InventoryType::Placement,
        InventoryKind::Labels => InventoryType::Label,
        InventoryKind::CustomTargetingKeys => InventoryType::CustomTargetingKey,
        InventoryKind::AudienceSegments => InventoryType::AudienceSegment,
    }
}

fn convert_item(
    tenant_id: &str,
    inventory_type: InventoryType,
    item: &InventoryItem,
    sync_time: DateTime<Utc>,
) -> InventoryRow {
    InventoryRow {
        tenant_id: tenant_id.to_string(),
        inventory_type,
        inventory_id: item.id.clone(),
        name: item.name.clone(),
        path: item.path.clone(),
        status: item.status.clone(),
        inventory_metadata: item.metadata.clone(),
        last_synced: sync_time,
    }
}
