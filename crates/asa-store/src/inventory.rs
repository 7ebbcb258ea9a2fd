// SPDX-License-Identifier: MIT OR Apache-2.0
//! Inventory tables and reconciliation.

use chrono::{DateTime, Utc};

use crate::rows::{InventoryRow, InventoryType, SyncJobRow};
use crate::Store;

/// Counts from one bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkUpsertOutcome {
    /// Rows that did not exist before.
    pub inserted: usize,
    /// Rows that were overwritten.
    pub updated: usize,
}

impl Store {
    /// Upsert a batch of inventory rows for one `(tenant, type)`.
    ///
    /// Rows are keyed by `(tenant, type, inventory_id)`; existing keys are
    /// overwritten, new keys inserted. The batch is applied under a single
    /// write guard so a reader never sees a half-applied batch.
    pub async fn bulk_upsert_inventory(&self, rows: Vec<InventoryRow>) -> BulkUpsertOutcome {
        let mut guard = self.inner.write().await;
        let mut outcome = BulkUpsertOutcome::default();
        for row in rows {
            let key = (
                row.tenant_id.clone(),
                row.inventory_type,
                row.inventory_id.clone(),
            );
            if guard.inventory.insert(key, row).is_none() {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }
        outcome
    }

    /// Mark unreached rows stale after a full sync.
    ///
    /// Transitions every row of the tenant whose `last_synced` predates the
    /// cutoff to `status = "STALE"`, except ad units, whose hierarchy is
    /// managed outside the sync and must stay untouched. Returns the number
    /// of rows transitioned.
    pub async fn mark_inventory_stale(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
    ) -> usize {
        let mut guard = self.inner.write().await;
        let mut count = 0;
        for ((t, inventory_type, _), row) in guard.inventory.iter_mut() {
            if t != tenant_id || *inventory_type == InventoryType::AdUnit {
                continue;
            }
            if row.last_synced < cutoff && row.status != "STALE" {
                row.status = "STALE".to_string();
                count += 1;
            }
        }
        count
    }

    /// Fetch one inventory row.
    pub async fn get_inventory(
        &self,
        tenant_id: &str,
        inventory_type: InventoryType,
        inventory_id: &str,
    ) -> Option<InventoryRow> {
        let guard = self.inner.read().await;
        guard
            .inventory
            .get(&(
                tenant_id.to_string(),
                inventory_type,
                inventory_id.to_string(),
            ))
            .cloned()
    }

    /// All inventory rows of one type for a tenant.
    pub async fn list_inventory(
        &self,
        tenant_id: &str,
        inventory_type: InventoryType,
    ) -> Vec<InventoryRow> {
        let guard = self.inner.read().await;
        guard
            .inventory
            .iter()
            .filter(|((t, ty, _), _)| t == tenant_id && *ty == inventory_type)
            .map(|(_, row)| row.clone())
            .collect()
    }

    // -- sync jobs -----------------------------------------------------------

    /// Insert a sync job record.
    pub async fn insert_sync_job(&self, job: SyncJobRow) {
        let mut guard = self.inner.write().await;
        guard.sync_jobs.insert(job.sync_id.clone(), job);
    }

    /// Fetch a sync job within a tenant.
    pub async fn get_sync_job(&self, tenant_id: &str, sync_id: &str) -> Option<SyncJobRow> {
        let guard = self.inner.read().await;
        guard
            .sync_jobs
            .get(sync_id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
    }

    /// Update a sync job's terminal state.
    pub async fn finish_sync_job(
        &self,
        sync_id: &str,
        status: &str,
        completed_at: DateTime<Utc>,
        summary: Option<serde_json::Value>,
        error_message: Option<String>,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(job) = guard.sync_jobs.get_mut(sync_id) {
            job.status = status.to_string();
            job.completed_at = Some(completed_at);
            if summary.is_some() {
                job.summary = summary;
            }
            if error_message.is_some() {
                job.error_message = error_message;
            }
        }
    }

    /// Set a sync job's status without completing it.
    pub async fn set_sync_job_status(&self, sync_id: &str, status: &str) {
        let mut guard = self.inner.write().await;
        if let Some(job) = guard.sync_jobs.get_mut(sync_id) {
            job.status = status.to_string();
        }
    }

    /// A tenant's sync jobs of one type, started on or after `since`, in
    /// the given statuses.
    pub async fn find_sync_jobs(
        &self,
        tenant_id: &str,
        sync_type: &str,
        statuses: &[&str],
        since: DateTime<Utc>,
    ) -> Vec<SyncJobRow> {
        let guard = self.inner.read().await;
        guard
            .sync_jobs
            .values()
            .filter(|j| {
                j.tenant_id == tenant_id
                    && j.sync_type == sync_type
                    && statuses.contains(&j.status.as_str())
                    && j.started_at >= since
            })
            .cloned()
            .collect()
    }

    /// Page through a tenant's sync history, newest first.
    ///
    /// Returns `(page, total_matching)`.
    pub async fn list_sync_jobs(
        &self,
        tenant_id: &str,
        status_filter: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> (Vec<SyncJobRow>, usize) {
        let guard = self.inner.read().await;
        let mut matching: Vec<&SyncJobRow> = guard
            .sync_jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .filter(|j| status_filter.is_none_or(|s| j.status == s))
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (page, total)
    }
}
