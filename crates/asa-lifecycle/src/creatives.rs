// SPDX-License-Identifier: MIT OR Apache-2.0
//! Creative sync and listing.
//!
//! `sync_creatives` upserts per creative by `(tenant, creative_id)` and
//! reports `created`/`updated`/`failed` per row. Assignment persistence is
//! a separate phase whose failures never roll back the upserts. Approval
//! follows tenant policy: auto-approve mode or an allow-listed format id
//! approves immediately; everything else parks in review behind a
//! workflow step.

use tracing::{info, warn};
use uuid::Uuid;

use asa_context::RequestContext;
use asa_core::creative::{
    Creative, CreativeFilters, CreativeListItem, CreativeSort, CreativeStatus,
    ListCreativesRequest, ListCreativesResponse, PageInfo, Pagination, QuerySummary,
    SyncCreativeAction, SyncCreativeResult, SyncCreativesRequest, SyncCreativesResponse,
    validate_against_format,
};
use asa_core::tasks::TaskStatus;
use asa_error::{AdcpError, AdcpResult};
use asa_store::{
    ContextRow, CreativeAssignmentRow, CreativeRow, ObjectWorkflowMappingRow, WorkflowStepRow,
};

use crate::Lifecycle;

impl Lifecycle {
    /// `sync_creatives`.
    ///
    /// # Errors
    ///
    /// Only fails wholesale in `validation_mode = "strict"`; in the default
    /// lenient mode, failures are reported per row.
    pub async fn sync_creatives(
        &self,
        ctx: &RequestContext,
        request: SyncCreativesRequest,
    ) -> AdcpResult<SyncCreativesResponse> {
        let strict = request.validation_mode.as_deref() == Some("strict");
        let mut results = Vec::with_capacity(request.creatives.len());

        for creative in &request.creatives {
            match self.sync_one_creative(ctx, creative, request.patch, request.dry_run).await {
                Ok(result) => results.push(result),
                Err(err) if strict => return Err(err),
                Err(err) => {
                    warn!(
                        tenant_id = ctx.tenant_id(),
                        creative_id = %creative.creative_id,
                        %err,
                        "creative failed validation"
                    );
                    results.push(SyncCreativeResult {
                        creative_id: creative.creative_id.clone(),
                        action: SyncCreativeAction::Failed,
                        status: None,
                        changes: vec![],
                        errors: vec![err.to_object()],
                    });
                }
            }
        }

        if request.delete_missing && !request.dry_run {
            let submitted: Vec<&str> = request
                .creatives
                .iter()
                .map(|c| c.creative_id.as_str())
                .collect();
            for row in self.store.list_creatives(ctx.tenant_id()).await {
                if !submitted.contains(&row.creative.creative_id.as_str()) {
                    info!(
                        tenant_id = ctx.tenant_id(),
                        creative_id = %row.creative.creative_id,
                        "removing creative not present in sync payload"
                    );
                    self.store
                        .delete_creative(ctx.tenant_id(), &row.creative.creative_id)
                        .await;
                }
            }
        }

        // Assignments are persisted after the upserts and never undo them.
        let mut assignment_errors = Vec::new();
        if !request.dry_run {
            for (creative_id, package_ids) in &request.assignments {
                for package_id in package_ids {
                    if let Err(err) = self.assign_creative(ctx, creative_id, package_id).await {
                        warn!(
                            tenant_id = ctx.tenant_id(),
                            creative_id,
                            package_id,
                            %err,
                            "assignment failed"
                        );
                        assignment_errors.push(err.to_object());
                    }
                }
            }
        }

        Ok(SyncCreativesResponse {
            results,
            assignment_errors,
            dry_run: request.dry_run,
        })
    }

    async fn sync_one_creative(
        &self,
        ctx: &RequestContext,
        creative: &Creative,
        patch: bool,
        dry_run: bool,
    ) -> AdcpResult<SyncCreativeResult> {
        let spec = self
            .formats
            .resolve(ctx.tenant_id(), &creative.format_id)
            .await?;

        let existing = self
            .store
            .get_creative(ctx.tenant_id(), &creative.creative_id)
            .await;

        let merged = match (&existing, patch) {
            (Some(row), true) => merge_creative(&row.creative, creative),
            _ => creative.clone(),
        };
        validate_against_format(&merged, &spec)?;

        let changes = existing
            .as_ref()
            .map(|row| diff_creative(&row.creative, &merged))
            .unwrap_or_default();

        let status = if self.auto_approves(ctx, &merged) {
            CreativeStatus::Approved
        } else {
            CreativeStatus::PendingReview
        };

        let action = if existing.is_some() {
            SyncCreativeAction::Updated
        } else {
            SyncCreativeAction::Created
        };

        if dry_run {
            return Ok(SyncCreativeResult {
                creative_id: merged.creative_id.clone(),
                action,
                status: Some(status),
                changes,
                errors: vec![],
            });
        }

        let now = ctx.request_timestamp;
        let row = CreativeRow {
            tenant_id: ctx.tenant_id().to_string(),
            principal_id: ctx.principal_id.clone(),
            creative: merged.clone(),
            status,
            tags: existing.as_ref().map(|r| r.tags.clone()).unwrap_or_default(),
            created_at: existing.as_ref().map(|r| r.created_at).unwrap_or(now),
            updated_at: existing.is_some().then_some(now),
        };
        self.store.upsert_creative(row).await;

        if status == CreativeStatus::PendingReview {
            self.create_review_step(ctx, &merged.creative_id).await;
        }

        Ok(SyncCreativeResult {
            creative_id: merged.creative_id,
            action,
            status: Some(status),
            changes,
            errors: vec![],
        })
    }

    fn auto_approves(&self, ctx: &RequestContext, creative: &Creative) -> bool {
        ctx.tenant.approval_mode == asa_store::ApprovalMode::AutoApprove
            || ctx
                .tenant
                .auto_approve_format_ids
                .contains(&creative.format_id.id)
    }

    async fn create_review_step(&self, ctx: &RequestContext, creative_id: &str) {
        let now = ctx.request_timestamp;
        self.store
            .insert_context(ContextRow {
                context_id: ctx.context_id.clone(),
                tenant_id: ctx.tenant_id().to_string(),
                created_at: now,
            })
            .await;
        let step_id = format!("step_{}", Uuid::new_v4().simple());
        self.store
            .insert_workflow_step(
                WorkflowStepRow {
                    step_id: step_id.clone(),
                    context_id: ctx.context_id.clone(),
                    tool_name: "sync_creatives".to_string(),
                    step_type: "creative_review".to_string(),
                    status: TaskStatus::RequiresApproval,
                    owner: Some("publisher".to_string()),
                    request_data: Some(serde_json::json!({"creative_id": creative_id})),
                    response_data: None,
                    error_message: None,
                    created_at: now,
                    completed_at: None,
                },
                vec![ObjectWorkflowMappingRow {
                    step_id,
                    object_type: "creative".to_string(),
                    object_id: creative_id.to_string(),
                    action: "review".to_string(),
                    created_at: now,
                }],
            )
            .await;
    }

    async fn assign_creative(
        &self,
        ctx: &RequestContext,
        creative_id: &str,
        package_id: &str,
    ) -> AdcpResult<()> {
        if self
            .store
            .get_creative(ctx.tenant_id(), creative_id)
            .await
            .is_none()
        {
            return Err(AdcpError::not_found(format!(
                "creative '{creative_id}' not found"
            )));
        }
        let package = self
            .store
            .find_package_by_id(ctx.tenant_id(), package_id)
            .await
            .ok_or_else(|| {
                AdcpError::not_found(format!("package '{package_id}' not found"))
            })?;

        self.store
            .insert_assignment(CreativeAssignmentRow {
                assignment_id: format!("assign_{}", Uuid::new_v4().simple()),
                tenant_id: ctx.tenant_id().to_string(),
                media_buy_id: package.media_buy_id,
                package_id: package.package_id,
                creative_id: creative_id.to_string(),
                weight: 100,
                rotation_type: None,
                override_click_url: None,
                override_start_time: None,
                override_end_time: None,
            })
            .await;
        Ok(())
    }

    /// `list_creatives`.
    pub async fn list_creatives(
        &self,
        ctx: &RequestContext,
        request: ListCreativesRequest,
    ) -> AdcpResult<ListCreativesResponse> {
        let filters = request.filters.unwrap_or_default();
        let pagination = request.pagination.unwrap_or_default();

        let mut rows = Vec::new();
        for row in self.store.list_creatives(ctx.tenant_id()).await {
            if self.matches_filters(ctx, &row, &filters).await {
                rows.push(row);
            }
        }

        sort_rows(&mut rows, request.sort.as_ref());
        let total = rows.len();
        let page: Vec<CreativeListItem> = rows
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .map(|row| CreativeListItem {
                creative: row.creative,
                status: row.status,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect();

        Ok(ListCreativesResponse {
            creatives: page,
            query_summary: QuerySummary {
                total_matching: total,
            },
            pagination: page_info(&pagination, total),
        })
    }

    async fn matches_filters(
        &self,
        ctx: &RequestContext,
        row: &CreativeRow,
        filters: &CreativeFilters,
    ) -> bool {
        if let Some(status) = filters.status {
            if row.status != status {
                return false;
            }
        }
        if let Some(format) = &filters.format_id {
            if !row.creative.format_id.matches(format) {
                return false;
            }
        }
        if !filters.tags.is_empty() && !filters.tags.iter().all(|t| row.tags.contains(t)) {
            return false;
        }
        if let Some(after) = filters.created_after {
            if row.created_at < after {
                return false;
            }
        }
        if let Some(before) = filters.created_before {
            if row.created_at > before {
                return false;
            }
        }
        if let Some(search) = &filters.search {
            if !row
                .creative
                .name
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        if !filters.media_buy_ids.is_empty() || !filters.buyer_refs.is_empty() {
            let assignments = self
                .store
                .list_assignments_for_creative(ctx.tenant_id(), &row.creative.creative_id)
                .await;
            let mut matched = false;
            for assignment in &assignments {
                if filters.media_buy_ids.contains(&assignment.media_buy_id) {
                    matched = true;
                    break;
                }
                if !filters.buyer_refs.is_empty() {
                    if let Ok(buy) = self
                        .store
                        .get_media_buy(ctx.tenant_id(), &assignment.media_buy_id)
                        .await
                    {
                        if filters.buyer_refs.contains(&buy.buyer_ref) {
                            matched = true;
                            break;
                        }
                    }
                }
            }
            if !matched {
                return false;
            }
        }
        true
    }
}

fn merge_creative(existing: &Creative, patch: &Creative) -> Creative {
    let mut merged = existing.clone();
    if !patch.name.is_empty() {
        merged.name = patch.name.clone();
    }
    merged.format_id = patch.format_id.clone();
    for (key, asset) in &patch.assets {
        merged.assets.insert(key.clone(), asset.clone());
    }
    if patch.delivery_settings.is_some() {
        merged.delivery_settings = patch.delivery_settings.clone();
    }
    merged
}

fn diff_creative(existing: &Creative, next: &Creative) -> Vec<String> {
    let mut changes = Vec::new();
    if existing.name != next.name {
        changes.push("name".to_string());
    }
    if !existing.format_id.matches(&next.format_id) {
        changes.push("format_id".to_string());
    }
    if existing.assets != next.assets {
        changes.push("assets".to_string());
    }
    if existing.delivery_settings != next.delivery_settings {
        changes.push("delivery_settings".to_string());
    }
    changes
}

fn sort_rows(rows: &mut [CreativeRow], sort: Option<&CreativeSort>) {
    let (field, descending) = sort
        .map(|s| {
            (
                s.field.as_str(),
                s.direction.as_deref() != Some("asc"),
            )
        })
        .unwrap_or(("created_at", true));
    match field {
        "name" => rows.sort_by(|a, b| a.creative.name.cmp(&b.creative.name)),
        "status" => rows.sort_by_key(|r| format!("{:?}", r.status)),
        _ => rows.sort_by_key(|r| r.created_at),
    }
    if descending {
        rows.reverse();
    }
}

fn page_info(pagination: &Pagination, total: usize) -> PageInfo {
    let limit = pagination.limit.max(1);
    PageInfo {
        current_page: pagination.offset / limit + 1,
        has_more: pagination.offset + limit < total,
    }
}
