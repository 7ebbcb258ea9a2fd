// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow steps, contexts, and the audit log.
//!
//! Steps carry no tenant column of their own; tenancy flows through the
//! context they belong to, so every read joins step → context and filters
//! on the context's tenant.

use chrono::{DateTime, Utc};

use asa_core::tasks::TaskStatus;
use asa_error::{AdcpError, AdcpResult};

use crate::rows::{AuditLogRow, ContextRow, ObjectWorkflowMappingRow, WorkflowStepRow};
use crate::Store;

/// Filters for [`Store::list_workflow_steps`].
#[derive(Debug, Clone, Default)]
pub struct StepFilters {
    /// Restrict to a status.
    pub status: Option<TaskStatus>,
    /// Restrict to steps mapped to this object type.
    pub object_type: Option<String>,
    /// Restrict to steps mapped to this object id.
    pub object_id: Option<String>,
}

impl Store {
    /// Insert a conversation context.
    pub async fn insert_context(&self, context: ContextRow) {
        let mut guard = self.inner.write().await;
        guard.contexts.insert(context.context_id.clone(), context);
    }

    /// Insert a workflow step with its object mappings.
    pub async fn insert_workflow_step(
        &self,
        step: WorkflowStepRow,
        mappings: Vec<ObjectWorkflowMappingRow>,
    ) {
        let mut guard = self.inner.write().await;
        guard.steps.insert(step.step_id.clone(), step);
        guard.mappings.extend(mappings);
    }

    /// Fetch a step within a tenant, with its mappings.
    ///
    /// # Errors
    ///
    /// `not_found` when the step does not exist or belongs to another
    /// tenant.
    pub async fn get_workflow_step(
        &self,
        tenant_id: &str,
        step_id: &str,
    ) -> AdcpResult<(WorkflowStepRow, Vec<ObjectWorkflowMappingRow>)> {
        let guard = self.inner.read().await;
        let step = guard
            .steps
            .get(step_id)
            .filter(|s| {
                guard
                    .contexts
                    .get(&s.context_id)
                    .is_some_and(|c| c.tenant_id == tenant_id)
            })
            .cloned()
            .ok_or_else(|| AdcpError::not_found(format!("task '{step_id}' not found")))?;
        let mappings = guard
            .mappings
            .iter()
            .filter(|m| m.step_id == step_id)
            .cloned()
            .collect();
        Ok((step, mappings))
    }

    /// Page through a tenant's workflow steps, newest first.
    ///
    /// Returns `(page, total_matching)`.
    pub async fn list_workflow_steps(
        &self,
        tenant_id: &str,
        filters: &StepFilters,
        limit: usize,
        offset: usize,
    ) -> (Vec<(WorkflowStepRow, Vec<ObjectWorkflowMappingRow>)>, usize) {
        let guard = self.inner.read().await;
        let mut matching: Vec<&WorkflowStepRow> = guard
            .steps
            .values()
            .filter(|step| {
                guard
                    .contexts
                    .get(&step.context_id)
                    .is_some_and(|c| c.tenant_id == tenant_id)
            })
            .filter(|step| filters.status.is_none_or(|s| step.status == s))
            .filter(|step| {
                let object_match = |m: &&ObjectWorkflowMappingRow| {
                    m.step_id == step.step_id
                        && filters
                            .object_type
                            .as_deref()
                            .is_none_or(|t| m.object_type == t)
                        && filters.object_id.as_deref().is_none_or(|id| m.object_id == id)
                };
                if filters.object_type.is_some() || filters.object_id.is_some() {
                    guard.mappings.iter().any(|m| object_match(&m))
                } else {
                    true
                }
            })
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len();

        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|step| {
                let mappings = guard
                    .mappings
                    .iter()
                    .filter(|m| m.step_id == step.step_id)
                    .cloned()
                    .collect();
                (step.clone(), mappings)
            })
            .collect();

        (page, total)
    }

    /// Complete a step, enforcing the open-status gate.
    ///
    /// # Errors
    ///
    /// `not_found` for unknown steps; `validation_error` when the step is
    /// already terminal or `status` is not terminal.
    pub async fn complete_workflow_step(
        &self,
        tenant_id: &str,
        step_id: &str,
        status: TaskStatus,
        response_data: Option<serde_json::Value>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> AdcpResult<WorkflowStepRow> {
        if !matches!(status, TaskStatus::Completed | TaskStatus::Failed) {
            return Err(AdcpError::validation(format!(
                "invalid status '{status}': must be 'completed' or 'failed'"
            )));
        }

        let mut guard = self.inner.write().await;
        let tenant_matches = |step: &WorkflowStepRow| {
            guard
                .contexts
                .get(&step.context_id)
                .is_some_and(|c| c.tenant_id == tenant_id)
        };
        let Some(step) = guard.steps.get(step_id).filter(|s| tenant_matches(s)).cloned() else {
            return Err(AdcpError::not_found(format!("task '{step_id}' not found")));
        };
        if !step.status.is_open() {
            return Err(AdcpError::validation(format!(
                "task '{step_id}' is already {} and cannot be completed",
                step.status
            )));
        }

        let step = guard.steps.get_mut(step_id).expect("checked above");
        step.status = status;
        step.completed_at = Some(now);
        match status {
            TaskStatus::Completed => {
                step.response_data = response_data;
                step.error_message = None;
            }
            _ => {
                step.error_message =
                    Some(error_message.unwrap_or_else(|| "task marked as failed manually".into()));
                if let Some(data) = response_data {
                    step.response_data = Some(data);
                }
            }
        }
        Ok(step.clone())
    }

    // -- audit log ----------------------------------------------------------

    /// Append an audit entry.
    pub async fn append_audit(&self, entry: AuditLogRow) {
        let mut guard = self.inner.write().await;
        guard.audit_log.push(entry);
    }

    /// A tenant's audit entries, oldest first.
    pub async fn list_audit(&self, tenant_id: &str) -> Vec<AuditLogRow> {
        let guard = self.inner.read().await;
        guard
            .audit_log
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seed_context(tenant: &str, context_id: &str) -> ContextRow {
        ContextRow {
            context_id: context_id.into(),
            tenant_id: tenant.into(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn step(step_id: &str, context_id: &str, status: TaskStatus, minute: u32) -> WorkflowStepRow {
        WorkflowStepRow {
            step_id: step_id.into(),
            context_id: context_id.into(),
            tool_name: "create_media_buy".into(),
            step_type: "approval".into(),
            status,
            owner: Some("publisher".into()),
            request_data: None,
            response_data: None,
            error_message: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, 0).unwrap(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn listing_is_tenant_scoped_and_newest_first() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store.insert_context(seed_context("pub_b", "ctx_b")).await;
        store
            .insert_workflow_step(step("s1", "ctx_a", TaskStatus::Pending, 1), vec![])
            .await;
        store
            .insert_workflow_step(step("s2", "ctx_a", TaskStatus::Pending, 5), vec![])
            .await;
        store
            .insert_workflow_step(step("s3", "ctx_b", TaskStatus::Pending, 9), vec![])
            .await;

        let (page, total) = store
            .list_workflow_steps("pub_a", &StepFilters::default(), 20, 0)
            .await;
        assert_eq!(total, 2);
        let ids: Vec<_> = page.iter().map(|(s, _)| s.step_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn object_filters_join_mappings() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store
            .insert_workflow_step(
                step("s1", "ctx_a", TaskStatus::RequiresApproval, 1),
                vec![ObjectWorkflowMappingRow {
                    step_id: "s1".into(),
                    object_type: "media_buy".into(),
                    object_id: "mb_1".into(),
                    action: "create".into(),
                    created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
                }],
            )
            .await;
        store
            .insert_workflow_step(step("s2", "ctx_a", TaskStatus::Pending, 2), vec![])
            .await;

        let filters = StepFilters {
            object_type: Some("media_buy".into()),
            object_id: Some("mb_1".into()),
            ..Default::default()
        };
        let (page, total) = store.list_workflow_steps("pub_a", &filters, 20, 0).await;
        assert_eq!(total, 1);
        assert_eq!(page[0].0.step_id, "s1");
        assert_eq!(page[0].1.len(), 1);
    }

    #[tokio::test]
    async fn complete_rejects_terminal_steps() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store
            .insert_workflow_step(step("s1", "ctx_a", TaskStatus::Completed, 1), vec![])
            .await;

        let err = store
            .complete_workflow_step(
                "pub_a",
                "s1",
                TaskStatus::Completed,
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("already completed"));
    }

    #[tokio::test]
    async fn complete_rejects_non_terminal_target() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store
            .insert_workflow_step(step("s1", "ctx_a", TaskStatus::Pending, 1), vec![])
            .await;

        let err = store
            .complete_workflow_step(
                "pub_a",
                "s1",
                TaskStatus::InProgress,
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("must be 'completed' or 'failed'"));
    }

    #[tokio::test]
    async fn complete_sets_terminal_fields() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store
            .insert_workflow_step(step("s1", "ctx_a", TaskStatus::RequiresApproval, 1), vec![])
            .await;

        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let done = store
            .complete_workflow_step(
                "pub_a",
                "s1",
                TaskStatus::Failed,
                None,
                Some("rejected by reviewer".into()),
                now,
            )
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.completed_at, Some(now));
        assert_eq!(done.error_message.as_deref(), Some("rejected by reviewer"));
    }

    #[tokio::test]
    async fn step_lookup_is_tenant_scoped() {
        let store = Store::new();
        store.insert_context(seed_context("pub_a", "ctx_a")).await;
        store
            .insert_workflow_step(step("s1", "ctx_a", TaskStatus::Pending, 1), vec![])
            .await;

        assert!(store.get_workflow_step("pub_a", "s1").await.is_ok());
        assert!(store.get_workflow_step("pub_b", "s1").await.is_err());
    }
}
