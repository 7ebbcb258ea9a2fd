// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow task tools: `list_tasks`, `get_task`, `complete_task`.

use asa_context::RequestContext;
use asa_core::tasks::{
    AssociatedObject, CompleteTaskRequest, CompleteTaskResponse, ListTasksRequest,
    ListTasksResponse, TaskDetail, TaskStatus, TaskSummary,
};
use asa_error::AdcpResult;
use asa_store::{AuditLogRow, ObjectWorkflowMappingRow, StepFilters, WorkflowStepRow};

use crate::Lifecycle;

fn to_summary(step: &WorkflowStepRow, mappings: &[ObjectWorkflowMappingRow]) -> TaskSummary {
    TaskSummary {
        task_id: step.step_id.clone(),
        status: step.status,
        step_type: step.step_type.clone(),
        tool_name: step.tool_name.clone(),
        owner: step.owner.clone(),
        created_at: step.created_at,
        context_id: step.context_id.clone(),
        associated_objects: mappings
            .iter()
            .map(|m| AssociatedObject {
                object_type: m.object_type.clone(),
                id: m.object_id.clone(),
                action: m.action.clone(),
            })
            .collect(),
        error_message: (step.status == TaskStatus::Failed)
            .then(|| step.error_message.clone())
            .flatten(),
    }
}

impl Lifecycle {
    /// `list_tasks`: the tenant's workflow steps, newest first.
    pub async fn list_tasks(
        &self,
        ctx: &RequestContext,
        request: ListTasksRequest,
    ) -> ListTasksResponse {
        let filters = StepFilters {
            status: request.status,
            object_type: request.object_type.clone(),
            object_id: request.object_id.clone(),
        };
        let (page, total) = self
            .store
            .list_workflow_steps(ctx.tenant_id(), &filters, request.limit, request.offset)
            .await;

        ListTasksResponse {
            tasks: page
                .iter()
                .map(|(step, mappings)| to_summary(step, mappings))
                .collect(),
            total,
            has_more: request.offset + request.limit < total,
        }
    }

    /// `get_task`: the full step with its object mappings.
    ///
    /// # Errors
    ///
    /// `not_found` when the step does not exist in this tenant.
    pub async fn get_task(&self, ctx: &RequestContext, task_id: &str) -> AdcpResult<TaskDetail> {
        let (step, mappings) = self.store.get_workflow_step(ctx.tenant_id(), task_id).await?;
        Ok(TaskDetail {
            summary: to_summary(&step, &mappings),
            request_data: step.request_data,
            response_data: step.response_data,
            completed_at: step.completed_at,
        })
    }

    /// `complete_task`: human approval or async completion.
    ///
    /// # Errors
    ///
    /// `validation_error` for non-terminal target statuses or steps that
    /// are already terminal; `not_found` for unknown steps.
    pub async fn complete_task(
        &self,
        ctx: &RequestContext,
        request: CompleteTaskRequest,
    ) -> AdcpResult<CompleteTaskResponse> {
        request.validate_status()?;

        let response_data = request.response_data.clone().or_else(|| {
            (request.status == TaskStatus::Completed).then(|| {
                serde_json::json!({
                    "manually_completed": true,
                    "completed_by": ctx.principal_id,
                })
            })
        });

        let now = ctx.request_timestamp;
        let step = self
            .store
            .complete_workflow_step(
                ctx.tenant_id(),
                &request.task_id,
                request.status,
                response_data,
                request.error_message.clone(),
                now,
            )
            .await?;

        self.store
            .append_audit(AuditLogRow {
                tenant_id: ctx.tenant_id().to_string(),
                operation: "complete_task".to_string(),
                principal_id: ctx.principal_id.clone(),
                success: true,
                details: serde_json::json!({
                    "task_id": request.task_id,
                    "new_status": request.status,
                    "task_type": step.step_type,
                }),
                created_at: now,
            })
            .await;

        Ok(CompleteTaskResponse {
            task_id: request.task_id.clone(),
            status: request.status,
            message: format!("Task {} marked as {}", request.task_id, request.status),
            completed_at: now,
            completed_by: Some(ctx.principal_id.clone()),
        })
    }
}
