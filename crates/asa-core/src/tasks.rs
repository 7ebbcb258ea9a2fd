// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow task tool models.
//!
//! Human-in-the-loop and async work is tracked as workflow steps; these are
//! the wire shapes the `list_tasks` / `get_task` / `complete_task` tools
//! exchange.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use asa_error::{AdcpError, AdcpResult};

/// Status of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet picked up.
    Pending,
    /// Being worked.
    InProgress,
    /// Waiting on a human decision.
    RequiresApproval,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
}

impl TaskStatus {
    /// Whether a task in this status may still be completed.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::RequiresApproval)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::RequiresApproval => "requires_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A business object linked to a workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssociatedObject {
    /// Object type (`"media_buy"`, `"creative"`, `"product"`).
    #[serde(rename = "type")]
    pub object_type: String,
    /// Object identifier.
    pub id: String,
    /// What the step does to the object (`"create"`, `"approve"`, …).
    pub action: String,
}

/// `list_tasks` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListTasksRequest {
    /// Restrict to a status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,

    /// Restrict to steps linked to this object type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    /// Restrict to steps linked to this object id (with `object_type`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Maximum rows to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// One row in a `list_tasks` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSummary {
    /// Step identifier.
    pub task_id: String,

    /// Current status.
    pub status: TaskStatus,

    /// Step type (`"approval"`, `"notification"`, …).
    #[serde(rename = "type")]
    pub step_type: String,

    /// The tool that created the step.
    pub tool_name: String,

    /// Who owns the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Conversation context the step belongs to.
    pub context_id: String,

    /// Linked business objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub associated_objects: Vec<AssociatedObject>,

    /// Failure detail, for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// `list_tasks` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListTasksResponse {
    /// The requested page, newest first.
    pub tasks: Vec<TaskSummary>,

    /// Matching rows before pagination.
    pub total: usize,

    /// Whether rows remain past this page.
    pub has_more: bool,
}

impl fmt::Display for ListTasksResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} task(s)", self.tasks.len(), self.total)
    }
}

/// `get_task` response: the full step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub summary: TaskSummary,

    /// The request that created the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<serde_json::Value>,

    /// The step's result, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<serde_json::Value>,

    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// `complete_task` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompleteTaskRequest {
    /// The step to complete.
    pub task_id: String,

    /// Terminal status; must be `completed` or `failed`.
    pub status: TaskStatus,

    /// Result payload for completed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<serde_json::Value>,

    /// Failure detail for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CompleteTaskRequest {
    /// Reject non-terminal target statuses.
    ///
    /// # Errors
    ///
    /// `validation_error` when `status` is not `completed` or `failed`.
    pub fn validate_status(&self) -> AdcpResult<()> {
        match self.status {
            TaskStatus::Completed | TaskStatus::Failed => Ok(()),
            other => Err(AdcpError::validation(format!(
                "invalid status '{other}': must be 'completed' or 'failed'"
            ))),
        }
    }
}

/// `complete_task` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompleteTaskResponse {
    /// The completed step.
    pub task_id: String,

    /// Terminal status applied.
    pub status: TaskStatus,

    /// Human-readable confirmation.
    pub message: String,

    /// When the step was completed.
    pub completed_at: DateTime<Utc>,

    /// Principal who completed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}
