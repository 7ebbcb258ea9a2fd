// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! AdCP sales agent daemon.
//!
//! The axum surface dispatches the AdCP tools under both the MCP-style and
//! A2A-style routes. Protocol-envelope fields stay on the transport layer;
//! handlers return domain objects serialized with null omission, and every
//! error is mapped to its taxonomy code at this outermost boundary with
//! the original detail preserved.

use axum::{
    Json, Router,
    extract::{Path as AxPath, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

use asa_config::AgentConfig;
use asa_context::{RequestContext, ResolutionHeaders, authenticate_principal, resolve_tenant};
use asa_core::format::FormatId;
use asa_error::{AdcpError, ErrorCode};
use asa_lifecycle::Lifecycle;
use asa_scheduler::{DeliveryWebhookScheduler, MediaBuyStatusScheduler};
use asa_store::Store;
use asa_sync::SyncEngine;

/// Shared daemon state.
#[derive(Clone)]
pub struct AppState {
    /// The lifecycle engine (store + adapters + formats).
    pub lifecycle: Lifecycle,
    /// The inventory sync engine.
    pub sync: Arc<SyncEngine>,
    /// Status scheduler handle (admin trigger + lifecycle mgmt).
    pub status_scheduler: Arc<MediaBuyStatusScheduler>,
    /// Webhook scheduler handle (manual report trigger).
    pub webhook_scheduler: Arc<DeliveryWebhookScheduler>,
    /// Runtime configuration.
    pub config: AgentConfig,
}

impl AppState {
    fn store(&self) -> &Store {
        self.lifecycle.store()
    }
}

/// Error envelope at the transport boundary.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status derived from the taxonomy code.
    pub status: StatusCode,
    /// The wire error object.
    pub error: asa_error::ErrorObject,
}

impl From<AdcpError> for ApiError {
    fn from(err: AdcpError) -> Self {
        let status = match err.code {
            ErrorCode::AuthenticationError => StatusCode::UNAUTHORIZED,
            ErrorCode::ValidationError | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::DataIntegrityError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::AdapterError => StatusCode::BAD_GATEWAY,
            ErrorCode::TimeoutError => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            error: err.to_object(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "errors": [self.error] }));
        (self.status, body).into_response()
    }
}

/// Build the axum router with all agent routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(cmd_health))
        .route("/mcp/{tool}", post(cmd_tool))
        .route("/a2a/{tool}", post(cmd_tool));

    if state.config.testing_mode {
        app = app
            .route("/debug/state", get(cmd_debug_state))
            .route("/admin/reset-store", post(cmd_reset_store));
    }

    app.with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "adcp-sales-agent",
        "adcp_version": asa_core::ADCP_VERSION,
        "time": Utc::now().to_rfc3339(),
    }))
}

/// Resolve tenant + principal and build the per-request context.
async fn request_context(
    state: &AppState,
    headers: &HeaderMap,
    tool: &str,
) -> Result<RequestContext, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let resolution = ResolutionHeaders {
        virtual_host: header("apx-incoming-host"),
        host: header("host"),
        tenant_tag: header("x-adcp-tenant"),
    };
    let tenant = resolve_tenant(state.store(), &resolution).await?;
    let principal = authenticate_principal(state.store(), &tenant, header("x-adcp-auth")).await?;

    let dry_run = header("x-adcp-dry-run") == Some("true");
    let mut ctx = RequestContext::for_tool(tenant, principal.principal_id, tool, Utc::now());
    ctx.testing.dry_run = dry_run;
    Ok(ctx)
}

fn parse_body<T: serde::de::DeserializeOwned>(tool: &str, body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| {
        ApiError::from(
            AdcpError::validation(format!("invalid {tool} request: {e}"))
                .with_detail("tool", tool),
        )
    })
}

async fn cmd_tool(
    AxPath(tool): AxPath<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let ctx = request_context(&state, &headers, &tool).await?;

    let value = match tool.as_str() {
        "get_products" => {
            let request = parse_body(&tool, body)?;
            let response = asa_catalog::get_products(&ctx, state.store(), &request).await?;
            serde_json::to_value(response)
        }
        "list_authorized_properties" => {
            let request = parse_body(&tool, body)?;
            let response =
                asa_catalog::list_authorized_properties(&ctx, state.store(), &request).await?;
            serde_json::to_value(response)
        }
        "list_creative_formats" => {
            let response = list_creative_formats(&state, &ctx).await?;
            serde_json::to_value(response)
        }
        "create_media_buy" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.create_media_buy(&ctx, request).await;
            serde_json::to_value(response)
        }
        "update_media_buy" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.update_media_buy(&ctx, request).await;
            serde_json::to_value(response)
        }
        "sync_creatives" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.sync_creatives(&ctx, request).await?;
            serde_json::to_value(response)
        }
        "list_creatives" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.list_creatives(&ctx, request).await?;
            serde_json::to_value(response)
        }
        "get_media_buy_delivery" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.get_media_buy_delivery(&ctx, request).await;
            serde_json::to_value(response)
        }
        "sync_inventory" => {
            let adapter = state.lifecycle.adapters().for_tenant(&ctx.tenant)?;
            let report = state
                .sync
                .run(
                    &ctx,
                    adapter.as_ref(),
                    asa_sync::SyncMode::Full,
                    &asa_sync::SyncOptions {
                        force: true,
                        ..Default::default()
                    },
                )
                .await?;
            serde_json::to_value(report)
        }
        "list_tasks" | "get_task" | "complete_task" if !state.config.unified_mode => {
            return Err(ApiError::from(AdcpError::invalid_request(format!(
                "tool '{tool}' is not registered (unified mode disabled)"
            ))));
        }
        "list_tasks" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.list_tasks(&ctx, request).await;
            serde_json::to_value(response)
        }
        "get_task" => {
            #[derive(serde::Deserialize)]
            struct GetTaskRequest {
                task_id: String,
            }
            let request: GetTaskRequest = parse_body(&tool, body)?;
            let response = state.lifecycle.get_task(&ctx, &request.task_id).await?;
            serde_json::to_value(response)
        }
        "complete_task" => {
            let request = parse_body(&tool, body)?;
            let response = state.lifecycle.complete_task(&ctx, request).await?;
            serde_json::to_value(response)
        }
        "trigger_delivery_report" => {
            #[derive(serde::Deserialize)]
            struct TriggerRequest {
                media_buy_id: String,
            }
            let request: TriggerRequest = parse_body(&tool, body)?;
            let triggered = state
                .webhook_scheduler
                .trigger_report_for_media_buy_by_id(&request.media_buy_id, ctx.tenant_id())
                .await;
            serde_json::to_value(json!({"triggered": triggered}))
        }
        other => {
            warn!(tool = other, "unknown tool invoked");
            return Err(ApiError::from(AdcpError::invalid_request(format!(
                "unknown tool '{other}'"
            ))));
        }
    }
    .map_err(|e| ApiError::from(AdcpError::unavailable("response serialization failed").with_source(e)))?;

    Ok(Json(value))
}

/// Distinct creative formats across the tenant's products, resolved via
/// the registry.
async fn list_creative_formats(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<Value, AdcpError> {
    let products = state.store().list_products(ctx.tenant_id()).await;
    let mut format_ids: Vec<FormatId> = Vec::new();
    for product in &products {
        for format_id in &product.format_ids {
            if !format_ids.iter().any(|f| f.matches(format_id)) {
                format_ids.push(format_id.clone());
            }
        }
    }
    format_ids.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(json!({ "format_ids": format_ids }))
}

async fn cmd_debug_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store();
    let buys = store.list_media_buys_by_status(&[
        asa_core::MediaBuyStatus::PendingActivation,
        asa_core::MediaBuyStatus::Scheduled,
        asa_core::MediaBuyStatus::Active,
        asa_core::MediaBuyStatus::Completed,
        asa_core::MediaBuyStatus::Paused,
        asa_core::MediaBuyStatus::Failed,
    ])
    .await;
    Json(json!({
        "media_buys": buys.len(),
        "schedulers": {
            "status_running": state.status_scheduler.is_running(),
            "webhook_running": state.webhook_scheduler.is_running(),
        },
    }))
}

async fn cmd_reset_store(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Testing-only: the route is registered only when ADCP_TESTING is set.
    warn!("resetting store state (testing mode)");
    state.store().clear().await;
    Json(json!({"status": "success", "message": "store state reset"}))
}
