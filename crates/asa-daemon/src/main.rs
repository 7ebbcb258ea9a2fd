// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use asa_adapter_gam::{GamAdapter, GamConfig};
use asa_adapter_kevel::{KevelAdapter, KevelConfig};
use asa_adapter_mock::MockAdapter;
use asa_adapter_triton::{TritonAdapter, TritonConfig};
use asa_catalog::{CachingFormatRegistry, HttpFormatRegistry};
use asa_config::{AgentConfig, env_string};
use asa_daemon::{AppState, build_app};
use asa_lifecycle::{AdapterRegistry, Lifecycle};
use asa_scheduler::{DeliveryWebhookScheduler, MediaBuyStatusScheduler};
use asa_store::Store;
use asa_sync::SyncEngine;
use asa_webhook::WebhookService;

#[derive(Parser, Debug)]
#[command(name = "asa-daemon", version, about = "AdCP sales agent daemon")]
struct Args {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Enable request/response debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("asa=debug,asa_daemon=debug")
    } else {
        EnvFilter::new("asa=info,asa_daemon=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AgentConfig::from_env();
    for warning in config.warnings() {
        warn!(%warning, "configuration warning");
    }

    let store = Store::new();
    let adapters = build_adapters();
    let formats = Arc::new(CachingFormatRegistry::new(HttpFormatRegistry::new()));
    let lifecycle = Lifecycle::new(store.clone(), adapters, formats);
    let sync = Arc::new(SyncEngine::new(store.clone()));
    let webhooks = Arc::new(WebhookService::new(store.clone()));

    let status_scheduler = Arc::new(MediaBuyStatusScheduler::new(
        store.clone(),
        config.status_check_interval_secs,
    ));
    let webhook_scheduler = Arc::new(DeliveryWebhookScheduler::new(
        lifecycle.clone(),
        webhooks,
        config.delivery_webhook_interval_secs,
        false,
    ));

    status_scheduler.start().await;
    webhook_scheduler.start().await;

    let state = Arc::new(AppState {
        lifecycle,
        sync,
        status_scheduler: status_scheduler.clone(),
        webhook_scheduler: webhook_scheduler.clone(),
        config: config.clone(),
    });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(
        bind = %args.bind,
        unified_mode = config.unified_mode,
        "asa-daemon listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    status_scheduler.stop().await;
    webhook_scheduler.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Register every adapter whose credentials are present; the mock is
/// always available.
fn build_adapters() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register("mock", Arc::new(MockAdapter::new()));

    if let (Some(api_base), Some(network_code), Some(bearer_token)) = (
        env_string("GAM_API_BASE"),
        env_string("GAM_NETWORK_CODE"),
        env_string("GAM_BEARER_TOKEN"),
    ) {
        registry.register(
            "google_ad_manager",
            Arc::new(GamAdapter::new(GamConfig {
                api_base,
                network_code,
                bearer_token,
            })),
        );
    }

    if let (Some(api_base), Some(network_id), Some(api_key)) = (
        env_string("KEVEL_API_BASE"),
        env_string("KEVEL_NETWORK_ID"),
        env_string("KEVEL_API_KEY"),
    ) {
        registry.register(
            "kevel",
            Arc::new(KevelAdapter::new(KevelConfig {
                api_base,
                network_id,
                api_key,
            })),
        );
    }

    if let (Some(api_base), Some(station_group), Some(api_token)) = (
        env_string("TRITON_API_BASE"),
        env_string("TRITON_STATION_GROUP"),
        env_string("TRITON_API_TOKEN"),
    ) {
        registry.register(
            "triton",
            Arc::new(TritonAdapter::new(TritonConfig {
                api_base,
                station_group,
                api_token,
            })),
        );
    }

    registry
}
