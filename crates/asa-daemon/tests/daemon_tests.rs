// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface behavior: auth, dispatch, error mapping, mode gates.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use asa_adapter_mock::MockAdapter;
use asa_catalog::FormatRegistry;
use asa_config::AgentConfig;
use asa_core::format::{FormatId, FormatSpec};
use asa_core::pricing::{PricingModel, PricingOption};
use asa_core::{DeliveryMeasurement, DeliveryType, Product, PropertyIdentifier, PublisherProperty};
use asa_daemon::{AppState, build_app};
use asa_error::AdcpResult;
use asa_lifecycle::{AdapterRegistry, Lifecycle};
use asa_scheduler::{DeliveryWebhookScheduler, MediaBuyStatusScheduler};
use asa_store::{ApprovalMode, PrincipalRow, Store, TenantRow};
use asa_sync::SyncEngine;
use asa_webhook::WebhookService;

struct StaticFormats;

#[async_trait]
impl FormatRegistry for StaticFormats {
    async fn resolve(&self, _tenant_id: &str, format_id: &FormatId) -> AdcpResult<FormatSpec> {
        Ok(FormatSpec {
            format_id: format_id.clone(),
            name: "Display".into(),
            width: Some(300),
            height: Some(250),
            is_responsive: false,
            assets: vec![],
        })
    }
}

async fn seeded_state(config: AgentConfig) -> Arc<AppState> {
    let store = Store::new();
    store
        .upsert_tenant(TenantRow {
            tenant_id: "pub_a".into(),
            name: "Pub A".into(),
            subdomain: "pub-a".into(),
            virtual_host: None,
            ad_server: "mock".into(),
            approval_mode: ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        })
        .await;
    store
        .upsert_principal(PrincipalRow {
            principal_id: "buyer_1".into(),
            tenant_id: "pub_a".into(),
            name: "Buyer".into(),
            access_token: "tok_a".into(),
            platform_mappings: Default::default(),
        })
        .await;
    store
        .upsert_product(
            "pub_a",
            Product {
                product_id: "prod_1".into(),
                name: "Homepage".into(),
                description: "d".into(),
                format_ids: vec![FormatId::new("https://formats.example", "display_300x250")],
                delivery_type: DeliveryType::Guaranteed,
                publisher_properties: vec![PublisherProperty {
                    property_type: "website".into(),
                    name: "example.com".into(),
                    identifiers: vec![PropertyIdentifier {
                        id_type: "domain".into(),
                        value: "example.com".into(),
                    }],
                    tags: vec![],
                }],
                pricing_options: vec![PricingOption {
                    pricing_option_id: "cpm_usd_fixed".into(),
                    pricing_model: PricingModel::Cpm,
                    currency: "USD".into(),
                    is_fixed: true,
                    rate: Some(12.5),
                    price_guidance: None,
                    min_spend_per_package: None,
                }],
                delivery_measurement: DeliveryMeasurement {
                    provider: "publisher".into(),
                    notes: None,
                },
                implementation_config: None,
            },
        )
        .await;

    let mut adapters = AdapterRegistry::new();
    adapters.register("mock", Arc::new(MockAdapter::new()));
    let lifecycle = Lifecycle::new(store.clone(), adapters, Arc::new(StaticFormats));
    let webhooks = Arc::new(WebhookService::new(store.clone()));

    Arc::new(AppState {
        sync: Arc::new(SyncEngine::new(store.clone())),
        status_scheduler: Arc::new(MediaBuyStatusScheduler::new(store.clone(), 3600)),
        webhook_scheduler: Arc::new(DeliveryWebhookScheduler::new(
            lifecycle.clone(),
            webhooks,
            3600,
            false,
        )),
        lifecycle,
        config,
    })
}

fn tool_request(tool: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/mcp/{tool}"))
        .header("host", "pub-a.sales.example")
        .header("x-adcp-auth", "tok_a")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn missing_token_is_401_authentication_error() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/get_products")
        .header("host", "pub-a.sales.example")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["code"], "authentication_error");
}

#[tokio::test]
async fn unknown_tenant_is_401() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/get_products")
        .header("host", "nobody.sales.example")
        .header("x-adcp-auth", "tok_a")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn get_products_returns_catalog() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let response = app
        .oneshot(tool_request("get_products", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["products"][0]["product_id"], "prod_1");
    // Null omission on the wire.
    assert!(body["products"][0]["pricing_options"][0].get("is_fixed").is_none());
}

#[tokio::test]
async fn a2a_route_dispatches_the_same_tools() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let request = Request::builder()
        .method("POST")
        .uri("/a2a/get_products")
        .header("host", "pub-a.sales.example")
        .header("x-adcp-auth", "tok_a")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn naive_datetime_is_400_validation_error() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let body = json!({
        "buyer_ref": "br_001",
        "brand_manifest": {"name": "Acme"},
        "packages": [{"buyer_ref": "p1", "product_id": "prod_1", "budget": 100.0,
                      "pricing_option_id": "cpm_usd_fixed"}],
        "start_time": "2099-01-01T00:00:00",
        "end_time": "2099-01-31T23:59:59Z"
    });
    let response = app
        .oneshot(tool_request("create_media_buy", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["code"], "validation_error");
}

#[tokio::test]
async fn create_media_buy_happy_path_over_http() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let body = json!({
        "buyer_ref": "br_001",
        "brand_manifest": {"name": "Acme"},
        "packages": [{"buyer_ref": "p1", "product_id": "prod_1", "budget": 5000.0,
                      "pricing_option_id": "cpm_usd_fixed"}],
        "start_time": "2099-01-01T00:00:00Z",
        "end_time": "2099-01-31T23:59:59Z"
    });
    let response = app
        .oneshot(tool_request("create_media_buy", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["media_buy_id"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(body["buyer_ref"], "br_001");
    assert!(body.get("errors").is_none());
    assert_eq!(body["packages"][0]["paused"], false);
}

#[tokio::test]
async fn unknown_tool_is_400_invalid_request() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let response = app
        .oneshot(tool_request("launch_rockets", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["code"], "invalid_request");
}

#[tokio::test]
async fn task_tools_require_unified_mode() {
    let config = AgentConfig {
        unified_mode: false,
        ..Default::default()
    };
    let app = build_app(seeded_state(config).await);
    let response = app
        .oneshot(tool_request("list_tasks", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debug_endpoints_are_gated_by_testing_mode() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let response = app
        .oneshot(Request::get("/debug/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let testing = AgentConfig {
        testing_mode: true,
        ..Default::default()
    };
    let app = build_app(seeded_state(testing).await);
    let response = app
        .oneshot(Request::get("/debug/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn explicit_tenant_tag_resolves() {
    let app = build_app(seeded_state(AgentConfig::default()).await);
    let request = Request::builder()
        .method("POST")
        .uri("/mcp/get_products")
        .header("host", "localhost:8080")
        .header("x-adcp-tenant", "pub_a")
        .header("x-adcp-auth", "tok_a")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
