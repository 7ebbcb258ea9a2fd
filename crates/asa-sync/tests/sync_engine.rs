// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sync engine behavior: stale marking, incremental preservation, fault
//! isolation between types.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;

use asa_adapter_core::{
    AdServerAdapter, AdapterCreateRequest, AdapterCreateSuccess, AdapterIdentity, DeliveryTarget,
    InventoryItem, InventoryKind, UploadedCreative,
};
use asa_adapter_mock::MockAdapter;
use asa_context::RequestContext;
use asa_core::creative::Creative;
use asa_core::delivery::MediaBuyDelivery;
use asa_core::media_buy::UpdateMediaBuyRequest;
use asa_core::targeting::{TargetingCapability, platform_capabilities};
use asa_error::{AdcpError, AdcpResult};
use asa_store::{ApprovalMode, InventoryType, Store, TenantRow};
use asa_sync::{SyncEngine, SyncMode, SyncOptions};

fn ctx(dry_run: bool) -> RequestContext {
    let tenant = TenantRow {
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
    };
    RequestContext::for_scheduler(tenant, "buyer_1", "sync_inventory", Utc::now(), dry_run)
}

fn forced() -> SyncOptions {
    SyncOptions {
        force: true,
        ..Default::default()
    }
}

/// Adapter whose placements service always fails, and whose incremental
/// discovery returns nothing.
#[derive(Debug)]
struct FlakyPlacements {
    inner: MockAdapter,
}

#[async_trait]
impl AdServerAdapter for FlakyPlacements {
    fn identity(&self) -> AdapterIdentity {
        self.inner.identity()
    }
    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability> {
        platform_capabilities()
    }
    async fn create_media_buy(
        &self,
        ctx: &RequestContext,
        request: AdapterCreateRequest,
    ) -> AdcpResult<AdapterCreateSuccess> {
        self.inner.create_media_buy(ctx, request).await
    }
    async fn update_media_buy(
        &self,
        ctx: &RequestContext,
        request: &UpdateMediaBuyRequest,
    ) -> AdcpResult<asa_adapter_core::AdapterUpdateSuccess> {
        self.inner.update_media_buy(ctx, request).await
    }
    async fn upload_creatives(
        &self,
        ctx: &RequestContext,
        creatives: &[Creative],
    ) -> AdcpResult<Vec<UploadedCreative>> {
        self.inner.upload_creatives(ctx, creatives).await
    }
    async fn get_media_buy_delivery(
        &self,
        ctx: &RequestContext,
        targets: &[DeliveryTarget],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AdcpResult<Vec<MediaBuyDelivery>> {
        self.inner
            .get_media_buy_delivery(ctx, targets, start_date, end_date)
            .await
    }
    async fn discover_inventory(
        &self,
        ctx: &RequestContext,
        kind: InventoryKind,
        since: Option<DateTime<Utc>>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        if kind == InventoryKind::Placements {
            return Err(AdcpError::timeout("placements discovery timed out"));
        }
        self.inner.discover_inventory(ctx, kind, since).await
    }
    async fn discover_custom_targeting_values(
        &self,
        ctx: &RequestContext,
        key_id: &str,
        max_values: Option<usize>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        self.inner
            .discover_custom_targeting_values(ctx, key_id, max_values)
            .await
    }
}

#[tokio::test]
async fn full_sync_populates_every_type() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    let report = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();

    assert!(report.failed_types.is_empty());
    assert_eq!(report.counts["ad_units"].total, 3);
    assert_eq!(report.counts["placements"].total, 2);
    assert_eq!(store.list_inventory("pub_a", InventoryType::AdUnit).await.len(), 3);
    // Fresh rows are never stale-marked by the sync that wrote them.
    assert_eq!(report.stale_marked, 0);

    let job = store.get_sync_job("pub_a", &report.sync_id).await.unwrap();
    assert_eq!(job.status, "completed");
    assert!(job.summary.is_some());
}

#[tokio::test]
async fn full_sync_marks_unreached_rows_stale_but_never_ad_units() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    // Seed rows the next sync will not reach.
    let old = Utc::now() - chrono::Duration::hours(2);
    store
        .bulk_upsert_inventory(vec![
            asa_store::InventoryRow {
                tenant_id: "pub_a".into(),
                inventory_type: InventoryType::Placement,
                inventory_id: "pl_gone".into(),
                name: "Removed placement".into(),
                path: vec!["Removed placement".into()],
                status: "ACTIVE".into(),
                inventory_metadata: json!({}),
                last_synced: old,
            },
            asa_store::InventoryRow {
                tenant_id: "pub_a".into(),
                inventory_type: InventoryType::AdUnit,
                inventory_id: "au_gone".into(),
                name: "Removed unit".into(),
                path: vec!["Removed unit".into()],
                status: "ACTIVE".into(),
                inventory_metadata: json!({}),
                last_synced: old,
            },
        ])
        .await;

    let report = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();
    assert_eq!(report.stale_marked, 1);

    let placement = store
        .get_inventory("pub_a", InventoryType::Placement, "pl_gone")
        .await
        .unwrap();
    assert_eq!(placement.status, "STALE");
    let ad_unit = store
        .get_inventory("pub_a", InventoryType::AdUnit, "au_gone")
        .await
        .unwrap();
    assert_eq!(ad_unit.status, "ACTIVE");
}

#[tokio::test]
async fn incremental_sync_never_marks_stale() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    // Ten placements synced earlier, all ACTIVE.
    let t0 = Utc::now() - chrono::Duration::hours(1);
    let rows: Vec<_> = (0..10)
        .map(|i| asa_store::InventoryRow {
            tenant_id: "pub_a".into(),
            inventory_type: InventoryType::Placement,
            inventory_id: format!("pl_{i}"),
            name: format!("Placement {i}"),
            path: vec![format!("Placement {i}")],
            status: "ACTIVE".into(),
            inventory_metadata: json!({}),
            last_synced: t0,
        })
        .collect();
    store.bulk_upsert_inventory(rows).await;

    // Incremental sync at t0+1h returns zero modified placements.
    let report = engine
        .run(
            &ctx(false),
            &adapter,
            SyncMode::Incremental { since: t0 },
            &forced(),
        )
        .await
        .unwrap();
    assert_eq!(report.stale_marked, 0);

    let placements = store.list_inventory("pub_a", InventoryType::Placement).await;
    assert_eq!(placements.len(), 10);
    assert!(placements.iter().all(|p| p.status == "ACTIVE"));
}

#[tokio::test]
async fn one_failing_type_does_not_abort_the_sync() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = FlakyPlacements {
        inner: MockAdapter::new(),
    };

    let report = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();

    assert_eq!(report.failed_types, vec!["placements"]);
    // Ad units before, labels after: both synced.
    assert_eq!(report.counts["ad_units"].total, 3);
    assert_eq!(report.counts["labels"].total, 1);

    let job = store.get_sync_job("pub_a", &report.sync_id).await.unwrap();
    assert_eq!(job.status, "completed_with_errors");
    assert!(job.error_message.unwrap().contains("placements"));
}

#[tokio::test]
async fn selective_sync_touches_only_named_kinds() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    let report = engine
        .run(
            &ctx(false),
            &adapter,
            SyncMode::Selective {
                kinds: vec![InventoryKind::Labels],
            },
            &forced(),
        )
        .await
        .unwrap();

    assert_eq!(report.counts.len(), 1);
    assert!(store.list_inventory("pub_a", InventoryType::AdUnit).await.is_empty());
    assert_eq!(store.list_inventory("pub_a", InventoryType::Label).await.len(), 1);
}

#[tokio::test]
async fn values_are_lazy_by_default_and_eager_on_request() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();
    assert!(
        store
            .list_inventory("pub_a", InventoryType::CustomTargetingValue)
            .await
            .is_empty(),
        "values must not be fetched by default"
    );

    let eager = SyncOptions {
        force: true,
        fetch_custom_targeting_values: true,
        max_values_per_key: Some(2),
    };
    let report = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &eager)
        .await
        .unwrap();
    assert_eq!(report.custom_targeting_values, 2);
    assert_eq!(
        store
            .list_inventory("pub_a", InventoryType::CustomTargetingValue)
            .await
            .len(),
        2
    );
}

#[tokio::test]
async fn lazy_value_load_on_demand() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    let count = engine
        .load_values_for_key(&ctx(false), &adapter, "ctk_section", None)
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        store
            .list_inventory("pub_a", InventoryType::CustomTargetingValue)
            .await
            .len(),
        3
    );
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    let report = engine
        .run(&ctx(true), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();
    assert!(report.dry_run);
    assert!(store.list_inventory("pub_a", InventoryType::AdUnit).await.is_empty());
}

#[tokio::test]
async fn history_and_stats_reflect_job_outcomes() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());

    engine
        .run(&ctx(false), &MockAdapter::new(), SyncMode::Full, &forced())
        .await
        .unwrap();
    engine
        .run(
            &ctx(false),
            &FlakyPlacements {
                inner: MockAdapter::new(),
            },
            SyncMode::Full,
            &forced(),
        )
        .await
        .unwrap();

    let (page, total) = engine.sync_history("pub_a", None, 10, 0).await;
    assert_eq!(total, 2);
    // Newest first.
    assert_eq!(page[0].status, "completed_with_errors");

    let stats = engine.sync_stats("pub_a", Utc::now(), 24).await;
    assert_eq!(stats.status_counts.get("completed"), Some(&1));
    assert_eq!(stats.status_counts.get("completed_with_errors"), Some(&1));
    assert!(stats.recent_failures.is_empty());

    let status = engine.sync_status("pub_a", &page[0].sync_id).await.unwrap();
    assert_eq!(status.sync_id, page[0].sync_id);
}

#[tokio::test]
async fn same_day_rerun_short_circuits_unless_forced() {
    let store = Store::new();
    let engine = SyncEngine::new(store.clone());
    let adapter = MockAdapter::new();

    let first = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();

    let second = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.sync_id, first.sync_id);

    let third = engine
        .run(&ctx(false), &adapter, SyncMode::Full, &forced())
        .await
        .unwrap();
    assert_ne!(third.sync_id, first.sync_id);
}
