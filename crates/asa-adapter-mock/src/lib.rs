// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mock ad-server adapter for local development and tests.
//!
//! Accepts every structurally valid request, honors dry-run by logging the
//! intended operation, and synthesizes deterministic delivery metrics so
//! scheduler and reporting paths can be exercised without a real ad server.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use asa_adapter_core::{
    ActivationDecision, AdServerAdapter, AdapterCreateRequest, AdapterCreateSuccess,
    AdapterIdentity, AdapterPackageOutcome, AdapterUpdateSuccess, DeliveryTarget, InventoryItem,
    InventoryKind, UploadedCreative, activation_decision, ensure_overlay_supported,
};
use asa_context::RequestContext;
use asa_core::creative::Creative;
use asa_core::delivery::{MediaBuyDelivery, PackageDelivery};
use asa_core::media_buy::{MediaBuyStatus, UpdateMediaBuyRequest};
use asa_core::targeting::{TargetingCapability, platform_capabilities};
use asa_error::AdcpResult;

/// The mock adapter.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter;

impl MockAdapter {
    /// Create a mock adapter.
    pub fn new() -> Self {
        Self
    }
}

/// Stable small hash for deterministic synthetic metrics.
fn metric_seed(key: &str) -> u64 {
    key.bytes().fold(1469598103934665603u64, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(1099511628211)
    })
}

#[async_trait]
impl AdServerAdapter for MockAdapter {
    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            id: "mock".to_string(),
            adapter_version: Some("0.1".to_string()),
        }
    }

    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability> {
        // The mock supports the full platform surface.
        platform_capabilities()
    }

    async fn create_media_buy(
        &self,
        ctx: &RequestContext,
        request: AdapterCreateRequest,
    ) -> AdcpResult<AdapterCreateSuccess> {
        let capabilities = self.targeting_capabilities();
        for package in &request.packages {
            ensure_overlay_supported(package.targeting_overlay.as_ref(), &capabilities)?;
        }

        if ctx.testing.dry_run {
            info!(
                media_buy_id = %request.media_buy_id,
                packages = request.packages.len(),
                total_budget = request.total_budget,
                "[DRY RUN] would create media buy"
            );
        } else {
            info!(
                media_buy_id = %request.media_buy_id,
                packages = request.packages.len(),
                "mock adapter creating media buy"
            );
        }

        let manual_approval_required = request.packages.iter().any(|p| {
            activation_decision(p.line_item_type, p.automation)
                == ActivationDecision::RequireConfirmation
                && !p.line_item_type.is_guaranteed()
        });

        let packages = request
            .packages
            .iter()
            .map(|p| AdapterPackageOutcome {
                package_id: p.package_id.clone(),
                buyer_ref: p.buyer_ref.clone(),
                paused: false,
                creative_ids: p
                    .creatives
                    .iter()
                    .map(|c| c.creative_id.clone())
                    .collect(),
            })
            .collect();

        Ok(AdapterCreateSuccess {
            media_buy_id: request.media_buy_id,
            buyer_ref: request.buyer_ref,
            packages,
            creative_deadline: None,
            manual_approval_required,
        })
    }

    async fn update_media_buy(
        &self,
        ctx: &RequestContext,
        request: &UpdateMediaBuyRequest,
    ) -> AdcpResult<AdapterUpdateSuccess> {
        let media_buy_id = request
            .media_buy_id
            .clone()
            .unwrap_or_else(|| "mb_unknown".to_string());
        if ctx.testing.dry_run {
            info!(media_buy_id = %media_buy_id, "[DRY RUN] would update media buy");
        }
        let status = match request.paused {
            Some(true) => MediaBuyStatus::Paused,
            _ => MediaBuyStatus::Active,
        };
        Ok(AdapterUpdateSuccess {
            media_buy_id,
            status,
            affected_packages: request.packages.iter().map(|p| p.package_id.clone()).collect(),
        })
    }

    async fn upload_creatives(
        &self,
        ctx: &RequestContext,
        creatives: &[Creative],
    ) -> AdcpResult<Vec<UploadedCreative>> {
        if ctx.testing.dry_run {
            info!(count = creatives.len(), "[DRY RUN] would upload creatives");
        }
        Ok(creatives
            .iter()
            .map(|c| UploadedCreative {
                creative_id: c.creative_id.clone(),
                platform_creative_id: format!("mock_{}", c.creative_id),
            })
            .collect())
    }

    async fn get_media_buy_delivery(
        &self,
        _ctx: &RequestContext,
        targets: &[DeliveryTarget],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AdcpResult<Vec<MediaBuyDelivery>> {
        let days = (end_date - start_date).num_days().max(1) as u64;
        Ok(targets
            .iter()
            .map(|target| {
                let by_package: Vec<PackageDelivery> = target
                    .package_ids
                    .iter()
                    .map(|package_id| {
                        let seed = metric_seed(&format!("{}/{package_id}", target.media_buy_id));
                        let impressions = (seed % 10_000 + 500) * days;
                        PackageDelivery {
                            package_id: package_id.clone(),
                            impressions,
                            spend: impressions as f64 / 1000.0 * 12.5,
                            clicks: Some(impressions / 200),
                            video_completions: None,
                        }
                    })
                    .collect();
                let total_impressions = by_package.iter().map(|p| p.impressions).sum();
                let total_spend = by_package.iter().map(|p| p.spend).sum();
                MediaBuyDelivery {
                    media_buy_id: target.media_buy_id.clone(),
                    buyer_ref: target.buyer_ref.clone(),
                    status: target.status,
                    by_package,
                    total_impressions,
                    total_spend,
                }
            })
            .collect())
    }

    async fn discover_inventory(
        &self,
        _ctx: &RequestContext,
        kind: InventoryKind,
        since: Option<DateTime<Utc>>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        // Incremental syncs see no changes in the mock.
        if since.is_some() && kind.supports_incremental() {
            return Ok(vec![]);
        }
        let items = match kind {
            InventoryKind::AdUnits => vec![
                item("au_root", "Network root", vec!["Network root"]),
                item("au_news", "News", vec!["Network root", "News"]),
                item("au_sports", "Sports", vec!["Network root", "Sports"]),
            ],
            InventoryKind::Placements => vec![
                item("pl_homepage", "Homepage", vec!["Homepage"]),
                item("pl_ros", "Run of site", vec!["Run of site"]),
            ],
            InventoryKind::Labels => vec![item("lb_premium", "Premium", vec!["Premium"])],
            InventoryKind::CustomTargetingKeys => {
                vec![item("ctk_section", "section", vec!["section"])]
            }
            InventoryKind::AudienceSegments => {
                vec![item("as_readers", "Engaged readers", vec!["Engaged readers"])]
            }
        };
        Ok(items)
    }

    async fn discover_custom_targeting_values(
        &self,
        _ctx: &RequestContext,
        key_id: &str,
        max_values: Option<usize>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        let mut values = vec![
            item(&format!("{key_id}_news"), "news", vec!["news"]),
            item(&format!("{key_id}_sports"), "sports", vec!["sports"]),
            item(&format!("{key_id}_culture"), "culture", vec!["culture"]),
        ];
        if let Some(limit) = max_values {
            values.truncate(limit);
        }
        Ok(values)
    }
}

fn item(id: &str, name: &str, path: Vec<&str>) -> InventoryItem {
    InventoryItem {
        id: id.to_string(),
        name: name.to_string(),
        path: path.into_iter().map(String::from).collect(),
        status: "ACTIVE".to_string(),
        metadata: json!({"source": "mock"}),
    }
}
