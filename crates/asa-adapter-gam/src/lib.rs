// SPDX-License-Identifier: MIT OR Apache-2.0
//! Google Ad Manager adapter.
//!
//! Talks to the GAM REST gateway. Inventory discovery pages through each
//! service 500 rows at a time, filters archived entities upstream, and
//! fetches only first-party audience segments (the third-party set is
//! enormous and not tenant-specific). Each discovery call runs under a
//! per-type timeout so one hanging service cannot stall a whole sync.

#![deny(unsafe_code)]

mod client;
mod inventory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use asa_adapter_core::{
    ActivationDecision, AdServerAdapter, AdapterCreateRequest, AdapterCreateSuccess,
    AdapterIdentity, AdapterPackageOutcome, AdapterUpdateSuccess, DeliveryTarget, InventoryItem,
    InventoryKind, UploadedCreative, activation_decision, ensure_overlay_supported, with_timeout,
};
use asa_context::RequestContext;
use asa_core::creative::Creative;
use asa_core::delivery::{MediaBuyDelivery, PackageDelivery};
use asa_core::media_buy::{MediaBuyStatus, UpdateMediaBuyRequest};
use asa_core::targeting::{TargetingAccess, TargetingCapability, platform_capabilities};
use asa_error::{AdcpError, AdcpResult};

pub use client::{GamClient, GamConfig};

/// Discovery timeout for ad units, placements, and custom targeting.
const LONG_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Discovery timeout for labels and audience segments.
const SHORT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(300);

/// The Google Ad Manager adapter.
#[derive(Debug)]
pub struct GamAdapter {
    client: GamClient,
}

impl GamAdapter {
    /// Build an adapter over the given gateway configuration.
    pub fn new(config: GamConfig) -> Self {
        Self {
            client: GamClient::new(config),
        }
    }

    fn discovery_timeout(kind: InventoryKind) -> Duration {
        match kind {
            InventoryKind::AdUnits
            | InventoryKind::Placements
            | InventoryKind::CustomTargetingKeys => LONG_DISCOVERY_TIMEOUT,
            InventoryKind::Labels | InventoryKind::AudienceSegments => SHORT_DISCOVERY_TIMEOUT,
        }
    }
}

#[async_trait]
impl AdServerAdapter for GamAdapter {
    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            id: "google_ad_manager".to_string(),
            adapter_version: Some("v202505".to_string()),
        }
    }

    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability> {
        // GAM keeps device/OS/browser/content signals on the platform side;
        // buyers may only overlay geography, media type, and frequency.
        let mut caps = platform_capabilities();
        for dim in [
            "device_type",
            "device_make",
            "os",
            "browser",
            "content_category",
            "content_language",
            "content_rating",
            "audience_segment",
        ] {
            if let Some(cap) = caps.get_mut(dim) {
                cap.access = TargetingAccess::ManagedOnly;
            }
        }
        caps
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
                "[DRY RUN] would create GAM order and line items"
            );
            let packages = request
                .packages
                .iter()
                .map(|p| AdapterPackageOutcome {
                    package_id: p.package_id.clone(),
                    buyer_ref: p.buyer_ref.clone(),
                    paused: false,
                    creative_ids: p.creatives.iter().map(|c| c.creative_id.clone()).collect(),
                })
                .collect();
            return Ok(AdapterCreateSuccess {
                media_buy_id: request.media_buy_id,
                buyer_ref: request.buyer_ref,
                packages,
                creative_deadline: None,
                manual_approval_required: false,
            });
        }

        let order = self.client.create_order(&request).await?;

        let mut manual_approval_required = false;
        let mut packages = Vec::with_capacity(request.packages.len());
        for package in &request.packages {
            let decision = activation_decision(package.line_item_type, package.automation);
            if decision == ActivationDecision::RequireConfirmation {
                manual_approval_required = true;
            }
            let line_item = self
                .client
                .create_line_item(&order.order_id, package, &request)
                .await?;
            packages.push(AdapterPackageOutcome {
                package_id: line_item.line_item_id,
                buyer_ref: package.buyer_ref.clone(),
                paused: line_item.paused,
                creative_ids: package
                    .creatives
                    .iter()
                    .map(|c| c.creative_id.clone())
                    .collect(),
            });
        }

        // Only fully automatic non-guaranteed orders go live here; the rest
        // wait for the confirmation workflow.
        if !manual_approval_required {
            self.client.activate_order(&order.order_id).await?;
        }

        Ok(AdapterCreateSuccess {
            media_buy_id: order.order_id,
            buyer_ref: request.buyer_ref,
            packages,
            creative_deadline: order.creative_deadline,
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
            .as_deref()
            .ok_or_else(|| AdcpError::invalid_request("GAM update requires media_buy_id"))?;

        if ctx.testing.dry_run {
            info!(media_buy_id, "[DRY RUN] would update GAM order");
            return Ok(AdapterUpdateSuccess {
                media_buy_id: media_buy_id.to_string(),
                status: if request.paused == Some(true) {
                    MediaBuyStatus::Paused
                } else {
                    MediaBuyStatus::Active
                },
                affected_packages: request.packages.iter().map(|p| p.package_id.clone()).collect(),
            });
        }

        self.client.update_order(media_buy_id, request).await
    }

    async fn upload_creatives(
        &self,
        ctx: &RequestContext,
        creatives: &[Creative],
    ) -> AdcpResult<Vec<UploadedCreative>> {
        if ctx.testing.dry_run {
            info!(count = creatives.len(), "[DRY RUN] would upload GAM creatives");
            return Ok(creatives
                .iter()
                .map(|c| UploadedCreative {
                    creative_id: c.creative_id.clone(),
                    platform_creative_id: format!("dryrun_{}", c.creative_id),
                })
                .collect());
        }
        let mut uploaded = Vec::with_capacity(creatives.len());
        for creative in creatives {
            uploaded.push(self.client.upload_creative(creative).await?);
        }
        Ok(uploaded)
    }

    async fn get_media_buy_delivery(
        &self,
        _ctx: &RequestContext,
        targets: &[DeliveryTarget],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AdcpResult<Vec<MediaBuyDelivery>> {
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            let rows = self
                .client
                .run_delivery_report(&target.media_buy_id, start_date, end_date)
                .await?;
            let by_package: Vec<PackageDelivery> = rows
                .into_iter()
                .map(|row| PackageDelivery {
                    package_id: row.line_item_id,
                    impressions: row.impressions,
                    spend: row.spend,
                    clicks: row.clicks,
                    video_completions: row.video_completions,
                })
                .collect();
            let total_impressions = by_package.iter().map(|p| p.impressions).sum();
            let total_spend = by_package.iter().map(|p| p.spend).sum();
            out.push(MediaBuyDelivery {
                media_buy_id: target.media_buy_id.clone(),
                buyer_ref: target.buyer_ref.clone(),
                status: target.status,
                by_package,
                total_impressions,
                total_spend,
            });
        }
        Ok(out)
    }

    async fn discover_inventory(
        &self,
        _ctx: &RequestContext,
        kind: InventoryKind,
        since: Option<DateTime<Utc>>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        // Services without a lastModified filter are always fetched in full.
        let since = since.filter(|_| kind.supports_incremental());
        let budget = Self::discovery_timeout(kind);
        with_timeout(
            kind.as_str(),
            budget,
            inventory::discover(&self.client, kind, since),
        )
        .await
    }

    async fn discover_custom_targeting_values(
        &self,
        _ctx: &RequestContext,
        key_id: &str,
        max_values: Option<usize>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        with_timeout(
            "custom_targeting_values",
            LONG_DISCOVERY_TIMEOUT,
            inventory::discover_values_for_key(&self.client, key_id, max_values),
        )
        .await
    }
}
