// SPDX-License-Identifier: MIT OR Apache-2.0
//! Triton Digital adapter.
//!
//! Audio-only: media buys map to Triton campaigns over station inventory,
//! creatives must carry an audio asset, and the only buyer-settable device
//! dimension is audio. Stations are the sole discoverable inventory kind.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info};

use asa_adapter_core::{
    AdServerAdapter, AdapterCreateRequest, AdapterCreateSuccess, AdapterIdentity,
    AdapterPackageOutcome, AdapterUpdateSuccess, DeliveryTarget, InventoryItem, InventoryKind,
    UploadedCreative, ensure_overlay_supported,
};
use asa_context::RequestContext;
use asa_core::creative::Creative;
use asa_core::delivery::{MediaBuyDelivery, PackageDelivery};
use asa_core::media_buy::{MediaBuyStatus, UpdateMediaBuyRequest};
use asa_core::targeting::{TargetingAccess, TargetingCapability, platform_capabilities};
use asa_error::{AdcpError, AdcpResult};

/// Connection settings for the Triton campaign API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TritonConfig {
    /// API base URL.
    pub api_base: String,
    /// Station group the tenant sells.
    pub station_group: String,
    /// API token.
    pub api_token: String,
}

/// The Triton Digital adapter.
#[derive(Debug)]
pub struct TritonAdapter {
    config: TritonConfig,
    http: reqwest::Client,
}

impl TritonAdapter {
    /// Build an adapter.
    pub fn new(config: TritonConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> AdcpResult<Value> {
        let url = format!("{}/{path}", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdcpError::unavailable("Triton API unreachable").with_source(e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AdcpError::unavailable("Triton response truncated").with_source(e))?;
        if !status.is_success() {
            return Err(AdcpError::adapter(format!("Triton request '{path}' failed ({status})"))
                .with_detail("status", status.as_u16())
                .with_detail("body", text));
        }
        serde_json::from_str(&text)
            .map_err(|e| AdcpError::adapter("Triton returned malformed JSON").with_source(e))
    }

    fn require_audio_assets(creatives: &[Creative]) -> AdcpResult<()> {
        for creative in creatives {
            let has_audio = creative.assets.values().any(|asset| {
                asset.duration_ms.is_some()
                    || asset
                        .url
                        .as_deref()
                        .is_some_and(|u| u.ends_with(".mp3") || u.ends_with(".aac"))
            });
            if !has_audio {
                return Err(AdcpError::validation(format!(
                    "creative '{}' has no audio asset; Triton serves audio only",
                    creative.creative_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AdServerAdapter for TritonAdapter {
    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            id: "triton".to_string(),
            adapter_version: Some("v2".to_string()),
        }
    }

    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability> {
        // Audio has no browser/content surface; geo and daypart-style
        // custom keys are the buyer levers.
        let mut caps = platform_capabilities();
        for dim in [
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
        if let Some(device) = caps.get_mut("device_type") {
            device.allowed_values = vec!["audio".to_string()];
        }
        if let Some(media) = caps.get_mut("media_type") {
            media.allowed_values = vec!["audio".to_string()];
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
            Self::require_audio_assets(&package.creatives)?;
        }

        if ctx.testing.dry_run {
            info!(media_buy_id = %request.media_buy_id, "[DRY RUN] would create Triton campaign");
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

        #[derive(Deserialize)]
        struct Campaign {
            campaign_id: String,
            #[serde(default)]
            flights: Vec<TritonFlight>,
        }
        #[derive(Deserialize)]
        struct TritonFlight {
            flight_id: String,
            #[serde(default)]
            paused: bool,
        }
        let campaign: Campaign = serde_json::from_value(
            self.post(
                "campaigns",
                json!({
                    "name": request.media_buy_id,
                    "station_group": self.config.station_group,
                    "currency": request.currency,
                    "start": request.start_time.to_rfc3339(),
                    "end": request.end_time.to_rfc3339(),
                    "flights": request.packages.iter().map(|p| json!({
                        "name": p.package_id,
                        "budget": p.budget,
                        "rate": p.pricing.rate.or(p.pricing.bid_price),
                        "rate_type": p.pricing.pricing_model.to_string(),
                        "targeting": p.targeting_overlay,
                    })).collect::<Vec<_>>(),
                }),
            )
            .await?,
        )
        .map_err(|e| AdcpError::adapter("Triton campaign shape mismatch").with_source(e))?;

        let packages = campaign
            .flights
            .iter()
            .zip(&request.packages)
            .map(|(flight, package)| AdapterPackageOutcome {
                package_id: flight.flight_id.clone(),
                buyer_ref: package.buyer_ref.clone(),
                paused: flight.paused,
                creative_ids: package.creatives.iter().map(|c| c.creative_id.clone()).collect(),
            })
            .collect();

        Ok(AdapterCreateSuccess {
            media_buy_id: campaign.campaign_id,
            buyer_ref: request.buyer_ref,
            packages,
            creative_deadline: None,
            manual_approval_required: false,
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
            .ok_or_else(|| AdcpError::invalid_request("Triton update requires media_buy_id"))?;
        if ctx.testing.dry_run {
            info!(media_buy_id, "[DRY RUN] would update Triton campaign");
        } else {
            self.post(
                &format!("campaigns/{media_buy_id}/update"),
                json!({
                    "paused": request.paused,
                    "end": request.end_time.map(|t| t.to_rfc3339()),
                }),
            )
            .await?;
        }
        Ok(AdapterUpdateSuccess {
            media_buy_id: media_buy_id.to_string(),
            status: if request.paused == Some(true) {
                MediaBuyStatus::Paused
            } else {
                MediaBuyStatus::Active
            },
            affected_packages: request.packages.iter().map(|p| p.package_id.clone()).collect(),
        })
    }

    async fn upload_creatives(
        &self,
        ctx: &RequestContext,
        creatives: &[Creative],
    ) -> AdcpResult<Vec<UploadedCreative>> {
        Self::require_audio_assets(creatives)?;
        if ctx.testing.dry_run {
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
            #[derive(Deserialize)]
            struct Spot {
                spot_id: String,
            }
            let spot: Spot = serde_json::from_value(
                self.post("spots", serde_json::to_value(creative).unwrap_or_default())
                    .await?,
            )
            .map_err(|e| AdcpError::adapter("Triton spot shape mismatch").with_source(e))?;
            uploaded.push(UploadedCreative {
                creative_id: creative.creative_id.clone(),
                platform_creative_id: spot.spot_id,
            });
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
            #[derive(Deserialize)]
            struct FlightRow {
                flight_id: String,
                impressions: u64,
                spend: f64,
                #[serde(default)]
                completions: Option<u64>,
            }
            #[derive(Deserialize)]
            struct Report {
                #[serde(default)]
                rows: Vec<FlightRow>,
            }
            let report: Report = serde_json::from_value(
                self.post(
                    &format!("campaigns/{}/delivery", target.media_buy_id),
                    json!({
                        "start_date": start_date.to_string(),
                        "end_date": end_date.to_string(),
                    }),
                )
                .await?,
            )
            .map_err(|e| AdcpError::adapter("Triton report shape mismatch").with_source(e))?;

            let by_package: Vec<PackageDelivery> = report
                .rows
                .into_iter()
                .map(|row| PackageDelivery {
                    package_id: row.flight_id,
                    impressions: row.impressions,
                    spend: row.spend,
                    clicks: None,
                    video_completions: row.completions,
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
        _since: Option<DateTime<Utc>>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        if kind != InventoryKind::AdUnits {
            debug!(kind = kind.as_str(), "kind has no Triton counterpart");
            return Ok(vec![]);
        }

        #[derive(Deserialize)]
        struct Station {
            station_id: String,
            name: String,
            #[serde(default)]
            market: Option<String>,
        }
        #[derive(Deserialize)]
        struct Stations {
            #[serde(default)]
            stations: Vec<Station>,
        }
        let listing: Stations = serde_json::from_value(
            self.post(
                "stations/search",
                json!({"station_group": self.config.station_group}),
            )
            .await?,
        )
        .map_err(|e| AdcpError::adapter("Triton station shape mismatch").with_source(e))?;

        Ok(listing
            .stations
            .into_iter()
            .map(|station| {
                let mut path = vec![self.config.station_group.clone()];
                if let Some(market) = &station.market {
                    path.push(market.clone());
                }
                path.push(station.name.clone());
                InventoryItem {
                    id: station.station_id,
                    name: station.name.clone(),
                    path,
                    status: "ACTIVE".to_string(),
                    metadata: json!({"market": station.market}),
                }
            })
            .collect())
    }

    async fn discover_custom_targeting_values(
        &self,
        _ctx: &RequestContext,
        _key_id: &str,
        _max_values: Option<usize>,
    ) -> AdcpResult<Vec<InventoryItem>> {
        Ok(vec![])
    }
}
