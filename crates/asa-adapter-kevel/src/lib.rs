// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kevel adapter.
//!
//! Maps media buys onto Kevel campaigns and flights. Kevel's decision
//! engine exposes sites and zones as its inventory hierarchy; the remaining
//! kinds have no Kevel counterpart and discover as empty sets.

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

/// Connection settings for the Kevel management API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KevelConfig {
    /// API base URL.
    pub api_base: String,
    /// Network id.
    pub network_id: String,
    /// Management API key.
    pub api_key: String,
}

/// The Kevel adapter.
#[derive(Debug)]
pub struct KevelAdapter {
    config: KevelConfig,
    http: reqwest::Client,
}

impl KevelAdapter {
    /// Build an adapter.
    pub fn new(config: KevelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> AdcpResult<Value> {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header("X-Adzerk-ApiKey", &self.config.api_key);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| AdcpError::unavailable("Kevel API unreachable").with_source(e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AdcpError::unavailable("Kevel response truncated").with_source(e))?;
        if !status.is_success() {
            return Err(AdcpError::adapter(format!("Kevel request '{path}' failed ({status})"))
                .with_detail("status", status.as_u16())
                .with_detail("body", text));
        }
        serde_json::from_str(&text)
            .map_err(|e| AdcpError::adapter("Kevel returned malformed JSON").with_source(e))
    }
}

#[async_trait]
impl AdServerAdapter for KevelAdapter {
    fn identity(&self) -> AdapterIdentity {
        AdapterIdentity {
            id: "kevel".to_string(),
            adapter_version: Some("v1".to_string()),
        }
    }

    fn targeting_capabilities(&self) -> BTreeMap<String, TargetingCapability> {
        // Kevel exposes geo and custom key-value targeting to buyers;
        // device, content, and audience signals stay platform-side, and
        // metro/rating dimensions have no Kevel counterpart at all.
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
        caps.remove("geo_metro");
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
            info!(media_buy_id = %request.media_buy_id, "[DRY RUN] would create Kevel campaign and flights");
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
            #[serde(rename = "Id")]
            id: u64,
        }
        let campaign: Campaign = serde_json::from_value(
            self.request(
                reqwest::Method::POST,
                "campaign",
                Some(json!({
                    "Name": request.media_buy_id,
                    "StartDate": request.start_time.to_rfc3339(),
                    "EndDate": request.end_time.to_rfc3339(),
                    "IsActive": true,
                })),
            )
            .await?,
        )
        .map_err(|e| AdcpError::adapter("Kevel campaign shape mismatch").with_source(e))?;

        #[derive(Deserialize)]
        struct Flight {
            #[serde(rename = "Id")]
            id: u64,
            #[serde(rename = "IsActive", default)]
            is_active: bool,
        }
        let mut packages = Vec::with_capacity(request.packages.len());
        for package in &request.packages {
            let flight: Flight = serde_json::from_value(
                self.request(
                    reqwest::Method::POST,
                    "flight",
                    Some(json!({
                        "CampaignId": campaign.id,
                        "Name": package.package_id,
                        "Price": package.pricing.rate.or(package.pricing.bid_price),
                        "RateType": package.pricing.pricing_model.to_string().to_uppercase(),
                        "LifetimeCapAmount": package.budget,
                        "CustomTargeting": package.targeting_overlay,
                    })),
                )
                .await?,
            )
            .map_err(|e| AdcpError::adapter("Kevel flight shape mismatch").with_source(e))?;
            packages.push(AdapterPackageOutcome {
                package_id: flight.id.to_string(),
                buyer_ref: package.buyer_ref.clone(),
                paused: !flight.is_active,
                creative_ids: package.creatives.iter().map(|c| c.creative_id.clone()).collect(),
            });
        }

        Ok(AdapterCreateSuccess {
            media_buy_id: campaign.id.to_string(),
            buyer_ref: request.buyer_ref,
            packages,
            creative_deadline: None,
            // Kevel flights serve as soon as they are active.
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
            .ok_or_else(|| AdcpError::invalid_request("Kevel update requires media_buy_id"))?;
        if ctx.testing.dry_run {
            info!(media_buy_id, "[DRY RUN] would update Kevel campaign");
        } else {
            self.request(
                reqwest::Method::PUT,
                &format!("campaign/{media_buy_id}"),
                Some(json!({
                    "IsActive": request.paused != Some(true),
                    "EndDate": request.end_time.map(|t| t.to_rfc3339()),
                })),
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
        let mut uploaded = Vec::with_capacity(creatives.len());
        for creative in creatives {
            if ctx.testing.dry_run {
                uploaded.push(UploadedCreative {
                    creative_id: creative.creative_id.clone(),
                    platform_creative_id: format!("dryrun_{}", creative.creative_id),
                });
                continue;
            }
            #[derive(Deserialize)]
            struct Ad {
                #[serde(rename = "Id")]
                id: u64,
            }
            let ad: Ad = serde_json::from_value(
                self.request(
                    reqwest::Method::POST,
                    "creative",
                    Some(json!({
                        "Title": creative.name,
                        "TemplateValues": creative.assets,
                        "AdvertiserId": self.config.network_id,
                    })),
                )
                .await?,
            )
            .map_err(|e| AdcpError::adapter("Kevel creative shape mismatch").with_source(e))?;
            uploaded.push(UploadedCreative {
                creative_id: creative.creative_id.clone(),
                platform_creative_id: ad.id.to_string(),
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
                #[serde(rename = "FlightId")]
                flight_id: u64,
                #[serde(rename = "Impressions")]
                impressions: u64,
                #[serde(rename = "Revenue")]
                revenue: f64,
                #[serde(rename = "Clicks", default)]
                clicks: Option<u64>,
            }
            #[derive(Deserialize)]
            struct Report {
                #[serde(rename = "Records", default)]
                records: Vec<FlightRow>,
            }
            let report: Report = serde_json::from_value(
                self.request(
                    reqwest::Method::POST,
                    "report/queue",
                    Some(json!({
                        "StartDate": start_date.to_string(),
                        "EndDate": end_date.to_string(),
                        "GroupBy": ["flightId"],
                        "Parameters": [{"campaignId": target.media_buy_id}],
                    })),
                )
                .await?,
            )
            .map_err(|e| AdcpError::adapter("Kevel report shape mismatch").with_source(e))?;

            let by_package: Vec<PackageDelivery> = report
                .records
                .into_iter()
                .map(|row| PackageDelivery {
                    package_id: row.flight_id.to_string(),
                    impressions: row.impressions,
                    spend: row.revenue,
                    clicks: row.clicks,
                    video_completions: None,
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
        let path = match kind {
            InventoryKind::AdUnits => "zone",
            InventoryKind::Placements => "site",
            // No Kevel counterpart.
            InventoryKind::Labels
            | InventoryKind::CustomTargetingKeys
            | InventoryKind::AudienceSegments => {
                debug!(kind = kind.as_str(), "kind has no Kevel counterpart");
                return Ok(vec![]);
            }
        };

        #[derive(Deserialize)]
        struct Listing {
            #[serde(rename = "items", default)]
            items: Vec<Value>,
        }
        let listing: Listing = serde_json::from_value(
            self.request(reqwest::Method::GET, path, None).await?,
        )
        .map_err(|e| AdcpError::adapter("Kevel listing shape mismatch").with_source(e))?;

        Ok(listing
            .items
            .into_iter()
            .map(|raw| {
                let id = raw
                    .get("Id")
                    .and_then(Value::as_u64)
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                let name = raw
                    .get("Name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                InventoryItem {
                    id,
                    path: vec![name.clone()],
                    name,
                    status: "ACTIVE".to_string(),
                    metadata: raw,
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
        // Kevel key-values are free-form; there is no enumerable value set.
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> KevelAdapter {
        KevelAdapter::new(KevelConfig {
            api_base: "http://localhost".into(),
            network_id: "23".into(),
            api_key: "key".into(),
        })
    }

    #[test]
    fn kevel_has_no_metro_dimension() {
        let caps = adapter().targeting_capabilities();
        assert!(!caps.contains_key("geo_metro"));
        assert_eq!(caps["geo_country"].access, TargetingAccess::Overlay);
        assert_eq!(caps["audience_segment"].access, TargetingAccess::ManagedOnly);
    }

    #[tokio::test]
    async fn unsupported_kinds_discover_empty() {
        let a = adapter();
        let tenant = asa_store::TenantRow {
            tenant_id: "pub_a".into(),
            name: "Pub".into(),
            subdomain: "pub-a".into(),
            virtual_host: None,
            ad_server: "kevel".into(),
            approval_mode: asa_store::ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        };
        let ctx = RequestContext::for_scheduler(tenant, "buyer_1", "sync", Utc::now(), false);
        let labels = a
            .discover_inventory(&ctx, InventoryKind::Labels, None)
            .await
            .unwrap();
        assert!(labels.is_empty());
        let values = a
            .discover_custom_targeting_values(&ctx, "k", None)
            .await
            .unwrap();
        assert!(values.is_empty());
    }
}
