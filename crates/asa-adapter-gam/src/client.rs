// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thin HTTP client for the GAM REST gateway.
//!
//! Upstream faults map onto the error taxonomy here: connection failures
//! become `unavailable`, non-2xx responses become `adapter_error` with the
//! body preserved in detail, so callers never need to look at reqwest
//! types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use asa_adapter_core::{AdapterCreateRequest, AdapterPackageRequest, AdapterUpdateSuccess, UploadedCreative};
use asa_core::creative::Creative;
use asa_core::media_buy::{MediaBuyStatus, UpdateMediaBuyRequest};
use asa_error::{AdcpError, AdcpResult};

/// Rows per page for statement-style queries.
pub(crate) const PAGE_SIZE: usize = 500;

/// Connection settings for the GAM gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamConfig {
    /// Gateway base URL.
    pub api_base: String,
    /// GAM network code.
    pub network_code: String,
    /// OAuth bearer token minted by the credential store.
    pub bearer_token: String,
}

/// HTTP client bound to one network.
#[derive(Debug)]
pub struct GamClient {
    config: GamConfig,
    http: reqwest::Client,
}

/// One page of a statement-style query.
#[derive(Debug, Deserialize)]
pub(crate) struct GamPage {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_result_set_size: usize,
}

/// Created order, as the gateway reports it.
#[derive(Debug, Deserialize)]
pub struct GamOrder {
    /// Platform order id.
    pub order_id: String,
    /// Creative sync deadline, when imposed.
    #[serde(default)]
    pub creative_deadline: Option<DateTime<Utc>>,
}

/// Created line item, as the gateway reports it.
#[derive(Debug, Deserialize)]
pub struct GamLineItem {
    /// Platform line-item id.
    pub line_item_id: String,
    /// Whether the line item was created paused.
    #[serde(default)]
    pub paused: bool,
}

/// One row of a delivery report.
#[derive(Debug, Deserialize)]
pub struct GamReportRow {
    /// The line item reported on.
    pub line_item_id: String,
    /// Impressions in the period.
    pub impressions: u64,
    /// Spend in the period.
    pub spend: f64,
    /// Clicks, when the report includes them.
    #[serde(default)]
    pub clicks: Option<u64>,
    /// Video completions, when the report includes them.
    #[serde(default)]
    pub video_completions: Option<u64>,
}

impl GamClient {
    /// Build a client.
    pub fn new(config: GamConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/networks/{}/{path}",
            self.config.api_base.trim_end_matches('/'),
            self.config.network_code
        )
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> AdcpResult<serde_json::Value> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.bearer_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdcpError::unavailable("GAM gateway unreachable").with_source(e))?;
        Self::decode(path, response).await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> AdcpResult<serde_json::Value> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.config.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AdcpError::unavailable("GAM gateway unreachable").with_source(e))?;
        Self::decode(path, response).await
    }

    async fn decode(path: &str, response: reqwest::Response) -> AdcpResult<serde_json::Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AdcpError::unavailable("GAM response truncated").with_source(e))?;
        if !status.is_success() {
            return Err(AdcpError::adapter(format!("GAM request '{path}' failed ({status})"))
                .with_detail("status", status.as_u16())
                .with_detail("body", body));
        }
        serde_json::from_str(&body).map_err(|e| {
            AdcpError::adapter(format!("GAM returned malformed JSON for '{path}'")).with_source(e)
        })
    }

    /// Page a statement-style resource to exhaustion.
    pub(crate) async fn fetch_all_pages(
        &self,
        path: &str,
        base_query: &[(&'static str, String)],
    ) -> AdcpResult<Vec<serde_json::Value>> {
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut query = base_query.to_vec();
            query.push(("limit", PAGE_SIZE.to_string()));
            query.push(("offset", offset.to_string()));
            let page: GamPage = serde_json::from_value(self.get(path, &query).await?)
                .map_err(|e| AdcpError::adapter("GAM page shape mismatch").with_source(e))?;
            let fetched = page.results.len();
            out.extend(page.results);
            offset += fetched;
            if fetched == 0 || offset >= page.total_result_set_size {
                break;
            }
        }
        Ok(out)
    }

    /// Create the order for a media buy.
    pub async fn create_order(&self, request: &AdapterCreateRequest) -> AdcpResult<GamOrder> {
        let body = json!({
            "name": request.media_buy_id,
            "po_number": request.po_number,
            "currency": request.currency,
            "total_budget": request.total_budget,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
        });
        let value = self.post("orders", body).await?;
        serde_json::from_value(value)
            .map_err(|e| AdcpError::adapter("GAM order shape mismatch").with_source(e))
    }

    /// Create one line item under an order.
    pub async fn create_line_item(
        &self,
        order_id: &str,
        package: &AdapterPackageRequest,
        request: &AdapterCreateRequest,
    ) -> AdcpResult<GamLineItem> {
        let body = json!({
            "name": package.package_id,
            "line_item_type": package.line_item_type.to_string(),
            "cost_per_unit": package.pricing.rate.or(package.pricing.bid_price),
            "cost_type": package.pricing.pricing_model.to_string().to_uppercase(),
            "budget": package.budget,
            "currency": request.currency,
            "targeting": package.targeting_overlay,
            "creatives": package.creatives,
            "start_time": request.start_time.to_rfc3339(),
            "end_time": request.end_time.to_rfc3339(),
        });
        let value = self
            .post(&format!("orders/{order_id}/line_items"), body)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| AdcpError::adapter("GAM line item shape mismatch").with_source(e))
    }

    /// Resume (activate) an order.
    pub async fn activate_order(&self, order_id: &str) -> AdcpResult<()> {
        self.post(&format!("orders/{order_id}/activate"), json!({}))
            .await?;
        Ok(())
    }

    /// Apply an update to an order.
    pub async fn update_order(
        &self,
        order_id: &str,
        request: &UpdateMediaBuyRequest,
    ) -> AdcpResult<AdapterUpdateSuccess> {
        let body = json!({
            "paused": request.paused,
            "start_time": request.start_time.as_ref().map(ToString::to_string),
            "end_time": request.end_time.map(|t| t.to_rfc3339()),
            "packages": request.packages,
        });
        let value = self.post(&format!("orders/{order_id}"), body).await?;

        #[derive(Deserialize)]
        struct UpdateReply {
            status: MediaBuyStatus,
            #[serde(default)]
            affected_packages: Vec<String>,
        }
        let reply: UpdateReply = serde_json::from_value(value)
            .map_err(|e| AdcpError::adapter("GAM update shape mismatch").with_source(e))?;
        Ok(AdapterUpdateSuccess {
            media_buy_id: order_id.to_string(),
            status: reply.status,
            affected_packages: reply.affected_packages,
        })
    }

    /// Upload one creative to the platform library.
    pub async fn upload_creative(&self, creative: &Creative) -> AdcpResult<UploadedCreative> {
        let value = self
            .post("creatives", serde_json::to_value(creative).unwrap_or_default())
            .await?;

        #[derive(Deserialize)]
        struct CreativeReply {
            platform_creative_id: String,
        }
        let reply: CreativeReply = serde_json::from_value(value)
            .map_err(|e| AdcpError::adapter("GAM creative shape mismatch").with_source(e))?;
        Ok(UploadedCreative {
            creative_id: creative.creative_id.clone(),
            platform_creative_id: reply.platform_creative_id,
        })
    }

    /// Run a delivery report for one order.
    pub async fn run_delivery_report(
        &self,
        order_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AdcpResult<Vec<GamReportRow>> {
        let value = self
            .get(
                &format!("orders/{order_id}/report"),
                &[
                    ("start_date", start_date.to_string()),
                    ("end_date", end_date.to_string()),
                ],
            )
            .await?;

        #[derive(Deserialize)]
        struct Report {
            rows: Vec<GamReportRow>,
        }
        let report: Report = serde_json::from_value(value)
            .map_err(|e| AdcpError::adapter("GAM report shape mismatch").with_source(e))?;
        Ok(report.rows)
    }
}
