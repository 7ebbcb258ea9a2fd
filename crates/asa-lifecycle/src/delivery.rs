// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery fetch shared by the tool and the webhook scheduler.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::warn;

use asa_adapter_core::DeliveryTarget;
use asa_context::RequestContext;
use asa_core::delivery::{
    DeliveryError, DeliverySuccess, GetMediaBuyDeliveryRequest, GetMediaBuyDeliveryResponse,
};
use asa_error::AdcpResult;
use asa_store::MediaBuyRow;

use crate::Lifecycle;

impl Lifecycle {
    /// `get_media_buy_delivery`.
    ///
    /// The same implementation backs the synchronous tool and the
    /// scheduler's report generation; dry-run contexts reach the adapter's
    /// simulated metrics.
    pub async fn get_media_buy_delivery(
        &self,
        ctx: &RequestContext,
        request: GetMediaBuyDeliveryRequest,
    ) -> GetMediaBuyDeliveryResponse {
        match self.try_delivery(ctx, request).await {
            Ok(success) => GetMediaBuyDeliveryResponse::Success(success),
            Err(err) => {
                warn!(tenant_id = ctx.tenant_id(), %err, "get_media_buy_delivery failed");
                GetMediaBuyDeliveryResponse::Error(DeliveryError {
                    errors: vec![err.to_object()],
                })
            }
        }
    }

    async fn try_delivery(
        &self,
        ctx: &RequestContext,
        request: GetMediaBuyDeliveryRequest,
    ) -> AdcpResult<DeliverySuccess> {
        request.validate_period()?;

        let mut buys: Vec<MediaBuyRow> = Vec::new();
        if request.media_buy_ids.is_empty() && request.buyer_refs.is_empty() {
            buys = self
                .store
                .list_media_buys(ctx.tenant_id())
                .await
                .into_iter()
                .filter(|b| b.principal_id == ctx.principal_id)
                .collect();
        } else {
            for id in &request.media_buy_ids {
                buys.push(self.store.get_media_buy(ctx.tenant_id(), id).await?);
            }
            for buyer_ref in &request.buyer_refs {
                buys.push(
                    self.store
                        .get_media_buy_by_buyer_ref(ctx.tenant_id(), buyer_ref)
                        .await?,
                );
            }
        }

        if let Some(filter) = &request.status_filter {
            let statuses = filter.statuses();
            buys.retain(|b| statuses.contains(&b.status));
        }

        let mut targets = Vec::with_capacity(buys.len());
        let mut currency = None;
        for buy in &buys {
            currency.get_or_insert_with(|| buy.currency.clone());
            let package_ids = self
                .store
                .list_packages(ctx.tenant_id(), &buy.media_buy_id)
                .await
                .into_iter()
                .map(|p| p.package_id)
                .collect();
            targets.push(DeliveryTarget {
                media_buy_id: buy.media_buy_id.clone(),
                buyer_ref: buy.buyer_ref.clone(),
                status: buy.status,
                package_ids,
            });
        }

        let today = Utc::now().date_naive();
        let start_date = request
            .start_date
            .unwrap_or_else(|| today - ChronoDuration::days(1));
        let end_date = request.end_date.unwrap_or(today);

        let deliveries = if targets.is_empty() {
            vec![]
        } else {
            let adapter = self.adapters.for_tenant(&ctx.tenant)?;
            adapter
                .get_media_buy_delivery(ctx, &targets, start_date, end_date)
                .await?
        };

        Ok(DeliverySuccess {
            deliveries,
            currency: currency.unwrap_or_else(|| "USD".to_string()),
        })
    }
}
