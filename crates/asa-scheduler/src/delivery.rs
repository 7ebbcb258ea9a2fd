// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery webhook scheduler.
//!
//! Hourly batch that sends daily delivery reports to buys with a
//! configured `reporting_webhook`. Only daily frequency is honored; the
//! reporting period is the previous UTC day; a successful scheduled
//! notification within the last 24 hours suppresses resending, so the
//! startup tick is safe. Each buy is processed with its own store reads,
//! and the store is not held across the webhook send.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info, warn};

use asa_context::RequestContext;
use asa_core::delivery::{GetMediaBuyDeliveryRequest, GetMediaBuyDeliveryResponse};
use asa_core::media_buy::{MediaBuyStatus, ReportingWebhook};
use asa_lifecycle::Lifecycle;
use asa_store::MediaBuyRow;
use asa_webhook::{DELIVERY_TASK_TYPE, WebhookPayload, WebhookService, resolve_push_config};

use crate::LoopControl;

/// The delivery webhook scheduler singleton.
pub struct DeliveryWebhookScheduler {
    worker: ReportWorker,
    interval: Duration,
    control: LoopControl,
}

/// The batch logic, cloneable into the background task.
#[derive(Clone)]
struct ReportWorker {
    lifecycle: Lifecycle,
    webhooks: Arc<WebhookService>,
    dry_run: bool,
}

impl DeliveryWebhookScheduler {
    /// Build a scheduler with the given cadence.
    pub fn new(
        lifecycle: Lifecycle,
        webhooks: Arc<WebhookService>,
        interval_secs: u64,
        dry_run: bool,
    ) -> Self {
        Self {
            worker: ReportWorker {
                lifecycle,
                webhooks,
                dry_run,
            },
            interval: Duration::from_secs(interval_secs),
            control: LoopControl::new("delivery webhook scheduler"),
        }
    }

    /// Whether the loop is installed.
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Start the background loop. The first tick runs immediately; the
    /// dedup window prevents over-delivery after restarts.
    pub async fn start(&self) {
        let worker = self.worker.clone();
        let interval = self.interval;
        self.control
            .start(move |running| {
                tokio::spawn(async move {
                    while running.load(Ordering::SeqCst) {
                        if let Err(err) = worker.tick(Utc::now()).await {
                            error!(%err, "delivery webhook tick failed");
                        }
                        tokio::time::sleep(interval).await;
                    }
                })
            })
            .await;
    }

    /// Stop the background loop. Idempotent.
    pub async fn stop(&self) {
        self.control.stop().await;
    }

    /// One batch pass over every reporting-enabled media buy.
    ///
    /// # Errors
    ///
    /// Store-level failures only; per-buy errors are logged and skipped.
    pub async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        self.worker.tick(now).await
    }

    /// Manually trigger a report for one media buy, bypassing the
    /// frequency gate and the dedup window.
    pub async fn trigger_report_for_media_buy_by_id(
        &self,
        media_buy_id: &str,
        tenant_id: &str,
    ) -> bool {
        self.worker
            .trigger_report_for_media_buy_by_id(media_buy_id, tenant_id)
            .await
    }
}

impl ReportWorker {
    async fn tick(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        info!("starting scheduled delivery report batch");
        let buys = self
            .lifecycle
            .store()
            .list_media_buys_by_status(&[MediaBuyStatus::Active])
            .await;

        let mut sent = 0;
        let mut errors = 0;
        for buy in buys {
            let Some(webhook) = reporting_webhook(&buy) else {
                continue;
            };
            match self.send_report(&buy, &webhook, now, false).await {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(err) => {
                    error!(media_buy_id = %buy.media_buy_id, %err, "report failed");
                    errors += 1;
                }
            }
        }
        info!(sent, errors, "delivery report batch complete");
        Ok(sent)
    }

    async fn trigger_report_for_media_buy_by_id(
        &self,
        media_buy_id: &str,
        tenant_id: &str,
    ) -> bool {
        let buy = match self.lifecycle.store().get_media_buy(tenant_id, media_buy_id).await {
            Ok(buy) => buy,
            Err(_) => {
                warn!(media_buy_id, "cannot trigger report: media buy not found");
                return false;
            }
        };
        let Some(webhook) = reporting_webhook(&buy) else {
            warn!(media_buy_id, "cannot trigger report: no reporting_webhook configured");
            return false;
        };
        match self.send_report(&buy, &webhook, Utc::now(), true).await {
            Ok(sent) => sent,
            Err(err) => {
                error!(media_buy_id, %err, "manual report trigger failed");
                false
            }
        }
    }

    /// Send one report. Returns whether a webhook actually went out.
    async fn send_report(
        &self,
        buy: &MediaBuyRow,
        webhook: &ReportingWebhook,
        now: DateTime<Utc>,
        force: bool,
    ) -> anyhow::Result<bool> {
        let frequency = webhook
            .frequency
            .as_deref()
            .unwrap_or("daily")
            .to_ascii_lowercase();
        if !force && frequency != "daily" {
            warn!(
                media_buy_id = %buy.media_buy_id,
                frequency,
                "only 'daily' reporting frequency is supported; skipping"
            );
            return Ok(false);
        }

        // One successful scheduled notification per rolling UTC day.
        if !force {
            let window_start = now - ChronoDuration::hours(24);
            if let Some(existing) = self
                .lifecycle
                .store()
                .find_recent_webhook_success(
                    &buy.media_buy_id,
                    DELIVERY_TASK_TYPE,
                    "scheduled",
                    window_start,
                )
                .await
            {
                info!(
                    media_buy_id = %buy.media_buy_id,
                    log_id = existing.id,
                    "daily delivery webhook already sent; skipping"
                );
                return Ok(false);
            }
        }

        let tenant = self
            .lifecycle
            .store()
            .get_tenant(&buy.tenant_id)
            .await
            .ok_or_else(|| anyhow::anyhow!("tenant '{}' vanished", buy.tenant_id))?;
        let ctx = RequestContext::for_scheduler(
            tenant,
            buy.principal_id.clone(),
            "get_media_buy_delivery",
            now,
            self.dry_run,
        );

        // Reporting period: the previous full UTC day.
        let yesterday = now.date_naive() - ChronoDuration::days(1);
        let request = GetMediaBuyDeliveryRequest {
            media_buy_ids: vec![buy.media_buy_id.clone()],
            start_date: Some(yesterday),
            end_date: Some(yesterday),
            ..Default::default()
        };
        let delivery = match self.lifecycle.get_media_buy_delivery(&ctx, request).await {
            GetMediaBuyDeliveryResponse::Success(success) => success,
            GetMediaBuyDeliveryResponse::Error(err) => {
                warn!(
                    media_buy_id = %buy.media_buy_id,
                    ?err,
                    "could not fetch delivery for report; skipping"
                );
                return Ok(false);
            }
        };

        let next_day = now.date_naive() + ChronoDuration::days(1);
        let next_expected_at = next_day
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);

        let notification_type = if force { "triggered" } else { "scheduled" };
        let payload = WebhookPayload::delivery_report(
            &buy.media_buy_id,
            serde_json::to_value(&delivery)?,
            notification_type,
            next_expected_at,
        );

        let config = resolve_push_config(
            self.lifecycle.store(),
            &buy.tenant_id,
            &buy.principal_id,
            &buy.media_buy_id,
            webhook,
        )
        .await;

        // The store guard is released; only now does network I/O happen.
        match self
            .webhooks
            .send_notification(&config, &payload, notification_type, ctx.testing.dry_run)
            .await
        {
            Ok(row) => {
                info!(
                    media_buy_id = %buy.media_buy_id,
                    sequence = row.sequence_number,
                    "sent delivery report webhook"
                );
                Ok(true)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// The buy's reporting webhook, re-derived from the stored request.
fn reporting_webhook(buy: &MediaBuyRow) -> Option<ReportingWebhook> {
    buy.raw_request
        .get("reporting_webhook")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}
