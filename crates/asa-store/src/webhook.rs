// SPDX-License-Identifier: MIT OR Apache-2.0
//! Webhook delivery log and push-notification configs.

use chrono::{DateTime, Utc};

use crate::rows::{PushNotificationConfigRow, WebhookDeliveryLogRow};
use crate::Store;

impl Store {
    /// Append a delivery attempt, assigning its sequence number.
    ///
    /// The sequence number is `MAX + 1` over all rows with the same
    /// `(media_buy_id, task_type)`, computed under the same write guard as
    /// the insert so concurrent appends can never duplicate a number and
    /// sequence order always agrees with commit order.
    pub async fn append_webhook_log(
        &self,
        tenant_id: &str,
        media_buy_id: &str,
        task_type: &str,
        notification_type: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> WebhookDeliveryLogRow {
        let mut guard = self.inner.write().await;
        let max_seq = guard
            .webhook_logs
            .iter()
            .filter(|log| log.media_buy_id == media_buy_id && log.task_type == task_type)
            .map(|log| log.sequence_number)
            .max()
            .unwrap_or(0);
        guard.next_webhook_log_id += 1;
        let row = WebhookDeliveryLogRow {
            id: guard.next_webhook_log_id,
            tenant_id: tenant_id.to_string(),
            media_buy_id: media_buy_id.to_string(),
            task_type: task_type.to_string(),
            notification_type: notification_type.to_string(),
            sequence_number: max_seq + 1,
            status: status.to_string(),
            created_at: now,
        };
        guard.webhook_logs.push(row.clone());
        row
    }

    /// Most recent successful scheduled delivery within the window, if any.
    ///
    /// The scheduler's dedup check: one successful `scheduled` notification
    /// per `(media_buy, task_type)` per rolling 24-hour window.
    pub async fn find_recent_webhook_success(
        &self,
        media_buy_id: &str,
        task_type: &str,
        notification_type: &str,
        since: DateTime<Utc>,
    ) -> Option<WebhookDeliveryLogRow> {
        let guard = self.inner.read().await;
        guard
            .webhook_logs
            .iter()
            .filter(|log| {
                log.media_buy_id == media_buy_id
                    && log.task_type == task_type
                    && log.notification_type == notification_type
                    && log.status == "success"
                    && log.created_at > since
            })
            .max_by_key(|log| log.created_at)
            .cloned()
    }

    /// All delivery attempts for a media buy, in commit order.
    pub async fn list_webhook_logs(&self, media_buy_id: &str) -> Vec<WebhookDeliveryLogRow> {
        let guard = self.inner.read().await;
        guard
            .webhook_logs
            .iter()
            .filter(|log| log.media_buy_id == media_buy_id)
            .cloned()
            .collect()
    }

    // -- push-notification configs -------------------------------------------

    /// Insert or replace a push-notification config by id.
    pub async fn upsert_push_config(&self, config: PushNotificationConfigRow) {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.push_configs.iter_mut().find(|c| c.id == config.id) {
            *existing = config;
        } else {
            guard.push_configs.push(config);
        }
    }

    /// The active config registered for `(tenant, principal, url)`, if any.
    pub async fn find_active_push_config(
        &self,
        tenant_id: &str,
        principal_id: &str,
        url: &str,
    ) -> Option<PushNotificationConfigRow> {
        let guard = self.inner.read().await;
        guard
            .push_configs
            .iter()
            .find(|c| {
                c.is_active
                    && c.tenant_id == tenant_id
                    && c.principal_id == principal_id
                    && c.url == url
            })
            .cloned()
    }
}
