// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Protocol webhook delivery.
//!
//! Sends protocol-shaped payloads to registered endpoints, attaches the
//! configured `Authorization` header, and records every attempt in the
//! delivery log with its per-`(media_buy, task_type)` sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use asa_core::media_buy::ReportingWebhook;
use asa_error::{AdcpError, AdcpResult};
use asa_store::{PushNotificationConfigRow, Store, WebhookDeliveryLogRow};

/// Task type carried by delivery-report webhooks.
pub const DELIVERY_TASK_TYPE: &str = "media_buy_delivery";

/// Budget for one webhook POST.
const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// The protocol webhook envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Task the notification concerns.
    pub task_id: String,
    /// Task type.
    pub task_type: String,
    /// Task status (`"completed"` for delivery reports).
    pub status: String,
    /// Domain result plus notification metadata.
    pub result: Value,
}

impl WebhookPayload {
    /// Build a delivery-report payload.
    ///
    /// `result` is the delivery response, extended here with the
    /// notification metadata block (`notification_type`, `next_expected_at`,
    /// `partial_data`, `unavailable_count`).
    pub fn delivery_report(
        media_buy_id: &str,
        mut result: Value,
        notification_type: &str,
        next_expected_at: DateTime<Utc>,
    ) -> Self {
        if let Some(map) = result.as_object_mut() {
            map.insert("notification_type".into(), notification_type.into());
            map.insert(
                "next_expected_at".into(),
                next_expected_at.to_rfc3339().into(),
            );
            map.insert("partial_data".into(), false.into());
            map.insert("unavailable_count".into(), 0.into());
        }
        Self {
            task_id: media_buy_id.to_string(),
            task_type: DELIVERY_TASK_TYPE.to_string(),
            status: "completed".to_string(),
            result,
        }
    }
}

/// Resolve the webhook config for a media buy's reporting endpoint.
///
/// Prefers an active registered [`PushNotificationConfigRow`] matching
/// `(tenant, principal, url)`; otherwise synthesizes an ephemeral config
/// from the inline `reporting_webhook.authentication`.
pub async fn resolve_push_config(
    store: &Store,
    tenant_id: &str,
    principal_id: &str,
    media_buy_id: &str,
    webhook: &ReportingWebhook,
) -> PushNotificationConfigRow {
    if let Some(config) = store
        .find_active_push_config(tenant_id, principal_id, &webhook.url)
        .await
    {
        return config;
    }

    let (auth_type, auth_token) = webhook
        .authentication
        .as_ref()
        .map(|auth| {
            (
                auth.schemes.first().cloned(),
                auth.credentials.clone(),
            )
        })
        .unwrap_or((None, None));

    PushNotificationConfigRow {
        id: format!("temp_{media_buy_id}"),
        tenant_id: tenant_id.to_string(),
        principal_id: principal_id.to_string(),
        url: webhook.url.clone(),
        authentication_type: auth_type,
        authentication_token: auth_token,
        is_active: true,
    }
}

/// Webhook sender bound to the store's delivery log.
pub struct WebhookService {
    store: Store,
    http: reqwest::Client,
}

impl WebhookService {
    /// Build a service.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Send a payload and record the attempt.
    ///
    /// The log row is appended whether the send succeeds or fails, so
    /// sequence numbers account for every attempt. Dry-run sends skip the
    /// network but still log, which keeps simulations honest about
    /// dedup behavior.
    ///
    /// # Errors
    ///
    /// `unavailable` when the endpoint cannot be reached, `adapter_error`
    /// for non-2xx responses. The logged attempt carries the failure.
    pub async fn send_notification(
        &self,
        config: &PushNotificationConfigRow,
        payload: &WebhookPayload,
        notification_type: &str,
        dry_run: bool,
    ) -> AdcpResult<WebhookDeliveryLogRow> {
        let outcome = if dry_run {
            info!(url = %config.url, task_id = %payload.task_id, "[DRY RUN] would send webhook");
            Ok(())
        } else {
            self.post(config, payload).await
        };

        let status = if outcome.is_ok() { "success" } else { "failed" };
        let row = self
            .store
            .append_webhook_log(
                &config.tenant_id,
                &payload.task_id,
                &payload.task_type,
                notification_type,
                status,
                Utc::now(),
            )
            .await;

        match outcome {
            Ok(()) => {
                info!(
                    media_buy_id = %payload.task_id,
                    sequence = row.sequence_number,
                    "webhook delivered"
                );
                Ok(row)
            }
            Err(err) => {
                warn!(media_buy_id = %payload.task_id, %err, "webhook delivery failed");
                Err(err)
            }
        }
    }

    async fn post(
        &self,
        config: &PushNotificationConfigRow,
        payload: &WebhookPayload,
    ) -> AdcpResult<()> {
        let mut request = self
            .http
            .post(&config.url)
            .timeout(SEND_TIMEOUT)
            .json(payload);

        if let (Some(scheme), Some(token)) =
            (&config.authentication_type, &config.authentication_token)
        {
            request = request.header("Authorization", format!("{scheme} {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdcpError::unavailable("webhook endpoint unreachable").with_source(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdcpError::adapter(format!("webhook endpoint returned {status}"))
                .with_detail("status", status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_core::media_buy::WebhookAuthentication;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn webhook(url: &str) -> ReportingWebhook {
        ReportingWebhook {
            url: url.to_string(),
            frequency: Some("daily".into()),
            authentication: Some(WebhookAuthentication {
                schemes: vec!["Bearer".into()],
                credentials: Some("wh_secret".into()),
            }),
        }
    }

    #[test]
    fn delivery_payload_carries_metadata() {
        let next = Utc::now();
        let payload = WebhookPayload::delivery_report(
            "mb_1",
            json!({"deliveries": [], "currency": "USD"}),
            "scheduled",
            next,
        );
        assert_eq!(payload.task_type, "media_buy_delivery");
        assert_eq!(payload.status, "completed");
        assert_eq!(payload.result["notification_type"], "scheduled");
        assert_eq!(payload.result["partial_data"], false);
        assert_eq!(payload.result["unavailable_count"], 0);
        assert_eq!(payload.result["next_expected_at"], next.to_rfc3339());
    }

    #[tokio::test]
    async fn ephemeral_config_synthesized_from_inline_auth() {
        let store = Store::new();
        let config =
            resolve_push_config(&store, "pub_a", "buyer_1", "mb_1", &webhook("https://b/wh")).await;
        assert_eq!(config.id, "temp_mb_1");
        assert_eq!(config.authentication_type.as_deref(), Some("Bearer"));
        assert_eq!(config.authentication_token.as_deref(), Some("wh_secret"));
    }

    #[tokio::test]
    async fn registered_config_wins_over_inline_auth() {
        let store = Store::new();
        store
            .upsert_push_config(PushNotificationConfigRow {
                id: "cfg_1".into(),
                tenant_id: "pub_a".into(),
                principal_id: "buyer_1".into(),
                url: "https://b/wh".into(),
                authentication_type: Some("Bearer".into()),
                authentication_token: Some("registered_secret".into()),
                is_active: true,
            })
            .await;

        let config =
            resolve_push_config(&store, "pub_a", "buyer_1", "mb_1", &webhook("https://b/wh")).await;
        assert_eq!(config.id, "cfg_1");
        assert_eq!(
            config.authentication_token.as_deref(),
            Some("registered_secret")
        );
    }

    #[tokio::test]
    async fn send_attaches_authorization_and_logs_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wh"))
            .and(header("Authorization", "Bearer wh_secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Store::new();
        let service = WebhookService::new(store.clone());
        let config = resolve_push_config(
            &store,
            "pub_a",
            "buyer_1",
            "mb_1",
            &webhook(&format!("{}/wh", server.uri())),
        )
        .await;
        let payload =
            WebhookPayload::delivery_report("mb_1", json!({"deliveries": []}), "scheduled", Utc::now());

        let row = service
            .send_notification(&config, &payload, "scheduled", false)
            .await
            .unwrap();
        assert_eq!(row.sequence_number, 1);
        assert_eq!(row.status, "success");
    }

    #[tokio::test]
    async fn failed_send_is_logged_and_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = Store::new();
        let service = WebhookService::new(store.clone());
        let config = resolve_push_config(
            &store,
            "pub_a",
            "buyer_1",
            "mb_1",
            &webhook(&format!("{}/wh", server.uri())),
        )
        .await;
        let payload =
            WebhookPayload::delivery_report("mb_1", json!({"deliveries": []}), "scheduled", Utc::now());

        let err = service
            .send_notification(&config, &payload, "scheduled", false)
            .await
            .unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::AdapterError);

        let logs = store.list_webhook_logs("mb_1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, "failed");
    }

    #[tokio::test]
    async fn dry_run_logs_without_sending() {
        let store = Store::new();
        let service = WebhookService::new(store.clone());
        // Unroutable endpoint: a real send would fail.
        let config =
            resolve_push_config(&store, "pub_a", "buyer_1", "mb_1", &webhook("http://127.0.0.1:1/wh"))
                .await;
        let payload =
            WebhookPayload::delivery_report("mb_1", json!({"deliveries": []}), "scheduled", Utc::now());

        let row = service
            .send_notification(&config, &payload, "scheduled", true)
            .await
            .unwrap();
        assert_eq!(row.status, "success");
    }
}
