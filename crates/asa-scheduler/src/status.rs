// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media-buy status scheduler.
//!
//! Wakes on a fixed cadence and transitions media buys along their flight
//! dates so buys approved before their start date do not stay stuck:
//! `pending_activation`/`scheduled` become `active` once the start passes
//! (pending buys additionally need every assigned creative approved; an
//! empty assignment list counts as ready), and anything past its end
//! becomes `completed`. All transitions of a tick commit together.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{error, info};

use asa_core::creative::CreativeStatus;
use asa_core::media_buy::MediaBuyStatus;
use asa_error::AdcpResult;
use asa_store::{MediaBuyRow, Store};

use crate::LoopControl;

/// The status scheduler singleton.
pub struct MediaBuyStatusScheduler {
    worker: StatusWorker,
    interval: Duration,
    control: LoopControl,
}

/// The tick logic, cloneable into the background task.
#[derive(Clone)]
struct StatusWorker {
    store: Store,
}

impl MediaBuyStatusScheduler {
    /// Build a scheduler with the given cadence.
    pub fn new(store: Store, interval_secs: u64) -> Self {
        Self {
            worker: StatusWorker { store },
            interval: Duration::from_secs(interval_secs),
            control: LoopControl::new("media buy status scheduler"),
        }
    }

    /// Whether the loop is installed.
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Start the background loop. Idempotent; double-start warns.
    pub async fn start(&self) {
        let worker = self.worker.clone();
        let interval = self.interval;
        self.control
            .start(move |running| {
                tokio::spawn(async move {
                    while running.load(Ordering::SeqCst) {
                        if let Err(err) = worker.tick(Utc::now()).await {
                            error!(%err, "media buy status tick failed");
                        }
                        tokio::time::sleep(interval).await;
                    }
                })
            })
            .await;
        info!(interval_secs = self.interval.as_secs(), "status checks scheduled");
    }

    /// Stop the background loop. Idempotent.
    pub async fn stop(&self) {
        self.control.stop().await;
    }

    /// One scheduler pass: compute and commit every due transition.
    ///
    /// # Errors
    ///
    /// Store failures; the loop logs them and keeps ticking.
    pub async fn tick(&self, now: DateTime<Utc>) -> AdcpResult<usize> {
        self.worker.tick(now).await
    }
}

impl StatusWorker {
    async fn tick(&self, now: DateTime<Utc>) -> AdcpResult<usize> {
        let candidates = self
            .store
            .list_media_buys_by_status(&[
                MediaBuyStatus::PendingActivation,
                MediaBuyStatus::Scheduled,
                MediaBuyStatus::Active,
            ])
            .await;

        let mut transitions = Vec::new();
        for buy in &candidates {
            if let Some(next) = self.compute_new_status(buy, now).await {
                info!(
                    media_buy_id = %buy.media_buy_id,
                    from = %buy.status,
                    to = %next,
                    "scheduling status transition"
                );
                transitions.push((buy.tenant_id.clone(), buy.media_buy_id.clone(), next));
            }
        }

        if transitions.is_empty() {
            return Ok(0);
        }
        let updated = self.store.transition_media_buys(&transitions).await?;
        info!(updated, "media buy status(es) updated");
        Ok(updated)
    }

    /// The transition a buy is due for, if any.
    async fn compute_new_status(
        &self,
        buy: &MediaBuyRow,
        now: DateTime<Utc>,
    ) -> Option<MediaBuyStatus> {
        let start = normalize_start(buy)?;
        let end = normalize_end(buy)?;

        if now > end {
            return (buy.status != MediaBuyStatus::Completed).then_some(MediaBuyStatus::Completed);
        }

        if now >= start {
            match buy.status {
                MediaBuyStatus::Scheduled => return Some(MediaBuyStatus::Active),
                MediaBuyStatus::PendingActivation => {
                    if self.creatives_approved(buy).await {
                        return Some(MediaBuyStatus::Active);
                    }
                    return None;
                }
                _ => {}
            }
        }

        None
    }

    /// ALL assigned creatives approved; no assignments counts as ready.
    async fn creatives_approved(&self, buy: &MediaBuyRow) -> bool {
        let assignments = self
            .store
            .list_assignments_for_media_buy(&buy.tenant_id, &buy.media_buy_id)
            .await;
        if assignments.is_empty() {
            return true;
        }

        let mut creative_ids: Vec<&str> =
            assignments.iter().map(|a| a.creative_id.as_str()).collect();
        creative_ids.sort_unstable();
        creative_ids.dedup();

        for creative_id in creative_ids {
            match self.store.get_creative(&buy.tenant_id, creative_id).await {
                Some(row) if row.status == CreativeStatus::Approved => {}
                _ => return false,
            }
        }
        true
    }
}

/// UTC start instant, synthesized from the date column when the datetime
/// is absent.
fn normalize_start(buy: &MediaBuyRow) -> Option<DateTime<Utc>> {
    buy.start_time
        .or_else(|| buy.start_date.and_then(start_of_day))
}

/// UTC end instant, synthesized to end-of-day from the date column when
/// the datetime is absent.
fn normalize_end(buy: &MediaBuyRow) -> Option<DateTime<Utc>> {
    buy.end_time.or_else(|| buy.end_date.and_then(end_of_day))
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|t| t.and_utc())
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999).map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_columns_synthesize_utc_bounds() {
        let buy = MediaBuyRow {
            media_buy_id: "mb_1".into(),
            tenant_id: "pub_a".into(),
            principal_id: "buyer_1".into(),
            buyer_ref: "br_001".into(),
            status: MediaBuyStatus::Scheduled,
            start_time: None,
            end_time: None,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31),
            currency: "USD".into(),
            po_number: None,
            raw_request: serde_json::json!({}),
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
        };
        let start = normalize_start(&buy).unwrap();
        let end = normalize_end(&buy).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(end > Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 58).unwrap());
    }

    #[test]
    fn missing_bounds_mean_no_transition() {
        let buy = MediaBuyRow {
            media_buy_id: "mb_1".into(),
            tenant_id: "pub_a".into(),
            principal_id: "buyer_1".into(),
            buyer_ref: "br_001".into(),
            status: MediaBuyStatus::Scheduled,
            start_time: None,
            end_time: None,
            start_date: None,
            end_date: None,
            currency: "USD".into(),
            po_number: None,
            raw_request: serde_json::json!({}),
            created_at: Utc::now(),
        };
        assert!(normalize_start(&buy).is_none());
    }
}
