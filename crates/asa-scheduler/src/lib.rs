// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Background schedulers.
//!
//! Two cooperative singletons per process: the media-buy status scheduler
//! (per-minute) and the delivery webhook scheduler (per-hour). Both expose
//! idempotent `start`/`stop` guarded by a mutex, cancel cooperatively via
//! a running flag plus task abort, and log tick errors without dying.

/// Delivery webhook scheduler.
pub mod delivery;
/// Media-buy status scheduler.
pub mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use delivery::DeliveryWebhookScheduler;
pub use status::MediaBuyStatusScheduler;

/// Shared start/stop machinery for both schedulers.
pub(crate) struct LoopControl {
    name: &'static str,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LoopControl {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Install the loop task. Double-start warns and leaves the existing
    /// loop untouched.
    pub(crate) async fn start<F>(&self, spawn: F)
    where
        F: FnOnce(Arc<AtomicBool>) -> JoinHandle<()>,
    {
        let mut guard = self.handle.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("{} is already running", self.name);
            return;
        }
        *guard = Some(spawn(self.running.clone()));
        info!("{} started", self.name);
    }

    /// Stop the loop. In-flight work is bounded by its own timeouts; the
    /// sleeping task is aborted.
    pub(crate) async fn stop(&self) {
        let mut guard = self.handle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = guard.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("{} stopped", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn start_is_idempotent_and_stop_cancels() {
        let control = LoopControl::new("test scheduler");
        assert!(!control.is_running());

        control
            .start(|running| {
                tokio::spawn(async move {
                    while running.load(Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                })
            })
            .await;
        assert!(control.is_running());

        // Second start is a warning, not an error, and spawns nothing new.
        control
            .start(|_| tokio::spawn(async { panic!("must not spawn on double-start") }))
            .await;
        assert!(control.is_running());

        control.stop().await;
        assert!(!control.is_running());

        // Stop twice is fine.
        control.stop().await;
    }
}
