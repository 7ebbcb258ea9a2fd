// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Media-buy and creative lifecycle engine plus the task surface.
//!
//! The [`Lifecycle`] value owns the store, the adapter registry, and the
//! format registry; every tool path takes an explicit
//! [`asa_context::RequestContext`]. Validation runs before any adapter or
//! store write, adapter calls run under timeout, and adapter failures on
//! create leave no local media-buy row.

/// Creative sync and listing.
pub mod creatives;
/// Delivery fetch shared by the tool and the webhook scheduler.
pub mod delivery;
/// Media-buy create and update.
pub mod media_buy;
/// Adapter registry.
pub mod registry;
/// Workflow task tools.
pub mod tasks;

use std::sync::Arc;

use asa_catalog::FormatRegistry;
use asa_store::Store;

pub use registry::AdapterRegistry;

/// The lifecycle engine: every synchronous tool path lives on this value,
/// and the schedulers call back into the same paths.
#[derive(Clone)]
pub struct Lifecycle {
    pub(crate) store: Store,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) formats: Arc<dyn FormatRegistry>,
}

impl Lifecycle {
    /// Build an engine.
    pub fn new(store: Store, adapters: AdapterRegistry, formats: Arc<dyn FormatRegistry>) -> Self {
        Self {
            store,
            adapters,
            formats,
        }
    }

    /// The store backing this engine.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The adapter registry backing this engine.
    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }
}
