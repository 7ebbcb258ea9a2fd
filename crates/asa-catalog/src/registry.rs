// SPDX-License-Identifier: MIT OR Apache-2.0
//! Remote format registry with per-tenant caching.
//!
//! Creative formats live in remote creative agents, addressed by
//! `(agent_url, id)`. The HTTP registry fetches specs; the caching layer
//! keeps them per tenant so one tenant's slow agent never costs another
//! tenant a fetch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use asa_core::format::{FormatId, FormatSpec};
use asa_error::{AdcpError, AdcpResult};

/// Resolves format specs from creative agents.
#[async_trait]
pub trait FormatRegistry: Send + Sync {
    /// Fetch one format spec.
    async fn resolve(&self, tenant_id: &str, format_id: &FormatId) -> AdcpResult<FormatSpec>;
}

/// Registry that fetches specs over HTTP from the owning creative agent.
pub struct HttpFormatRegistry {
    http: reqwest::Client,
}

impl Default for HttpFormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFormatRegistry {
    /// Build a registry.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl FormatRegistry for HttpFormatRegistry {
    async fn resolve(&self, _tenant_id: &str, format_id: &FormatId) -> AdcpResult<FormatSpec> {
        let url = format!(
            "{}/formats/{}",
            format_id.normalized_agent_url(),
            format_id.id
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                AdcpError::unavailable(format!("creative agent '{}' unreachable", format_id.agent_url))
                    .with_source(e)
            })?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AdcpError::not_found(format!("format '{format_id}' not found")));
        }
        if !status.is_success() {
            return Err(AdcpError::unavailable(format!(
                "creative agent returned {status} for format '{format_id}'"
            )));
        }
        response.json::<FormatSpec>().await.map_err(|e| {
            AdcpError::unavailable(format!("malformed format spec for '{format_id}'")).with_source(e)
        })
    }
}

/// Per-tenant caching wrapper over any [`FormatRegistry`].
pub struct CachingFormatRegistry<R> {
    inner: R,
    cache: Arc<RwLock<HashMap<(String, String, String), FormatSpec>>>,
}

impl<R: FormatRegistry> CachingFormatRegistry<R> {
    /// Wrap a registry with a cache.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drop every cached spec for a tenant (admin path after format edits).
    pub async fn invalidate_tenant(&self, tenant_id: &str) {
        let mut guard = self.cache.write().await;
        guard.retain(|(t, _, _), _| t != tenant_id);
    }

    fn key(tenant_id: &str, format_id: &FormatId) -> (String, String, String) {
        (
            tenant_id.to_string(),
            format_id.normalized_agent_url().to_string(),
            format_id.id.clone(),
        )
    }
}

#[async_trait]
impl<R: FormatRegistry> FormatRegistry for CachingFormatRegistry<R> {
    async fn resolve(&self, tenant_id: &str, format_id: &FormatId) -> AdcpResult<FormatSpec> {
        let key = Self::key(tenant_id, format_id);
        if let Some(spec) = self.cache.read().await.get(&key) {
            return Ok(spec.clone());
        }
        debug!(tenant_id, format = %format_id, "format cache miss");
        let spec = self.inner.resolve(tenant_id, format_id).await?;
        self.cache.write().await.insert(key, spec.clone());
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingRegistry {
        calls: AtomicU32,
    }

    #[async_trait]
    impl FormatRegistry for CountingRegistry {
        async fn resolve(&self, _tenant_id: &str, format_id: &FormatId) -> AdcpResult<FormatSpec> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(FormatSpec {
                format_id: format_id.clone(),
                name: "Display".into(),
                width: Some(300),
                height: Some(250),
                is_responsive: false,
                assets: vec![],
            })
        }
    }

    #[tokio::test]
    async fn cache_hits_skip_the_inner_registry() {
        let registry = CachingFormatRegistry::new(CountingRegistry {
            calls: AtomicU32::new(0),
        });
        let format = FormatId::new("https://formats.example", "display_300x250");

        registry.resolve("pub_a", &format).await.unwrap();
        registry.resolve("pub_a", &format).await.unwrap();
        assert_eq!(registry.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_is_per_tenant() {
        let registry = CachingFormatRegistry::new(CountingRegistry {
            calls: AtomicU32::new(0),
        });
        let format = FormatId::new("https://formats.example", "display_300x250");

        registry.resolve("pub_a", &format).await.unwrap();
        registry.resolve("pub_b", &format).await.unwrap();
        assert_eq!(registry.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn normalized_agent_urls_share_cache_entries() {
        let registry = CachingFormatRegistry::new(CountingRegistry {
            calls: AtomicU32::new(0),
        });
        registry
            .resolve("pub_a", &FormatId::new("https://formats.example/", "f"))
            .await
            .unwrap();
        registry
            .resolve("pub_a", &FormatId::new("https://formats.example", "f"))
            .await
            .unwrap();
        assert_eq!(registry.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_refetch() {
        let registry = CachingFormatRegistry::new(CountingRegistry {
            calls: AtomicU32::new(0),
        });
        let format = FormatId::new("https://formats.example", "f");
        registry.resolve("pub_a", &format).await.unwrap();
        registry.invalidate_tenant("pub_a").await;
        registry.resolve("pub_a", &format).await.unwrap();
        assert_eq!(registry.inner.calls.load(Ordering::SeqCst), 2);
    }
}
