// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter registry.
//!
//! Adapters are registered once at startup; tenants select theirs via
//! their `ad_server` column.

use std::collections::BTreeMap;
use std::sync::Arc;

use asa_adapter_core::AdServerAdapter;
use asa_error::{AdcpError, AdcpResult};
use asa_store::TenantRow;

/// Registry of available ad-server adapters.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn AdServerAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under a name.
    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn AdServerAdapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    /// Fetch an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AdServerAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Registered adapter names.
    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// The adapter a tenant is configured for.
    ///
    /// # Errors
    ///
    /// `data_integrity_error` when the tenant names an unregistered
    /// adapter.
    pub fn for_tenant(&self, tenant: &TenantRow) -> AdcpResult<Arc<dyn AdServerAdapter>> {
        self.get(&tenant.ad_server).ok_or_else(|| {
            AdcpError::data_integrity(format!(
                "tenant '{}' is configured for unknown ad server '{}'",
                tenant.tenant_id, tenant.ad_server
            ))
            .with_detail("ad_server", tenant.ad_server.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_adapter_mock::MockAdapter;
    use asa_store::ApprovalMode;

    fn tenant(ad_server: &str) -> TenantRow {
        TenantRow {
            tenant_id: "pub_a".into(),
            name: "Pub".into(),
            subdomain: "pub-a".into(),
            virtual_host: None,
            ad_server: ad_server.into(),
            approval_mode: ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        }
    }

    #[test]
    fn registered_adapter_resolves_for_tenant() {
        let mut registry = AdapterRegistry::new();
        registry.register("mock", Arc::new(MockAdapter::new()));
        assert_eq!(registry.names(), vec!["mock"]);
        assert!(registry.for_tenant(&tenant("mock")).is_ok());
    }

    #[test]
    fn unknown_adapter_is_a_data_integrity_error() {
        let registry = AdapterRegistry::new();
        let err = registry.for_tenant(&tenant("gam")).unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::DataIntegrityError);
    }
}
