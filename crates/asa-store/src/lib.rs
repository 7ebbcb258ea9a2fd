// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tenant-scoped storage with the sales agent's persistence invariants.
//!
//! The relational mapping proper is an external collaborator; this crate is
//! the invariant-preserving API in front of it, with an in-process
//! implementation. The invariants it owns:
//!
//! - row-level tenant isolation on every table;
//! - media-buy status transitions are forward-only (pause excepted);
//! - webhook `sequence_number` is `MAX+1` per `(media_buy, task_type)`,
//!   computed under the same write guard as the insert;
//! - inventory rows are unique per `(tenant, type, inventory_id)`, bulk
//!   upserts split insert/update, and stale marking never touches ad units;
//! - media-package pricing is dual-written to typed columns and the legacy
//!   `package_config` JSON projection in one place.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Inventory tables and reconciliation.
mod inventory;
/// Media buys, packages, and creative assignments.
mod media;
/// Row types.
pub mod rows;
/// Webhook delivery log and push-notification configs.
mod webhook;
/// Workflow steps, contexts, and the audit log.
mod workflow;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use asa_core::Product;
use asa_core::creative::CreativeStatus;
use asa_error::{AdcpError, AdcpResult};

pub use inventory::BulkUpsertOutcome;
pub use media::NewMediaBuy;
pub use rows::*;
pub use workflow::StepFilters;

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) tenants: BTreeMap<String, TenantRow>,
    pub(crate) principals: BTreeMap<(String, String), PrincipalRow>,
    /// access_token → (tenant_id, principal_id). Constant-time multi-tenant
    /// token resolution.
    pub(crate) token_index: HashMap<String, (String, String)>,
    pub(crate) products: BTreeMap<(String, String), Product>,
    pub(crate) creatives: BTreeMap<(String, String), CreativeRow>,
    pub(crate) media_buys: BTreeMap<(String, String), MediaBuyRow>,
    pub(crate) packages: BTreeMap<(String, String, String), MediaPackageRow>,
    pub(crate) assignments: Vec<CreativeAssignmentRow>,
    pub(crate) contexts: BTreeMap<String, ContextRow>,
    pub(crate) steps: BTreeMap<String, WorkflowStepRow>,
    pub(crate) mappings: Vec<ObjectWorkflowMappingRow>,
    pub(crate) sync_jobs: BTreeMap<String, SyncJobRow>,
    pub(crate) inventory: BTreeMap<(String, InventoryType, String), InventoryRow>,
    pub(crate) webhook_logs: Vec<WebhookDeliveryLogRow>,
    pub(crate) next_webhook_log_id: u64,
    pub(crate) push_configs: Vec<PushNotificationConfigRow>,
    pub(crate) audit_log: Vec<AuditLogRow>,
}

/// Handle to the agent's storage. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<RwLock<Tables>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tables::default())),
        }
    }

    /// Drop every table. Testing-only escape hatch behind the debug
    /// endpoints; all clones observe the reset.
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        *guard = Tables::default();
    }

    // -- tenants ---------------------------------------------------------

    /// Insert or replace a tenant.
    pub async fn upsert_tenant(&self, tenant: TenantRow) {
        let mut guard = self.inner.write().await;
        guard.tenants.insert(tenant.tenant_id.clone(), tenant);
    }

    /// Fetch a tenant by id.
    pub async fn get_tenant(&self, tenant_id: &str) -> Option<TenantRow> {
        self.inner.read().await.tenants.get(tenant_id).cloned()
    }

    /// Fetch a tenant by exact virtual-host match.
    pub async fn find_tenant_by_virtual_host(&self, host: &str) -> Option<TenantRow> {
        let guard = self.inner.read().await;
        guard
            .tenants
            .values()
            .find(|t| t.virtual_host.as_deref() == Some(host))
            .cloned()
    }

    /// Fetch an *active* tenant by subdomain.
    pub async fn find_active_tenant_by_subdomain(&self, subdomain: &str) -> Option<TenantRow> {
        let guard = self.inner.read().await;
        guard
            .tenants
            .values()
            .find(|t| t.is_active && t.subdomain == subdomain)
            .cloned()
    }

    // -- principals -------------------------------------------------------

    /// Insert or replace a principal, keeping the token index current.
    pub async fn upsert_principal(&self, principal: PrincipalRow) {
        let mut guard = self.inner.write().await;
        let key = (principal.tenant_id.clone(), principal.principal_id.clone());
        if let Some(previous) = guard.principals.get(&key) {
            let stale_token = previous.access_token.clone();
            guard.token_index.remove(&stale_token);
        }
        guard
            .token_index
            .insert(principal.access_token.clone(), key.clone());
        guard.principals.insert(key, principal);
    }

    /// Resolve a bearer token to its principal, across all tenants.
    pub async fn find_principal_by_token(&self, token: &str) -> Option<PrincipalRow> {
        let guard = self.inner.read().await;
        let key = guard.token_index.get(token)?;
        guard.principals.get(key).cloned()
    }

    /// Fetch a principal within a tenant.
    pub async fn get_principal(
        &self,
        tenant_id: &str,
        principal_id: &str,
    ) -> Option<PrincipalRow> {
        let guard = self.inner.read().await;
        guard
            .principals
            .get(&(tenant_id.to_string(), principal_id.to_string()))
            .cloned()
    }

    // -- products ----------------------------------------------------------

    /// Insert or replace a product in the tenant catalog.
    pub async fn upsert_product(&self, tenant_id: &str, product: Product) {
        let mut guard = self.inner.write().await;
        guard
            .products
            .insert((tenant_id.to_string(), product.product_id.clone()), product);
    }

    /// Fetch a product.
    ///
    /// # Errors
    ///
    /// `not_found` when the product does not exist in this tenant.
    pub async fn get_product(&self, tenant_id: &str, product_id: &str) -> AdcpResult<Product> {
        let guard = self.inner.read().await;
        guard
            .products
            .get(&(tenant_id.to_string(), product_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdcpError::not_found(format!("product '{product_id}' not found"))
                    .with_detail("product_id", product_id)
            })
    }

    /// All products in the tenant catalog.
    pub async fn list_products(&self, tenant_id: &str) -> Vec<Product> {
        let guard = self.inner.read().await;
        guard
            .products
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    // -- creatives ----------------------------------------------------------

    /// Insert or replace a creative row. Returns `true` when a new row was
    /// created, `false` when an existing one was replaced.
    pub async fn upsert_creative(&self, row: CreativeRow) -> bool {
        let mut guard = self.inner.write().await;
        let key = (row.tenant_id.clone(), row.creative.creative_id.clone());
        guard.creatives.insert(key, row).is_none()
    }

    /// Fetch a creative row.
    pub async fn get_creative(&self, tenant_id: &str, creative_id: &str) -> Option<CreativeRow> {
        let guard = self.inner.read().await;
        guard
            .creatives
            .get(&(tenant_id.to_string(), creative_id.to_string()))
            .cloned()
    }

    /// Delete a creative from the library. Returns whether a row existed.
    pub async fn delete_creative(&self, tenant_id: &str, creative_id: &str) -> bool {
        let mut guard = self.inner.write().await;
        guard
            .creatives
            .remove(&(tenant_id.to_string(), creative_id.to_string()))
            .is_some()
    }

    /// All creative rows in the tenant library.
    pub async fn list_creatives(&self, tenant_id: &str) -> Vec<CreativeRow> {
        let guard = self.inner.read().await;
        guard
            .creatives
            .iter()
            .filter(|((t, _), _)| t == tenant_id)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Set a creative's review status.
    ///
    /// # Errors
    ///
    /// `not_found` when the creative does not exist in this tenant.
    pub async fn set_creative_status(
        &self,
        tenant_id: &str,
        creative_id: &str,
        status: CreativeStatus,
        now: DateTime<Utc>,
    ) -> AdcpResult<()> {
        let mut guard = self.inner.write().await;
        let row = guard
            .creatives
            .get_mut(&(tenant_id.to_string(), creative_id.to_string()))
            .ok_or_else(|| AdcpError::not_found(format!("creative '{creative_id}' not found")))?;
        row.status = status;
        row.updated_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantRow {
        TenantRow {
            tenant_id: id.into(),
            name: format!("Tenant {id}"),
            subdomain: id.into(),
            virtual_host: None,
            ad_server: "mock".into(),
            approval_mode: ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        }
    }

    fn principal(tenant_id: &str, id: &str, token: &str) -> PrincipalRow {
        PrincipalRow {
            principal_id: id.into(),
            tenant_id: tenant_id.into(),
            name: format!("Principal {id}"),
            access_token: token.into(),
            platform_mappings: Default::default(),
        }
    }

    #[tokio::test]
    async fn token_resolves_across_tenants() {
        let store = Store::new();
        store.upsert_tenant(tenant("pub_a")).await;
        store.upsert_tenant(tenant("pub_b")).await;
        store.upsert_principal(principal("pub_a", "buyer_1", "tok_a")).await;
        store.upsert_principal(principal("pub_b", "buyer_2", "tok_b")).await;

        let found = store.find_principal_by_token("tok_b").await.unwrap();
        assert_eq!(found.tenant_id, "pub_b");
        assert_eq!(found.principal_id, "buyer_2");
        assert!(store.find_principal_by_token("tok_x").await.is_none());
    }

    #[tokio::test]
    async fn replacing_a_principal_retires_its_old_token() {
        let store = Store::new();
        store.upsert_principal(principal("pub_a", "buyer_1", "tok_old")).await;
        store.upsert_principal(principal("pub_a", "buyer_1", "tok_new")).await;

        assert!(store.find_principal_by_token("tok_old").await.is_none());
        assert!(store.find_principal_by_token("tok_new").await.is_some());
    }

    #[tokio::test]
    async fn inactive_tenant_does_not_resolve_by_subdomain() {
        let store = Store::new();
        let mut t = tenant("pub_a");
        t.is_active = false;
        store.upsert_tenant(t).await;
        assert!(store.find_active_tenant_by_subdomain("pub_a").await.is_none());
    }

    #[tokio::test]
    async fn products_are_tenant_scoped() {
        let store = Store::new();
        let product = Product {
            product_id: "prod_1".into(),
            name: "P".into(),
            description: "d".into(),
            format_ids: vec![asa_core::FormatId::new("https://h", "f")],
            delivery_type: asa_core::DeliveryType::Guaranteed,
            publisher_properties: vec![],
            pricing_options: vec![],
            delivery_measurement: asa_core::DeliveryMeasurement {
                provider: "publisher".into(),
                notes: None,
            },
            implementation_config: None,
        };
        store.upsert_product("pub_a", product).await;

        assert!(store.get_product("pub_a", "prod_1").await.is_ok());
        let err = store.get_product("pub_b", "prod_1").await.unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::NotFound);
    }
}
