// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tenant and principal resolution plus the per-request context.
//!
//! There is no ambient "current tenant" anywhere in this agent. Resolution
//! happens once at the transport boundary, produces a [`RequestContext`]
//! value, and that value is threaded explicitly into every handler and
//! scheduler step. Schedulers synthesize the same context shape, with
//! [`TestingContext::dry_run`] set when they run simulations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use asa_error::{AdcpError, AdcpResult};
use asa_store::{PrincipalRow, Store, TenantRow};

/// Subdomains that can never resolve to a tenant.
const RESERVED_SUBDOMAINS: &[&str] = &["localhost", "www", "admin", "sales-agent", "adcp-sales-agent"];

/// Per-request testing switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestingContext {
    /// Log intended external effects instead of performing them.
    pub dry_run: bool,
}

/// The explicit per-request context threaded through every tool path.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Conversation/workflow context id.
    pub context_id: String,
    /// The resolved tenant.
    pub tenant: TenantRow,
    /// The authenticated principal.
    pub principal_id: String,
    /// The tool being invoked.
    pub tool_name: String,
    /// When the request arrived.
    pub request_timestamp: DateTime<Utc>,
    /// Testing switches.
    pub testing: TestingContext,
}

impl RequestContext {
    /// Context for a synchronous tool invocation.
    pub fn for_tool(
        tenant: TenantRow,
        principal_id: impl Into<String>,
        tool_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
            tenant,
            principal_id: principal_id.into(),
            tool_name: tool_name.into(),
            request_timestamp: now,
            testing: TestingContext::default(),
        }
    }

    /// Context synthesized by a scheduler on behalf of a stored media buy.
    pub fn for_scheduler(
        tenant: TenantRow,
        principal_id: impl Into<String>,
        tool_name: impl Into<String>,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
            tenant,
            principal_id: principal_id.into(),
            tool_name: tool_name.into(),
            request_timestamp: now,
            testing: TestingContext { dry_run },
        }
    }

    /// Shorthand for the tenant id.
    pub fn tenant_id(&self) -> &str {
        &self.tenant.tenant_id
    }
}

/// Transport headers relevant to tenant resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolutionHeaders<'a> {
    /// `apx-incoming-host`: virtual host set by the fronting domain mapper.
    pub virtual_host: Option<&'a str>,
    /// Standard `Host` header.
    pub host: Option<&'a str>,
    /// Explicit `x-adcp-tenant` tag.
    pub tenant_tag: Option<&'a str>,
}

/// Resolve the calling tenant from transport headers.
///
/// Order: (1) exact virtual-host match; (2) `Host` subdomain match against
/// an active tenant, skipping reserved subdomains; (3) the explicit tenant
/// tag.
///
/// # Errors
///
/// `authentication_error` when no strategy yields a tenant.
pub async fn resolve_tenant(
    store: &Store,
    headers: &ResolutionHeaders<'_>,
) -> AdcpResult<TenantRow> {
    if let Some(virtual_host) = headers.virtual_host {
        if let Some(tenant) = store.find_tenant_by_virtual_host(virtual_host).await {
            return Ok(tenant);
        }
    }

    if let Some(host) = headers.host {
        if let Some(subdomain) = extract_subdomain(host) {
            if !RESERVED_SUBDOMAINS.contains(&subdomain) {
                if let Some(tenant) = store.find_active_tenant_by_subdomain(subdomain).await {
                    return Ok(tenant);
                }
            }
        }
    }

    if let Some(tag) = headers.tenant_tag {
        if let Some(tenant) = store.get_tenant(tag).await {
            return Ok(tenant);
        }
    }

    Err(AdcpError::authentication(
        "no tenant context available; check host headers and x-adcp-tenant",
    ))
}

/// Authenticate a bearer token against the resolved tenant.
///
/// The token index is flat across tenants; a token that resolves to a
/// different tenant than the headers did is rejected rather than silently
/// switching tenants.
///
/// # Errors
///
/// `authentication_error` for unknown tokens or cross-tenant tokens.
pub async fn authenticate_principal(
    store: &Store,
    tenant: &TenantRow,
    bearer_token: Option<&str>,
) -> AdcpResult<PrincipalRow> {
    let token = bearer_token
        .ok_or_else(|| AdcpError::authentication("missing x-adcp-auth bearer token"))?;

    let principal = store
        .find_principal_by_token(token)
        .await
        .ok_or_else(|| AdcpError::authentication("invalid x-adcp-auth bearer token"))?;

    if principal.tenant_id != tenant.tenant_id {
        return Err(AdcpError::authentication(
            "token does not belong to the resolved tenant",
        ));
    }

    Ok(principal)
}

/// The leftmost DNS label of a host, when the host has more than one label.
fn extract_subdomain(host: &str) -> Option<&str> {
    let host = host.split(':').next().unwrap_or(host);
    let mut labels = host.split('.');
    let first = labels.next()?;
    labels.next().map(|_| first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_store::ApprovalMode;

    fn tenant(id: &str, subdomain: &str, virtual_host: Option<&str>) -> TenantRow {
        TenantRow {
            tenant_id: id.into(),
            name: format!("Tenant {id}"),
            subdomain: subdomain.into(),
            virtual_host: virtual_host.map(String::from),
            ad_server: "mock".into(),
            approval_mode: ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        }
    }

    fn principal(tenant_id: &str, token: &str) -> PrincipalRow {
        PrincipalRow {
            principal_id: "buyer_1".into(),
            tenant_id: tenant_id.into(),
            name: "Buyer".into(),
            access_token: token.into(),
            platform_mappings: Default::default(),
        }
    }

    #[tokio::test]
    async fn virtual_host_wins_over_subdomain() {
        let store = Store::new();
        store
            .upsert_tenant(tenant("pub_a", "pub-a", Some("ads.acme.example")))
            .await;
        store.upsert_tenant(tenant("pub_b", "pub-b", None)).await;

        let headers = ResolutionHeaders {
            virtual_host: Some("ads.acme.example"),
            host: Some("pub-b.sales.example"),
            tenant_tag: None,
        };
        let resolved = resolve_tenant(&store, &headers).await.unwrap();
        assert_eq!(resolved.tenant_id, "pub_a");
    }

    #[tokio::test]
    async fn subdomain_resolution_skips_reserved_names() {
        let store = Store::new();
        store.upsert_tenant(tenant("www", "www", None)).await;

        let headers = ResolutionHeaders {
            host: Some("www.sales.example"),
            ..Default::default()
        };
        assert!(resolve_tenant(&store, &headers).await.is_err());
    }

    #[tokio::test]
    async fn bare_host_has_no_subdomain() {
        let store = Store::new();
        store.upsert_tenant(tenant("pub_a", "localhost", None)).await;
        let headers = ResolutionHeaders {
            host: Some("localhost:8080"),
            ..Default::default()
        };
        assert!(resolve_tenant(&store, &headers).await.is_err());
    }

    #[tokio::test]
    async fn tenant_tag_is_the_last_resort() {
        let store = Store::new();
        store.upsert_tenant(tenant("pub_a", "pub-a", None)).await;

        let headers = ResolutionHeaders {
            host: Some("unknown.sales.example"),
            tenant_tag: Some("pub_a"),
            ..Default::default()
        };
        let resolved = resolve_tenant(&store, &headers).await.unwrap();
        assert_eq!(resolved.tenant_id, "pub_a");
    }

    #[tokio::test]
    async fn missing_token_is_authentication_error() {
        let store = Store::new();
        let t = tenant("pub_a", "pub-a", None);
        let err = authenticate_principal(&store, &t, None).await.unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::AuthenticationError);
    }

    #[tokio::test]
    async fn cross_tenant_token_is_rejected() {
        let store = Store::new();
        store.upsert_tenant(tenant("pub_a", "pub-a", None)).await;
        store.upsert_tenant(tenant("pub_b", "pub-b", None)).await;
        store.upsert_principal(principal("pub_b", "tok_b")).await;

        let t = tenant("pub_a", "pub-a", None);
        let err = authenticate_principal(&store, &t, Some("tok_b"))
            .await
            .unwrap_err();
        assert!(err.message.contains("does not belong"));
    }

    #[tokio::test]
    async fn valid_token_resolves_principal() {
        let store = Store::new();
        store.upsert_tenant(tenant("pub_a", "pub-a", None)).await;
        store.upsert_principal(principal("pub_a", "tok_a")).await;

        let t = tenant("pub_a", "pub-a", None);
        let p = authenticate_principal(&store, &t, Some("tok_a")).await.unwrap();
        assert_eq!(p.principal_id, "buyer_1");
    }

    #[test]
    fn scheduler_context_carries_dry_run() {
        let ctx = RequestContext::for_scheduler(
            tenant("pub_a", "pub-a", None),
            "buyer_1",
            "get_media_buy_delivery",
            Utc::now(),
            true,
        );
        assert!(ctx.testing.dry_run);
        assert_eq!(ctx.tenant_id(), "pub_a");
    }
}
