// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Product catalog and creative-format registry.
//!
//! `get_products` serves the principal's tenant-scoped catalog. Stored
//! products that violate their own invariants (no formats, no pricing)
//! fail conversion loudly as `data_integrity_error` instead of being
//! silently filtered; a broken catalog is an operator problem, not
//! something to hide from buyers.

/// Remote format registry with per-tenant caching.
pub mod registry;

use tracing::error;

use asa_context::RequestContext;
use asa_core::{
    GetProductsRequest, GetProductsResponse, ListAuthorizedPropertiesRequest,
    ListAuthorizedPropertiesResponse, Product, ProductFilters, PublisherProperty,
};
use asa_error::{AdcpError, AdcpResult};
use asa_store::Store;

pub use registry::{CachingFormatRegistry, FormatRegistry, HttpFormatRegistry};

/// Guard a stored product's own invariants before it crosses the wire.
///
/// # Errors
///
/// `data_integrity_error` naming the product and the violated invariant.
pub fn validate_stored_product(product: &Product) -> AdcpResult<()> {
    if product.format_ids.is_empty() {
        return Err(AdcpError::data_integrity(format!(
            "product '{}' has no format_ids configured; creative compatibility cannot be validated",
            product.product_id
        ))
        .with_detail("product_id", product.product_id.clone()));
    }
    if product.pricing_options.is_empty() {
        return Err(AdcpError::data_integrity(format!(
            "product '{}' has no pricing_options configured",
            product.product_id
        ))
        .with_detail("product_id", product.product_id.clone()));
    }
    if product.publisher_properties.is_empty() {
        return Err(AdcpError::data_integrity(format!(
            "product '{}' has no publisher_properties configured",
            product.product_id
        ))
        .with_detail("product_id", product.product_id.clone()));
    }
    Ok(())
}

fn matches_filters(product: &Product, filters: &ProductFilters) -> bool {
    if let Some(delivery_type) = filters.delivery_type {
        if product.delivery_type != delivery_type {
            return false;
        }
    }
    if let Some(name_contains) = &filters.name_contains {
        if !product
            .name
            .to_lowercase()
            .contains(&name_contains.to_lowercase())
        {
            return false;
        }
    }
    true
}

/// `get_products`: the principal's catalog, filtered.
///
/// Dimension/asset-type/responsiveness filters require resolved format
/// specs and are applied by the caller once formats are fetched; the
/// structural filters are applied here.
///
/// # Errors
///
/// `data_integrity_error` when any stored product fails conversion.
pub async fn get_products(
    ctx: &RequestContext,
    store: &Store,
    request: &GetProductsRequest,
) -> AdcpResult<GetProductsResponse> {
    let mut products = Vec::new();
    for product in store.list_products(ctx.tenant_id()).await {
        if let Err(err) = validate_stored_product(&product) {
            error!(
                tenant_id = ctx.tenant_id(),
                product_id = %product.product_id,
                %err,
                "product failed conversion"
            );
            return Err(err);
        }
        let keep = request
            .filters
            .as_ref()
            .is_none_or(|filters| matches_filters(&product, filters));
        if keep {
            products.push(product);
        }
    }
    products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    Ok(GetProductsResponse { products })
}

/// `list_authorized_properties`: distinct properties across the tenant's
/// products, optionally filtered by tags.
///
/// # Errors
///
/// `data_integrity_error` when any stored product fails conversion.
pub async fn list_authorized_properties(
    ctx: &RequestContext,
    store: &Store,
    request: &ListAuthorizedPropertiesRequest,
) -> AdcpResult<ListAuthorizedPropertiesResponse> {
    let mut properties: Vec<PublisherProperty> = Vec::new();
    for product in store.list_products(ctx.tenant_id()).await {
        validate_stored_product(&product)?;
        for property in product.publisher_properties {
            if !request.tags.is_empty()
                && !request.tags.iter().all(|tag| property.tags.contains(tag))
            {
                continue;
            }
            if !properties
                .iter()
                .any(|existing| existing.name == property.name)
            {
                properties.push(property);
            }
        }
    }
    properties.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ListAuthorizedPropertiesResponse { properties })
}

#[cfg(test)]
mod tests {
    use super::*;
    use asa_core::pricing::{PricingModel, PricingOption};
    use asa_core::{DeliveryMeasurement, DeliveryType, FormatId, PropertyIdentifier};
    use asa_store::{ApprovalMode, TenantRow};
    use chrono::Utc;

    fn tenant() -> TenantRow {
        TenantRow {
            tenant_id: "pub_a".into(),
            name: "Pub A".into(),
            subdomain: "pub-a".into(),
            virtual_host: None,
            ad_server: "mock".into(),
            approval_mode: ApprovalMode::AutoApprove,
            authorized_emails: vec![],
            authorized_domains: vec![],
            auto_approve_format_ids: vec![],
            is_active: true,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::for_tool(tenant(), "buyer_1", "get_products", Utc::now())
    }

    fn product(id: &str, name: &str, delivery_type: DeliveryType) -> Product {
        Product {
            product_id: id.into(),
            name: name.into(),
            description: "d".into(),
            format_ids: vec![FormatId::new("https://formats.example", "display_300x250")],
            delivery_type,
            publisher_properties: vec![PublisherProperty {
                property_type: "website".into(),
                name: "example.com".into(),
                identifiers: vec![PropertyIdentifier {
                    id_type: "domain".into(),
                    value: "example.com".into(),
                }],
                tags: vec!["news".into()],
            }],
            pricing_options: vec![PricingOption {
                pricing_option_id: "cpm_usd_fixed".into(),
                pricing_model: PricingModel::Cpm,
                currency: "USD".into(),
                is_fixed: true,
                rate: Some(10.0),
                price_guidance: None,
                min_spend_per_package: None,
            }],
            delivery_measurement: DeliveryMeasurement {
                provider: "publisher".into(),
                notes: None,
            },
            implementation_config: None,
        }
    }

    #[tokio::test]
    async fn catalog_is_tenant_scoped_and_sorted() {
        let store = Store::new();
        store
            .upsert_product("pub_a", product("prod_b", "B", DeliveryType::Guaranteed))
            .await;
        store
            .upsert_product("pub_a", product("prod_a", "A", DeliveryType::Guaranteed))
            .await;
        store
            .upsert_product("pub_x", product("prod_x", "X", DeliveryType::Guaranteed))
            .await;

        let resp = get_products(&ctx(), &store, &GetProductsRequest::default())
            .await
            .unwrap();
        let ids: Vec<_> = resp.products.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["prod_a", "prod_b"]);
    }

    #[tokio::test]
    async fn broken_product_fails_loudly() {
        let store = Store::new();
        let mut broken = product("prod_1", "Broken", DeliveryType::Guaranteed);
        broken.format_ids.clear();
        store.upsert_product("pub_a", broken).await;

        let err = get_products(&ctx(), &store, &GetProductsRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, asa_error::ErrorCode::DataIntegrityError);
        assert!(err.message.contains("no format_ids"));
    }

    #[tokio::test]
    async fn delivery_type_filter_applies() {
        let store = Store::new();
        store
            .upsert_product("pub_a", product("prod_g", "G", DeliveryType::Guaranteed))
            .await;
        store
            .upsert_product("pub_a", product("prod_n", "N", DeliveryType::NonGuaranteed))
            .await;

        let request = GetProductsRequest {
            filters: Some(ProductFilters {
                delivery_type: Some(DeliveryType::NonGuaranteed),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resp = get_products(&ctx(), &store, &request).await.unwrap();
        assert_eq!(resp.products.len(), 1);
        assert_eq!(resp.products[0].product_id, "prod_n");
    }

    #[tokio::test]
    async fn name_filter_is_case_insensitive() {
        let store = Store::new();
        store
            .upsert_product(
                "pub_a",
                product("prod_1", "Homepage Takeover", DeliveryType::Guaranteed),
            )
            .await;

        let request = GetProductsRequest {
            filters: Some(ProductFilters {
                name_contains: Some("homepage".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resp = get_products(&ctx(), &store, &request).await.unwrap();
        assert_eq!(resp.products.len(), 1);
    }

    #[tokio::test]
    async fn properties_dedupe_and_filter_by_tag() {
        let store = Store::new();
        store
            .upsert_product("pub_a", product("prod_1", "A", DeliveryType::Guaranteed))
            .await;
        store
            .upsert_product("pub_a", product("prod_2", "B", DeliveryType::Guaranteed))
            .await;

        let resp = list_authorized_properties(
            &ctx(),
            &store,
            &ListAuthorizedPropertiesRequest::default(),
        )
        .await
        .unwrap();
        assert_eq!(resp.properties.len(), 1);

        let filtered = list_authorized_properties(
            &ctx(),
            &store,
            &ListAuthorizedPropertiesRequest {
                tags: vec!["sports".into()],
            },
        )
        .await
        .unwrap();
        assert!(filtered.properties.is_empty());
    }
}
