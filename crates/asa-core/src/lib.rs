// SPDX-License-Identifier: MIT OR Apache-2.0
//! asa-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable AdCP contract for the sales agent.
//!
//! Everything that crosses the wire lives here: request and response models,
//! the budget and start-time sum types, pricing selection, creative assets,
//! and the validators the tool layer runs before an adapter is ever
//! contacted.  Optional fields are declared with
//! `skip_serializing_if = "Option::is_none"` so unset values are omitted
//! from serialized responses rather than emitted as `null`.

/// Budget sum type and extraction.
pub mod budget;
/// Creative assets, statuses, and tracking-URL lifting.
pub mod creative;
/// Delivery reporting request/response models.
pub mod delivery;
/// Creative format identifiers and format specs.
pub mod format;
/// Media-buy lifecycle request/response models.
pub mod media_buy;
/// Pricing options, guidance, and selection.
pub mod pricing;
/// Targeting dimensions and overlay validation.
pub mod targeting;
/// Workflow task tool models.
pub mod tasks;
/// Start-time parsing and timezone-awareness checks.
pub mod time;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use budget::{Budget, BudgetInput, extract_budget_amount};
pub use creative::{Creative, CreativeAsset, CreativeStatus, DeliverySettings, TrackingUrls};
pub use format::{FormatId, FormatSpec};
pub use media_buy::{
    CreateMediaBuyRequest, CreateMediaBuyResponse, MediaBuyStatus, PackageRequest,
    UpdateMediaBuyRequest, UpdateMediaBuyResponse,
};
pub use pricing::{PriceGuidance, PricingModel, PricingOption, ResolvedPricing};
pub use time::StartTime;

/// AdCP protocol version string this agent speaks.
///
/// # Examples
///
/// ```
/// assert_eq!(asa_core::ADCP_VERSION, "2.5.0");
/// ```
pub const ADCP_VERSION: &str = "2.5.0";

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// How inventory in a product is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    /// Reserved inventory with delivery goals.
    Guaranteed,
    /// Auction or preemptible inventory.
    NonGuaranteed,
}

/// How delivered impressions are counted for billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeliveryMeasurement {
    /// Measurement provider (e.g. `"publisher"`, `"third_party"`).
    pub provider: String,

    /// Provider-specific notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A property (site, app, station) on which a product can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublisherProperty {
    /// Property type (`"website"`, `"mobile_app"`, `"radio"`, …).
    pub property_type: String,

    /// Canonical name shown to buyers.
    pub name: String,

    /// Identifiers for the property (domain, bundle id, call sign).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<PropertyIdentifier>,

    /// Tags buyers can filter on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One identifier attached to a [`PublisherProperty`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PropertyIdentifier {
    /// Identifier type (`"domain"`, `"bundle_id"`, …).
    #[serde(rename = "type")]
    pub id_type: String,
    /// Identifier value.
    pub value: String,
}

/// A sellable inventory bundle.
///
/// Conversion from storage fails loudly when `format_ids` or
/// `pricing_options` is empty; such products are a data-integrity defect,
/// not something to paper over on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Product {
    /// Opaque product identifier, unique within the tenant.
    pub product_id: String,

    /// Display name.
    pub name: String,

    /// Buyer-facing description.
    pub description: String,

    /// Creative formats this product accepts. Never empty.
    pub format_ids: Vec<FormatId>,

    /// How the inventory is sold.
    pub delivery_type: DeliveryType,

    /// Properties the product delivers on. Never empty.
    pub publisher_properties: Vec<PublisherProperty>,

    /// Pricing contracts offered for this product. Never empty.
    pub pricing_options: Vec<PricingOption>,

    /// How delivery is measured for billing.
    pub delivery_measurement: DeliveryMeasurement,

    /// Adapter-specific implementation knobs (line-item type, automation
    /// mode). Stripped from buyer-facing listings.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub implementation_config: Option<serde_json::Value>,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.product_id)
    }
}

// ---------------------------------------------------------------------------
// get_products
// ---------------------------------------------------------------------------

/// Filters accepted by `get_products`. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProductFilters {
    /// Restrict to a delivery type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_type: Option<DeliveryType>,

    /// Restrict to products accepting a creative of these dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Restrict to products accepting a creative of these dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Restrict to products whose formats require one of these asset types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asset_types: Vec<String>,

    /// Only products whose formats are responsive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_responsive: Option<bool>,

    /// Case-insensitive substring match over the product name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
}

/// `get_products` request. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetProductsRequest {
    /// Free-text campaign brief (scored by an external matcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,

    /// Brand manifest URL or inline object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_manifest: Option<serde_json::Value>,

    /// Structural filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<ProductFilters>,
}

/// `get_products` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GetProductsResponse {
    /// Products available to the calling principal.
    pub products: Vec<Product>,
}

impl fmt::Display for GetProductsResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} product(s) available", self.products.len())
    }
}

// ---------------------------------------------------------------------------
// list_authorized_properties
// ---------------------------------------------------------------------------

/// `list_authorized_properties` request. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListAuthorizedPropertiesRequest {
    /// Restrict to properties carrying all of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// `list_authorized_properties` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListAuthorizedPropertiesResponse {
    /// Distinct properties across the tenant's products.
    pub properties: Vec<PublisherProperty>,
}

impl fmt::Display for ListAuthorizedPropertiesResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} authorized propert(ies)", self.properties.len())
    }
}
