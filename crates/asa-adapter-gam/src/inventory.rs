// SPDX-License-Identifier: MIT OR Apache-2.0
//! GAM inventory discovery.
//!
//! Each kind maps to one gateway resource. Queries always exclude archived
//! entities; kinds whose service supports `lastModified` filtering add the
//! `since` bound on incremental syncs (labels and custom targeting do not
//! support it and are fetched in full). Audience segments are restricted to
//! first-party.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use asa_adapter_core::{InventoryItem, InventoryKind};
use asa_error::AdcpResult;

use crate::client::GamClient;

/// Discover one kind of inventory, paged to exhaustion.
pub(crate) async fn discover(
    client: &GamClient,
    kind: InventoryKind,
    since: Option<DateTime<Utc>>,
) -> AdcpResult<Vec<InventoryItem>> {
    let path = match kind {
        InventoryKind::AdUnits => "inventory/ad_units",
        InventoryKind::Placements => "inventory/placements",
        InventoryKind::Labels => "inventory/labels",
        InventoryKind::CustomTargetingKeys => "custom_targeting/keys",
        InventoryKind::AudienceSegments => "audience_segments",
    };

    let mut query: Vec<(&'static str, String)> = vec![("exclude_status", "ARCHIVED".to_string())];
    if let Some(since) = since {
        query.push(("modified_since", since.to_rfc3339()));
    }
    if kind == InventoryKind::AudienceSegments {
        query.push(("segment_type", "FIRST_PARTY".to_string()));
    }

    debug!(kind = kind.as_str(), incremental = since.is_some(), "discovering GAM inventory");
    let raw = client.fetch_all_pages(path, &query).await?;
    Ok(raw.into_iter().map(convert_item).collect())
}

/// Lazy-load values for one custom targeting key.
pub(crate) async fn discover_values_for_key(
    client: &GamClient,
    key_id: &str,
    max_values: Option<usize>,
) -> AdcpResult<Vec<InventoryItem>> {
    let path = format!("custom_targeting/keys/{key_id}/values");
    let query: Vec<(&'static str, String)> = vec![("exclude_status", "ARCHIVED".to_string())];
    let mut raw = client.fetch_all_pages(&path, &query).await?;
    if let Some(limit) = max_values {
        raw.truncate(limit);
    }
    Ok(raw.into_iter().map(convert_item).collect())
}

/// Map a gateway row to the canonical item shape.
fn convert_item(raw: Value) -> InventoryItem {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| raw.get("id").and_then(Value::as_u64).map(|n| n.to_string()))
        .unwrap_or_default();
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let path = raw
        .get("parent_path")
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_else(|| vec![name.clone()]);
    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("ACTIVE")
        .to_string();
    InventoryItem {
        id,
        name,
        path,
        status,
        metadata: raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn convert_prefers_string_ids_and_keeps_metadata() {
        let item = convert_item(json!({
            "id": "123",
            "name": "Homepage",
            "status": "ACTIVE",
            "parent_path": ["Network", "Homepage"],
            "ad_unit_code": "hp"
        }));
        assert_eq!(item.id, "123");
        assert_eq!(item.path, vec!["Network", "Homepage"]);
        assert_eq!(item.metadata["ad_unit_code"], "hp");
    }

    #[test]
    fn convert_accepts_numeric_ids() {
        let item = convert_item(json!({"id": 42, "name": "n"}));
        assert_eq!(item.id, "42");
    }

    #[test]
    fn convert_defaults_path_to_name() {
        let item = convert_item(json!({"id": "1", "name": "Sports"}));
        assert_eq!(item.path, vec!["Sports"]);
        assert_eq!(item.status, "ACTIVE");
    }
}
