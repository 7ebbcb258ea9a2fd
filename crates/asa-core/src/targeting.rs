// SPDX-License-Identifier: MIT OR Apache-2.0
//! Targeting dimensions and overlay validation.
//!
//! Buyers may set `overlay` dimensions; `managed_only` dimensions carry
//! platform signals (AEE/AXE) and can only be written by the publisher
//! side. Adapters narrow the platform defaults to what their ad server
//! actually supports.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who may write a targeting dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetingAccess {
    /// Buyer-settable via the request overlay.
    Overlay,
    /// Platform-signal-only.
    ManagedOnly,
    /// Writable from either side.
    Both,
}

/// One targeting dimension's platform contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TargetingCapability {
    /// Dimension name (e.g. `"geo_country"`).
    pub dimension: String,

    /// Who may write it.
    pub access: TargetingAccess,

    /// Human description.
    pub description: String,

    /// Closed value set, where one exists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,

    /// Whether the dimension carries an AEE/AXE signal.
    #[serde(default)]
    pub axe_signal: bool,
}

/// Buyer targeting overlay: dimension → requested values.
///
/// Dimension keys may carry `_any_of`/`_none_of` suffixes; validation
/// strips the suffix before checking access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TargetingOverlay {
    /// Raw dimension map.
    pub dimensions: BTreeMap<String, serde_json::Value>,
}

impl TargetingOverlay {
    /// Base dimension names, with `_any_of`/`_none_of` suffixes stripped.
    pub fn base_dimensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dimensions.keys().map(|key| {
            let base = key
                .strip_suffix("_any_of")
                .or_else(|| key.strip_suffix("_none_of"))
                .unwrap_or(key);
            (key.as_str(), base)
        })
    }
}

fn capability(
    dimension: &str,
    access: TargetingAccess,
    description: &str,
) -> (String, TargetingCapability) {
    (
        dimension.to_string(),
        TargetingCapability {
            dimension: dimension.to_string(),
            access,
            description: description.to_string(),
            allowed_values: Vec::new(),
            axe_signal: false,
        },
    )
}

fn axe_capability(dimension: &str, description: &str) -> (String, TargetingCapability) {
    let (name, mut cap) = capability(dimension, TargetingAccess::ManagedOnly, description);
    cap.axe_signal = true;
    (name, cap)
}

/// Platform-level targeting capabilities, before adapter narrowing.
///
/// Geographic, device, content, media, audience, and frequency dimensions
/// are overlay; the AEE signal dimensions are always managed-only.
pub fn platform_capabilities() -> BTreeMap<String, TargetingCapability> {
    let mut caps = BTreeMap::new();

    for (dim, desc) in [
        ("geo_country", "Country-level targeting using ISO 3166-1 alpha-2 codes"),
        ("geo_region", "State/province targeting"),
        ("geo_metro", "Metro/DMA targeting"),
        ("geo_city", "City-level targeting"),
        ("geo_zip", "Postal code targeting"),
        ("device_make", "Device manufacturer targeting"),
        ("os", "Operating system targeting"),
        ("browser", "Browser targeting"),
        ("content_category", "IAB content category targeting"),
        ("content_language", "Content language targeting"),
        ("content_rating", "Content rating targeting"),
        ("audience_segment", "Third-party audience segments"),
        ("frequency_cap", "Impression frequency limits"),
    ] {
        let (name, cap) = capability(dim, TargetingAccess::Overlay, desc);
        caps.insert(name, cap);
    }

    let (name, mut device_type) =
        capability("device_type", TargetingAccess::Overlay, "Device type targeting");
    device_type.allowed_values = ["mobile", "desktop", "tablet", "ctv", "dooh", "audio"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    caps.insert(name, device_type);

    let (name, mut media_type) =
        capability("media_type", TargetingAccess::Overlay, "Media type targeting");
    media_type.allowed_values = ["video", "display", "native", "audio", "dooh"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    caps.insert(name, media_type);

    for (name, cap) in [
        axe_capability("key_value_pairs", "Key-value pairs for AEE signal integration"),
        axe_capability("aee_segment", "AEE-computed audience segments"),
        axe_capability("aee_score", "AEE effectiveness scores"),
        axe_capability("aee_context", "AEE contextual signals"),
    ] {
        caps.insert(name, cap);
    }

    let (name, cap) = capability(
        "custom",
        TargetingAccess::Both,
        "Platform-specific custom targeting",
    );
    caps.insert(name, cap);

    caps
}

/// Dimensions a buyer overlay may set under the given capability table.
pub fn overlay_dimensions(caps: &BTreeMap<String, TargetingCapability>) -> Vec<String> {
    caps.iter()
        .filter(|(_, c)| matches!(c.access, TargetingAccess::Overlay | TargetingAccess::Both))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Dimensions only the platform may write.
pub fn managed_only_dimensions(caps: &BTreeMap<String, TargetingCapability>) -> Vec<String> {
    caps.iter()
        .filter(|(_, c)| matches!(c.access, TargetingAccess::ManagedOnly))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Dimensions carrying AEE/AXE signals.
pub fn axe_signal_dimensions(caps: &BTreeMap<String, TargetingCapability>) -> Vec<String> {
    caps.iter()
        .filter(|(_, c)| c.axe_signal)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Validate that an overlay only uses writable dimensions.
///
/// Returns the violations (managed-only or unknown dimensions referenced by
/// the overlay). An empty vector means the overlay is acceptable.
pub fn validate_overlay(
    overlay: &TargetingOverlay,
    caps: &BTreeMap<String, TargetingCapability>,
) -> Vec<String> {
    let mut violations = Vec::new();
    for (key, base) in overlay.base_dimensions() {
        match caps.get(base) {
            Some(cap) if matches!(cap.access, TargetingAccess::Overlay | TargetingAccess::Both) => {}
            Some(_) => violations.push(format!(
                "{key} is managed-only and cannot be set via overlay"
            )),
            None => violations.push(format!("{key} is not a supported targeting dimension")),
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aee_dimensions_are_managed_only() {
        let caps = platform_capabilities();
        let managed = managed_only_dimensions(&caps);
        for dim in ["aee_segment", "aee_score", "aee_context", "key_value_pairs"] {
            assert!(managed.contains(&dim.to_string()), "{dim} should be managed-only");
        }
    }

    #[test]
    fn geo_dimensions_are_overlay() {
        let caps = platform_capabilities();
        let overlay = overlay_dimensions(&caps);
        for dim in ["geo_country", "geo_region", "geo_metro", "geo_city", "geo_zip"] {
            assert!(overlay.contains(&dim.to_string()), "{dim} should be overlay");
        }
    }

    #[test]
    fn axe_signal_dimensions_listed() {
        let caps = platform_capabilities();
        let axe = axe_signal_dimensions(&caps);
        assert_eq!(axe.len(), 4);
    }

    #[test]
    fn overlay_with_managed_dimension_is_violation() {
        let caps = platform_capabilities();
        let mut overlay = TargetingOverlay::default();
        overlay.dimensions.insert(
            "aee_segment_any_of".into(),
            serde_json::json!(["sports_fans"]),
        );
        let violations = validate_overlay(&overlay, &caps);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("managed-only"));
    }

    #[test]
    fn suffixes_are_stripped_before_lookup() {
        let caps = platform_capabilities();
        let mut overlay = TargetingOverlay::default();
        overlay
            .dimensions
            .insert("geo_country_any_of".into(), serde_json::json!(["US", "CA"]));
        overlay
            .dimensions
            .insert("geo_country_none_of".into(), serde_json::json!(["RU"]));
        assert!(validate_overlay(&overlay, &caps).is_empty());
    }

    #[test]
    fn unknown_dimension_is_violation() {
        let caps = platform_capabilities();
        let mut overlay = TargetingOverlay::default();
        overlay
            .dimensions
            .insert("shoe_size".into(), serde_json::json!([42]));
        let violations = validate_overlay(&overlay, &caps);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("not a supported"));
    }

    #[test]
    fn custom_dimension_is_writable_from_both_sides() {
        let caps = platform_capabilities();
        let mut overlay = TargetingOverlay::default();
        overlay
            .dimensions
            .insert("custom".into(), serde_json::json!({"sport": "f1"}));
        assert!(validate_overlay(&overlay, &caps).is_empty());
    }
}
