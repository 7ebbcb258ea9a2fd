// SPDX-License-Identifier: MIT OR Apache-2.0
//! Creative format identifiers and format specs.
//!
//! A format is identified by `(agent_url, id)` where `agent_url` points at
//! the creative agent that owns the spec. Agent URLs are compared after
//! right-trimming trailing slashes so `https://h/` and `https://h` name the
//! same agent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured creative format identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FormatId {
    /// URL of the creative agent that defines the format.
    pub agent_url: String,

    /// Format identifier within that agent.
    pub id: String,
}

impl FormatId {
    /// Build a format id from parts.
    pub fn new(agent_url: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            agent_url: agent_url.into(),
            id: id.into(),
        }
    }

    /// The agent URL with trailing `/` removed.
    pub fn normalized_agent_url(&self) -> &str {
        self.agent_url.trim_end_matches('/')
    }

    /// Equality under agent-URL normalization.
    pub fn matches(&self, other: &FormatId) -> bool {
        self.id == other.id && self.normalized_agent_url() == other.normalized_agent_url()
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.normalized_agent_url(), self.id)
    }
}

// ---------------------------------------------------------------------------
// Format specs
// ---------------------------------------------------------------------------

/// One asset slot a format defines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetRequirement {
    /// Asset-role name (e.g. `"banner_image"`, `"video_file"`).
    pub name: String,

    /// Asset type (`"image"`, `"video"`, `"text"`, `"url"`, …).
    pub asset_type: String,

    /// Whether a creative must supply this asset.
    #[serde(default)]
    pub required: bool,

    /// Fallback URL the format supplies when a creative omits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

/// A creative format spec fetched from a creative agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FormatSpec {
    /// The format's identifier.
    pub format_id: FormatId,

    /// Display name.
    pub name: String,

    /// Fixed width in pixels, when the format is not responsive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Fixed height in pixels, when the format is not responsive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Whether the format adapts to its container.
    #[serde(default)]
    pub is_responsive: bool,

    /// Asset slots the format defines.
    pub assets: Vec<AssetRequirement>,
}

impl FormatSpec {
    /// Asset slots a creative must fill.
    pub fn required_assets(&self) -> impl Iterator<Item = &AssetRequirement> {
        self.assets.iter().filter(|a| a.required)
    }
}
