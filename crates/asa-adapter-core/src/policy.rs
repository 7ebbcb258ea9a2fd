// SPDX-License-Identifier: MIT OR Apache-2.0
//! Line-item automation policy.
//!
//! Products declare their platform line-item type and how non-guaranteed
//! orders may be automated. An order activates immediately only when the
//! type is non-guaranteed AND automation is `automatic`; every other
//! combination goes through a human confirmation workflow step.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform line-item type, from the product's implementation config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemType {
    /// Guaranteed, standard priority.
    #[default]
    Standard,
    /// Guaranteed, roadblock/sponsorship.
    Sponsorship,
    /// Non-guaranteed network.
    Network,
    /// Non-guaranteed house.
    House,
    /// Non-guaranteed price priority.
    PricePriority,
    /// Non-guaranteed bulk.
    Bulk,
}

impl LineItemType {
    /// Whether the type is a guaranteed delivery commitment.
    pub fn is_guaranteed(&self) -> bool {
        matches!(self, Self::Standard | Self::Sponsorship)
    }

    /// Parse from the implementation-config string, defaulting to
    /// [`LineItemType::Standard`] for unknown values.
    pub fn from_config(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_uppercase).as_deref() {
            Some("SPONSORSHIP") => Self::Sponsorship,
            Some("NETWORK") => Self::Network,
            Some("HOUSE") => Self::House,
            Some("PRICE_PRIORITY") => Self::PricePriority,
            Some("BULK") => Self::Bulk,
            _ => Self::Standard,
        }
    }
}

impl fmt::Display for LineItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standard => "STANDARD",
            Self::Sponsorship => "SPONSORSHIP",
            Self::Network => "NETWORK",
            Self::House => "HOUSE",
            Self::PricePriority => "PRICE_PRIORITY",
            Self::Bulk => "BULK",
        };
        f.write_str(s)
    }
}

/// How far non-guaranteed order activation may be automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NonGuaranteedAutomation {
    /// Activate without human involvement.
    Automatic,
    /// Create the order, then wait for a confirmation step.
    #[default]
    ConfirmationRequired,
    /// Fully manual handling.
    Manual,
}

impl NonGuaranteedAutomation {
    /// Parse from the implementation-config string, defaulting to
    /// [`NonGuaranteedAutomation::ConfirmationRequired`].
    pub fn from_config(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("automatic") => Self::Automatic,
            Some("manual") => Self::Manual,
            _ => Self::ConfirmationRequired,
        }
    }
}

/// What to do with a freshly created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationDecision {
    /// Activate the order immediately.
    ActivateNow,
    /// Park the order behind a human confirmation step.
    RequireConfirmation,
}

/// Decide activation for one package.
pub fn activation_decision(
    line_item_type: LineItemType,
    automation: NonGuaranteedAutomation,
) -> ActivationDecision {
    if !line_item_type.is_guaranteed() && automation == NonGuaranteedAutomation::Automatic {
        ActivationDecision::ActivateNow
    } else {
        ActivationDecision::RequireConfirmation
    }
}
