// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-derived runtime settings for the sales agent.
//!
//! Every variable is parsed through helpers that treat an *empty string* the
//! same as "unset": container orchestration frequently materialises
//! `VAR=""` for undeclared values, and a bare `parse()` on that crashes the
//! process at startup. Centralising the rule here keeps that failure mode
//! out of the schedulers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use tracing::warn;

/// Variable controlling the media-buy status scheduler cadence (seconds).
pub const MEDIA_BUY_STATUS_CHECK_INTERVAL: &str = "MEDIA_BUY_STATUS_CHECK_INTERVAL";

/// Variable controlling the delivery webhook scheduler cadence (seconds).
pub const DELIVERY_WEBHOOK_INTERVAL: &str = "DELIVERY_WEBHOOK_INTERVAL";

/// Variable gating unified mode (task tools + admin routes). Defaults on.
pub const ADCP_UNIFIED_MODE: &str = "ADCP_UNIFIED_MODE";

/// Variable gating testing-only debug endpoints. Defaults off.
pub const ADCP_TESTING: &str = "ADCP_TESTING";

/// Default status scheduler cadence.
pub const DEFAULT_STATUS_CHECK_INTERVAL_SECS: u64 = 60;

/// Default delivery webhook scheduler cadence.
pub const DEFAULT_DELIVERY_WEBHOOK_INTERVAL_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Read an integer variable, treating unset and empty string as `default`.
///
/// A non-numeric value logs a warning and falls back to the default rather
/// than failing startup.
pub fn env_u64_or(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Err(_) => default,
        Ok(raw) if raw.trim().is_empty() => default,
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(var = name, value = %raw, default, "unparseable integer env var, using default");
                default
            }
        },
    }
}

/// Read a boolean flag.
///
/// Unset and empty string yield `default`. `"false"`, `"0"`, and `"no"`
/// (case-insensitive) are false; everything else is true.
pub fn env_flag_or(name: &str, default: bool) -> bool {
    match env::var(name) {
        Err(_) => default,
        Ok(raw) if raw.trim().is_empty() => default,
        Ok(raw) => !matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "no"
        ),
    }
}

/// Read a string variable, treating empty string as unset.
pub fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Err(_) => None,
        Ok(raw) if raw.trim().is_empty() => None,
        Ok(raw) => Some(raw),
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A scheduler interval is short enough to hammer the store.
    ShortInterval {
        /// Variable name.
        var: &'static str,
        /// Configured value in seconds.
        secs: u64,
    },
    /// Testing mode is enabled; debug endpoints are reachable.
    TestingModeEnabled,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::ShortInterval { var, secs } => {
                write!(f, "{var}={secs}s is unusually short for a production deployment")
            }
            ConfigWarning::TestingModeEnabled => {
                write!(f, "{ADCP_TESTING} is enabled — debug endpoints are exposed")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for the sales agent process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Media-buy status scheduler cadence in seconds.
    pub status_check_interval_secs: u64,

    /// Delivery webhook scheduler cadence in seconds.
    pub delivery_webhook_interval_secs: u64,

    /// Whether unified mode (task tools + admin routes) is registered.
    pub unified_mode: bool,

    /// Whether testing-only debug endpoints are reachable.
    pub testing_mode: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            status_check_interval_secs: DEFAULT_STATUS_CHECK_INTERVAL_SECS,
            delivery_webhook_interval_secs: DEFAULT_DELIVERY_WEBHOOK_INTERVAL_SECS,
            unified_mode: true,
            testing_mode: false,
        }
    }
}

impl AgentConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            status_check_interval_secs: env_u64_or(
                MEDIA_BUY_STATUS_CHECK_INTERVAL,
                DEFAULT_STATUS_CHECK_INTERVAL_SECS,
            ),
            delivery_webhook_interval_secs: env_u64_or(
                DELIVERY_WEBHOOK_INTERVAL,
                DEFAULT_DELIVERY_WEBHOOK_INTERVAL_SECS,
            ),
            unified_mode: env_flag_or(ADCP_UNIFIED_MODE, true),
            testing_mode: env_flag_or(ADCP_TESTING, false),
        }
    }

    /// Advisory warnings about the current settings.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut out = Vec::new();
        if self.status_check_interval_secs < 5 {
            out.push(ConfigWarning::ShortInterval {
                var: MEDIA_BUY_STATUS_CHECK_INTERVAL,
                secs: self.status_check_interval_secs,
            });
        }
        if self.delivery_webhook_interval_secs < 60 {
            out.push(ConfigWarning::ShortInterval {
                var: DELIVERY_WEBHOOK_INTERVAL,
                secs: self.delivery_webhook_interval_secs,
            });
        }
        if self.testing_mode {
            out.push(ConfigWarning::TestingModeEnabled);
        }
        out
    }
}
