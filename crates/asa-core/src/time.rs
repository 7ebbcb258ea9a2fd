// SPDX-License-Identifier: MIT OR Apache-2.0
//! Start-time parsing and timezone-awareness checks.
//!
//! Every datetime the protocol exposes must carry an explicit UTC offset.
//! `start_time` additionally admits the literal `"asap"`, meaning "as soon
//! as the buy is activatable".

use chrono::{DateTime, FixedOffset, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use asa_error::{AdcpError, AdcpResult};

/// A campaign start instant: a timezone-aware datetime or `"asap"`.
#[derive(Debug, Clone, Copy, PartialEq, JsonSchema)]
pub enum StartTime {
    /// Start as soon as the buy can be activated.
    Asap,
    /// Start at a fixed, timezone-aware instant.
    At(DateTime<FixedOffset>),
}

impl StartTime {
    /// The concrete start instant, substituting `now` for `"asap"`.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Asap => now,
            Self::At(dt) => dt.with_timezone(&Utc),
        }
    }

    /// Whether this start is the `"asap"` literal.
    pub fn is_asap(&self) -> bool {
        matches!(self, Self::Asap)
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asap => f.write_str("asap"),
            Self::At(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl Serialize for StartTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Asap => serializer.serialize_str("asap"),
            Self::At(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        }
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "asap" {
            return Ok(Self::Asap);
        }
        parse_aware_datetime(&raw).map(Self::At).map_err(|e| {
            serde::de::Error::custom(format!("start_time: {}", e.message))
        })
    }
}

/// Parse an RFC 3339 datetime, rejecting naive (offset-less) values.
///
/// # Errors
///
/// Returns a `validation_error` when the string is not RFC 3339 or carries
/// no UTC offset.
pub fn parse_aware_datetime(raw: &str) -> AdcpResult<DateTime<FixedOffset>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Ok(dt),
        Err(_) => Err(AdcpError::validation(format!(
            "datetime '{raw}' must be timezone-aware (RFC 3339 with explicit offset)"
        ))),
    }
}
