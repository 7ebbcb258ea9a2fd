// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable wire codes for the AdCP sales agent.
//!
//! Every agent error carries an [`ErrorCode`] (a machine-readable, stable
//! snake_case tag defined by the AdCP protocol), a human-readable message,
//! an optional cause chain, and arbitrary key-value detail.  Use the builder
//! returned by [`AdcpError::new`] to construct errors fluently, or the
//! per-code shorthands ([`AdcpError::validation`] and friends).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Token/principal resolution failures.
    Auth,
    /// The request itself violates the schema or a business rule.
    Request,
    /// Stored state violates an invariant, or a referenced entity is missing.
    Data,
    /// A downstream dependency (ad server, registry, store) failed.
    Upstream,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::Request => "request",
            Self::Data => "data",
            Self::Upstream => "upstream",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to the exact `snake_case` string the AdCP wire
/// protocol defines; these strings never change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Bearer token missing/invalid, or no principal for the tenant.
    AuthenticationError,
    /// Schema or business-rule violation in the request.
    ValidationError,
    /// A stored entity violates an invariant (e.g. product with no
    /// pricing_options).
    DataIntegrityError,
    /// A referenced entity does not exist in this tenant.
    NotFound,
    /// Malformed oneOf or conflicting fields at the transport boundary.
    InvalidRequest,
    /// The upstream ad server reported an error.
    AdapterError,
    /// An operation exceeded its timeout budget.
    TimeoutError,
    /// A downstream dependency is temporarily unreachable.
    Unavailable,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationError => ErrorCategory::Auth,

            Self::ValidationError | Self::InvalidRequest => ErrorCategory::Request,

            Self::DataIntegrityError | Self::NotFound => ErrorCategory::Data,

            Self::AdapterError | Self::TimeoutError | Self::Unavailable => ErrorCategory::Upstream,
        }
    }

    /// Stable `&'static str` wire representation (e.g. `"validation_error"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication_error",
            Self::ValidationError => "validation_error",
            Self::DataIntegrityError => "data_integrity_error",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::AdapterError => "adapter_error",
            Self::TimeoutError => "timeout_error",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether an operation failing with this code may be retried safely.
    ///
    /// Only timeouts and transient unavailability qualify; adapter errors are
    /// never auto-retried at the tool layer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TimeoutError | Self::Unavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AdcpError
// ---------------------------------------------------------------------------

/// Unified agent error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured detail that is
/// preserved onto the wire `details` object.
///
/// # Builder usage
///
/// ```
/// use asa_error::{AdcpError, ErrorCode};
///
/// let err = AdcpError::new(ErrorCode::TimeoutError, "adapter timed out after 300 s")
///     .with_detail("adapter", "google_ad_manager")
///     .with_detail("timeout_secs", 300);
/// ```
pub struct AdcpError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Structured detail carried to the wire `details` object.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl AdcpError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            details: BTreeMap::new(),
        }
    }

    /// Shorthand for an [`ErrorCode::AuthenticationError`].
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationError, message)
    }

    /// Shorthand for an [`ErrorCode::ValidationError`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Shorthand for an [`ErrorCode::DataIntegrityError`].
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataIntegrityError, message)
    }

    /// Shorthand for an [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for an [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Shorthand for an [`ErrorCode::AdapterError`].
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AdapterError, message)
    }

    /// Shorthand for an [`ErrorCode::TimeoutError`].
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TimeoutError, message)
    }

    /// Shorthand for an [`ErrorCode::Unavailable`].
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    /// Attach a key-value pair to the structured detail.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Wire projection of this error.
    pub fn to_object(&self) -> ErrorObject {
        ErrorObject::from(self)
    }
}

impl fmt::Debug for AdcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("AdcpError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.details.is_empty() {
            d.field("details", &self.details);
        }
        d.finish()
    }
}

impl fmt::Display for AdcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.details.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(d) = serde_json::to_string(&self.details) {
                write!(f, " {d}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AdcpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Wire projection
// ---------------------------------------------------------------------------

/// The `{code, message, details?}` object AdCP responses carry in their
/// `errors` arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorObject {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured detail; omitted from the wire when empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl From<&AdcpError> for ErrorObject {
    fn from(err: &AdcpError) -> Self {
        let mut details = err.details.clone();
        if let Some(src) = &err.source {
            details
                .entry("cause".to_string())
                .or_insert_with(|| serde_json::Value::String(src.to_string()));
        }
        Self {
            code: err.code,
            message: err.message.clone(),
            details,
        }
    }
}

impl From<AdcpError> for ErrorObject {
    fn from(err: AdcpError) -> Self {
        Self::from(&err)
    }
}

/// Convenience alias used throughout the agent.
pub type AdcpResult<T> = Result<T, AdcpError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
