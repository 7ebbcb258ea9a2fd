// SPDX-License-Identifier: MIT OR Apache-2.0
//! Budget sum type and extraction.
//!
//! Buyers have sent budgets in three shapes over the protocol's life: a bare
//! number (current spec), a `{total, currency, pacing?}` object, and the
//! typed [`Budget`] model. [`BudgetInput`] admits all three so older clients
//! keep working; [`extract_budget_amount`] collapses them to
//! `(amount, currency)` and nothing downstream of the schema boundary ever
//! sees the polymorphism.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Pacing strategy for budget delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Spread spend evenly across the flight.
    Even,
    /// Spend as fast as possible.
    Asap,
    /// Weight spend toward the start of the flight.
    FrontLoaded,
}

impl Pacing {
    /// Wire string for the pacing strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Even => "even",
            Self::Asap => "asap",
            Self::FrontLoaded => "front_loaded",
        }
    }
}

/// Typed budget object (legacy request shape, still used internally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Budget {
    /// Total spend for the flight.
    pub total: f64,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Optional pacing strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing: Option<Pacing>,
}

/// A budget value as it may arrive on the wire.
///
/// Current-spec packages carry a bare number whose currency is inherited
/// from the selected pricing option; the object forms are accepted for
/// compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BudgetInput {
    /// Bare amount; currency comes from the request default.
    Amount(f64),
    /// Structured object carrying its own currency.
    Object(Budget),
}

/// Collapse a polymorphic budget value to `(amount, currency)`.
///
/// - `None` yields `(0.0, default_currency)`.
/// - A bare number yields `(number, default_currency)`.
/// - An object yields its own total and currency; the object's currency wins
///   over the request-level default.
pub fn extract_budget_amount(input: Option<&BudgetInput>, default_currency: &str) -> (f64, String) {
    match input {
        None => (0.0, default_currency.to_string()),
        Some(BudgetInput::Amount(n)) => (*n, default_currency.to_string()),
        Some(BudgetInput::Object(b)) => (b.total, b.currency.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_budget_returns_zero_and_default_currency() {
        let (amount, currency) = extract_budget_amount(None, "CAD");
        assert_eq!(amount, 0.0);
        assert_eq!(currency, "CAD");
    }

    #[test]
    fn numeric_budget_uses_default_currency() {
        let input = BudgetInput::Amount(5000.0);
        let (amount, currency) = extract_budget_amount(Some(&input), "USD");
        assert_eq!(amount, 5000.0);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn object_currency_wins_over_default() {
        let input = BudgetInput::Object(Budget {
            total: 3000.0,
            currency: "USD".into(),
            pacing: None,
        });
        let (amount, currency) = extract_budget_amount(Some(&input), "EUR");
        assert_eq!(amount, 3000.0);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn zero_budget_extracts_as_zero() {
        let input = BudgetInput::Amount(0.0);
        let (amount, currency) = extract_budget_amount(Some(&input), "USD");
        assert_eq!(amount, 0.0);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn wire_number_deserializes_to_amount() {
        let input: BudgetInput = serde_json::from_str("2500.0").unwrap();
        assert_eq!(input, BudgetInput::Amount(2500.0));
    }

    #[test]
    fn wire_object_deserializes_to_object() {
        let input: BudgetInput =
            serde_json::from_str(r#"{"total": 2500.0, "currency": "EUR"}"#).unwrap();
        let (amount, currency) = extract_budget_amount(Some(&input), "USD");
        assert_eq!(amount, 2500.0);
        assert_eq!(currency, "EUR");
    }

    #[test]
    fn pacing_omitted_when_unset() {
        let b = Budget {
            total: 100.0,
            currency: "USD".into(),
            pacing: None,
        };
        let json = serde_json::to_value(&b).unwrap();
        assert!(json.get("pacing").is_none());
    }
}
