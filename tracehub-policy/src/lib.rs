// crates/tracehub-policy/src/lib.rs
// ============================================================================
// Module: TraceHub Policy Engine
// Description: Evaluates a versioned rule definition against a decision
//              context, selecting the first matching rule by priority.
// Purpose: Back `POST /decide`'s policy-overlay step (§4.4 / §4.6 step 7).
// Dependencies: ret-logic, serde, serde_json, thiserror, tracehub_core::json
// ============================================================================

//! ## Overview
//! A policy's `definition` is `{ "rules": [ { priority, when, then,
//! metadata? }, ... ] }`. Rules are evaluated in ascending priority order;
//! the first whose `when` clause matches wins. A rule's `when.all` and
//! `when.any` conditions are compiled into a [`ret_logic::Requirement`] tree
//! and evaluated with plain boolean short-circuit semantics — the
//! "none-safe returns false" comparator rules are themselves boolean, not
//! three-valued, so the simpler `eval` entry point is the right fit.

use ret_logic::Requirement;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracehub_core::json::get_path;

// ============================================================================
// SECTION: Rule schema
// ============================================================================

/// A single condition: `{ field: "a.b", op: "eq", value: ... }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Condition {
    /// Dotted path into the evaluation context.
    pub field: String,
    /// Comparison operator.
    pub op: String,
    /// Value to compare the resolved field against.
    pub value: Value,
}

/// The `when` clause of a rule.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct When {
    /// Conditions that must ALL hold. Vacuously satisfied if absent/empty.
    #[serde(default)]
    pub all: Vec<Condition>,
    /// Conditions of which at least one must hold. Vacuously satisfied if
    /// absent/empty.
    #[serde(default)]
    pub any: Vec<Condition>,
}

/// The `then` clause of a rule: what to do when it matches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Then {
    /// Action to take.
    pub action: String,
    /// Reason code for the action. Defaults to `"POLICY_MATCH"`.
    #[serde(default = "default_reason_code")]
    pub reason_code: String,
    /// Severity of the action. Defaults to `"medium"`.
    #[serde(default = "default_severity")]
    pub severity: String,
}

fn default_reason_code() -> String {
    "POLICY_MATCH".to_string()
}

fn default_severity() -> String {
    "medium".to_string()
}

fn default_priority() -> i64 {
    9999
}

/// A single rule within a policy version's `definition`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Rule {
    /// Evaluation order; lower runs first. Defaults to `9999`.
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Match condition.
    #[serde(default)]
    pub when: When,
    /// Outcome if matched.
    pub then: Then,
    /// Free-form metadata, not interpreted by the engine.
    #[serde(default)]
    pub metadata: Value,
}

/// A policy version's full rule set, as stored in `PolicyVersion.definition`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PolicyDefinition {
    /// The rules, evaluated in ascending `priority` order.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// The outcome of evaluating a policy against a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResult {
    /// Whether any rule matched.
    pub matched: bool,
    /// Action to apply.
    pub action: String,
    /// Reason code to apply.
    pub reason_code: String,
    /// Severity to apply.
    pub severity: String,
}

impl PolicyResult {
    fn default_allow() -> Self {
        Self {
            matched: false,
            action: "ALLOW_ANSWER".to_string(),
            reason_code: "DEFAULT_ALLOW".to_string(),
            severity: "low".to_string(),
        }
    }
}

/// Errors raised while parsing a policy definition.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// `PolicyVersion.definition` was not a valid `PolicyDefinition`.
    #[error("invalid policy definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}

/// Parses `definition` and evaluates it against `context`, returning the
/// first matching rule (by ascending priority) or the default allow.
///
/// # Errors
/// Returns [`PolicyError`] if `definition` does not match the expected
/// `{ "rules": [...] }` shape.
pub fn evaluate(definition: &Value, context: &Value) -> Result<PolicyResult, PolicyError> {
    let mut parsed: PolicyDefinition = serde_json::from_value(definition.clone())?;
    parsed.rules.sort_by_key(|rule| rule.priority);

    for rule in &parsed.rules {
        if rule_matches(&rule.when, context) {
            return Ok(PolicyResult {
                matched: true,
                action: rule.then.action.clone(),
                reason_code: rule.then.reason_code.clone(),
                severity: rule.then.severity.clone(),
            });
        }
    }
    Ok(PolicyResult::default_allow())
}

fn rule_matches(when: &When, context: &Value) -> bool {
    let all_tree: Requirement<&Condition> =
        Requirement::And(when.all.iter().map(Requirement::Predicate).collect());
    let any_tree: Requirement<&Condition> =
        Requirement::Or(when.any.iter().map(Requirement::Predicate).collect());

    let mut resolve = |condition: &&Condition| {
        let actual = get_path(context, &condition.field);
        compare(&condition.op, actual, &condition.value)
    };

    all_tree.eval(&mut resolve) && any_tree.eval(&mut resolve)
}

// ============================================================================
// SECTION: Comparator
// ============================================================================

/// Evaluates one comparison operator against a (possibly absent) actual
/// value and an expected value from the rule. Unknown operators and
/// type-mismatched ordered comparisons both fail closed (return `false`)
/// rather than erroring.
#[must_use]
pub fn compare(op: &str, actual: Option<&Value>, expected: &Value) -> bool {
    match op {
        "eq" => actual == Some(expected),
        "ne" => actual != Some(expected),
        "lt" => compare_ordered(actual, expected, |ordering| ordering.is_lt()),
        "lte" => compare_ordered(actual, expected, |ordering| ordering.is_le()),
        "gt" => compare_ordered(actual, expected, |ordering| ordering.is_gt()),
        "gte" => compare_ordered(actual, expected, |ordering| ordering.is_ge()),
        "contains" => compare_contains(actual, expected),
        "in" => compare_in(actual, expected),
        _ => false,
    }
}

fn compare_ordered(
    actual: Option<&Value>,
    expected: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let (Some(actual), Some(expected)) = (
        actual.and_then(serde_json::Value::as_f64),
        expected.as_f64(),
    ) else {
        return false;
    };
    actual
        .partial_cmp(&expected)
        .is_some_and(accept)
}

fn compare_contains(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual_str) = actual.and_then(serde_json::Value::as_str) else {
        return false;
    };
    let expected_str = match expected {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    actual_str
        .to_lowercase()
        .contains(&expected_str.to_lowercase())
}

/// Python-style `actual in expected` membership: `expected` is treated as a
/// sequence and `actual` must equal one of its elements.
fn compare_in(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match expected {
        Value::Array(items) => items.contains(actual),
        _ => false,
    }
}
