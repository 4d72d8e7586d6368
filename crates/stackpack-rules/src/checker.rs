//! Dependency rule evaluation.
//!
//! Rules are evaluated in input order and every violation is collected;
//! a rule never aborts evaluation of the rules after it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::value::{is_empty, lookup};

/// Kind of a dependency rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    /// Condition true ⇒ target must be non-empty.
    Requires,
    /// Condition true ⇒ target must be empty.
    Conflicts,
    /// Accepted and carried, never evaluated.
    Cascades,
    /// Any other kind string; reported as a validation error.
    Unknown(String),
}

impl RuleKind {
    /// Kind name as written in rule declarations.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Requires => "requires",
            Self::Conflicts => "conflicts",
            Self::Cascades => "cascades",
            Self::Unknown(kind) => kind,
        }
    }
}

impl From<String> for RuleKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "requires" => Self::Requires,
            "conflicts" => Self::Conflicts,
            "cascades" => Self::Cascades,
            _ => Self::Unknown(kind),
        }
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared dependency rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    /// Rule kind.
    #[serde(rename = "type")]
    pub kind: RuleKind,
    /// Field the rule is declared on; used in default messages.
    pub field: String,
    /// Condition gating the rule. Empty means always.
    #[serde(default)]
    pub condition: String,
    /// Field the rule constrains.
    pub target: String,
    /// Message overriding the generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DependencyRule {
    /// Creates a `requires` rule.
    #[must_use]
    pub fn requires(
        field: impl Into<String>,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Requires,
            field: field.into(),
            condition: condition.into(),
            target: target.into(),
            message: None,
        }
    }

    /// Creates a `conflicts` rule.
    #[must_use]
    pub fn conflicts(
        field: impl Into<String>,
        condition: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind: RuleKind::Conflicts,
            ..Self::requires(field, condition, target)
        }
    }

    /// Replaces the generated message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn message_or(&self, default: impl FnOnce() -> String) -> String {
        self.message.clone().unwrap_or_else(default)
    }
}

/// A rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field the violation is reported against.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Kind of the rule that produced it.
    pub rule_kind: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.rule_kind)
    }
}

/// Evaluates dependency rules against a variable tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyChecker;

impl DependencyChecker {
    /// Creates a checker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates every rule and returns all violations in rule order.
    #[must_use]
    pub fn check(&self, rules: &[DependencyRule], vars: &Value) -> Vec<ValidationError> {
        tracing::debug!(rules = rules.len(), "evaluating dependency rules");
        let errors: Vec<ValidationError> = rules
            .iter()
            .filter_map(|rule| Self::check_rule(rule, vars))
            .collect();
        if !errors.is_empty() {
            tracing::info!(violations = errors.len(), "dependency rules violated");
        }
        errors
    }

    fn check_rule(rule: &DependencyRule, vars: &Value) -> Option<ValidationError> {
        let violation = |field: &str, message: String| ValidationError {
            field: field.to_string(),
            message,
            rule_kind: rule.kind.to_string(),
        };

        let expects_empty = match &rule.kind {
            RuleKind::Requires => false,
            RuleKind::Conflicts => true,
            RuleKind::Cascades => return None,
            RuleKind::Unknown(kind) => {
                return Some(violation(
                    &rule.field,
                    format!("unknown dependency rule type \"{kind}\""),
                ));
            }
        };

        let triggered = match Condition::parse(&rule.condition)
            .and_then(|condition| condition.evaluate(vars))
        {
            Ok(triggered) => triggered,
            Err(e) => return Some(violation(&rule.field, e.to_string())),
        };
        if !triggered {
            return None;
        }

        let target_empty = is_empty(lookup(vars, &rule.target));
        match (expects_empty, target_empty) {
            (false, true) => Some(violation(
                &rule.target,
                rule.message_or(|| format!("{} requires {} to be set", rule.field, rule.target)),
            )),
            (true, false) => Some(violation(
                &rule.target,
                rule.message_or(|| format!("{} conflicts with {}", rule.field, rule.target)),
            )),
            _ => None,
        }
    }
}
