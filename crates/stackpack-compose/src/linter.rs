//! Static policy checks over a merged compose document.
//!
//! The rule set is fixed. Service rules run in one pass over `services`,
//! the port-collision rule in one pass over host bindings, and the
//! unresolved-variable rule over the raw text. Errors make a document
//! invalid; warnings never do.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::document::{self, DEFAULT_NETWORK, NETWORKS, SERVICES, VOLUMES};
use crate::error::ComposeError;

/// Severity of a lint rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Makes the document invalid.
    Error,
    /// Reported only.
    Warning,
}

/// The fixed lint rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LintRule {
    /// Service declares `build`.
    NoBuildDirective,
    /// Service has no `image`.
    MissingImage,
    /// Image is not pinned by digest.
    ImageDigest,
    /// `depends_on` names an undeclared service.
    InvalidDependsOn,
    /// Service joins an undeclared network.
    InvalidNetwork,
    /// Service mounts an undeclared named volume.
    InvalidVolume,
    /// `privileged: true`.
    PrivilegedContainer,
    /// `cap_add` present.
    CapabilityAdd,
    /// Two or more services bind the same host port.
    PortCollision,
    /// `${NAME}` without a default.
    UnresolvedVariable,
}

impl LintRule {
    /// Stable rule identifier.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::NoBuildDirective => "no-build-directive",
            Self::MissingImage => "missing-image",
            Self::ImageDigest => "image-digest",
            Self::InvalidDependsOn => "invalid-depends-on",
            Self::InvalidNetwork => "invalid-network",
            Self::InvalidVolume => "invalid-volume",
            Self::PrivilegedContainer => "privileged-container",
            Self::CapabilityAdd => "capability-add",
            Self::PortCollision => "port-collision",
            Self::UnresolvedVariable => "unresolved-variable",
        }
    }

    /// Severity the rule reports at.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::ImageDigest
            | Self::PrivilegedContainer
            | Self::CapabilityAdd
            | Self::UnresolvedVariable => Severity::Warning,
            Self::NoBuildDirective
            | Self::MissingImage
            | Self::InvalidDependsOn
            | Self::InvalidNetwork
            | Self::InvalidVolume
            | Self::PortCollision => Severity::Error,
        }
    }
}

impl fmt::Display for LintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintIssue {
    /// Rule that fired.
    #[serde(rename = "rule_id")]
    pub rule: LintRule,
    /// Human-readable description.
    pub message: String,
    /// 1-based line in the linted text, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}] line {line}: {}", self.rule, self.message),
            None => write!(f, "[{}] {}", self.rule, self.message),
        }
    }
}

/// Outcome of linting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintResult {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Findings of error severity.
    pub errors: Vec<LintIssue>,
    /// Findings of warning severity.
    pub warnings: Vec<LintIssue>,
}

impl LintResult {
    fn push(&mut self, rule: LintRule, message: String, line: Option<usize>) {
        let issue = LintIssue {
            rule,
            message,
            line,
        };
        match rule.severity() {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    /// Iterates over issues raised by `rule`.
    pub fn issues(&self, rule: LintRule) -> impl Iterator<Item = &LintIssue> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .filter(move |issue| issue.rule == rule)
    }
}

/// Applies the fixed rule set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linter;

impl Linter {
    /// Creates a linter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Lints a compose document and returns every finding.
    ///
    /// # Errors
    ///
    /// Returns a [`ComposeError`] only when the text does not parse as a
    /// compose document. Policy violations are reported in the result.
    pub fn lint(&self, text: &str) -> Result<LintResult, ComposeError> {
        let root = document::parse("<lint input>", text)?;
        let mut result = LintResult::default();

        check_services(&root, &mut result);
        check_ports(&root, &mut result);
        check_placeholders(text, &mut result);

        result.valid = result.errors.is_empty();
        tracing::info!(
            valid = result.valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "lint complete"
        );
        Ok(result)
    }

    /// Lints a compose document and fails when any error is found.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::LintFailed`] carrying the error count, or a
    /// parse error as for [`Linter::lint`].
    pub fn lint_strict(&self, text: &str) -> Result<LintResult, ComposeError> {
        let result = self.lint(text)?;
        if result.valid {
            Ok(result)
        } else {
            Err(ComposeError::LintFailed {
                errors: result.errors.len(),
            })
        }
    }
}

fn declared(root: &Mapping, key: &str) -> HashSet<String> {
    document::entries(document::section(root, key))
        .map(|(name, _)| name.to_string())
        .collect()
}

fn check_services(root: &Mapping, result: &mut LintResult) {
    let services = declared(root, SERVICES);
    let networks = declared(root, NETWORKS);
    let volumes = declared(root, VOLUMES);

    for (name, service) in document::entries(document::section(root, SERVICES)) {
        if service.get("build").is_some() {
            result.push(
                LintRule::NoBuildDirective,
                format!("service {name} uses a build directive; only prebuilt images can be packaged"),
                None,
            );
        }

        match service.get("image") {
            None | Some(Value::Null) => result.push(
                LintRule::MissingImage,
                format!("service {name} has no image"),
                None,
            ),
            Some(Value::String(image)) if !image.contains("@sha256:") => result.push(
                LintRule::ImageDigest,
                format!("service {name} image {image} is not pinned by digest"),
                None,
            ),
            Some(Value::String(_)) => {}
            Some(other) => result.push(
                LintRule::MissingImage,
                format!(
                    "service {name} image must be an image reference string, got {}",
                    document::kind_name(other)
                ),
                None,
            ),
        }

        for dep in document::depends_on(service) {
            if !services.contains(&dep) {
                result.push(
                    LintRule::InvalidDependsOn,
                    format!("service {name} depends on undeclared service {dep}"),
                    None,
                );
            }
        }

        for network in document::networks(service) {
            if network != DEFAULT_NETWORK && !networks.contains(&network) {
                result.push(
                    LintRule::InvalidNetwork,
                    format!("service {name} joins undeclared network {network}"),
                    None,
                );
            }
        }

        for volume in document::named_volumes(service) {
            if !volumes.contains(&volume) {
                result.push(
                    LintRule::InvalidVolume,
                    format!("service {name} mounts undeclared volume {volume}"),
                    None,
                );
            }
        }

        if service.get("privileged").and_then(Value::as_bool) == Some(true) {
            result.push(
                LintRule::PrivilegedContainer,
                format!("service {name} runs privileged"),
                None,
            );
        }

        if service.get("cap_add").is_some() {
            result.push(
                LintRule::CapabilityAdd,
                format!("service {name} adds kernel capabilities"),
                None,
            );
        }
    }
}

fn check_ports(root: &Mapping, result: &mut LintResult) {
    for (port, owners) in document::host_port_bindings(document::section(root, SERVICES)) {
        if owners.len() > 1 {
            result.push(
                LintRule::PortCollision,
                format!("host port {port} is bound by {}", owners.join(", ")),
                None,
            );
        }
    }
}

fn check_placeholders(text: &str, result: &mut LintResult) {
    for placeholder in document::placeholders(text) {
        if !placeholder.has_default() {
            result.push(
                LintRule::UnresolvedVariable,
                format!("${{{}}} has no default value", placeholder.expression),
                Some(placeholder.line),
            );
        }
    }
}
