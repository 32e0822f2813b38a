//! Failure classification.
//!
//! Revert reasons are human-readable text. They are mapped into a closed set of
//! security outcomes by an ordered phrase table: the first rule whose pattern
//! occurs in the text decides the category, and text no rule matches is
//! [`FailureCategory::Unclassified`]. New defense phrases are added as table
//! rows, never as control flow.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Security-relevant outcome of a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Sender is not an admitted participant (impersonation)
    AccessDenied,
    /// Report timestamp fell outside the freshness window
    ReplayRejected,
    /// Report timestamp lies ahead of the ledger clock
    FutureTimestampRejected,
    /// Non-authority attempted to admit a participant
    AuthorityOnlyViolation,
    /// The node cannot execute the registry at all; never a security outcome
    EnvironmentIncompatible,
    /// Any other failure text
    Unclassified,
}

impl FailureCategory {
    /// Short description of the defense that produced the category
    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::AccessDenied => "Impersonation (not authorized)",
            FailureCategory::ReplayRejected => "Replay attack (stale timestamp)",
            FailureCategory::FutureTimestampRejected => "Time sync error (future timestamp)",
            FailureCategory::AuthorityOnlyViolation => "Sybil defense (only authority can register)",
            FailureCategory::EnvironmentIncompatible => "Incompatible execution environment",
            FailureCategory::Unclassified => "Unclassified failure",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Known defense phrases, in match order
pub const KNOWN_DEFENSES: &[(&str, FailureCategory)] = &[
    ("Access Denied", FailureCategory::AccessDenied),
    ("Replay Attack", FailureCategory::ReplayRejected),
    ("Future time", FailureCategory::FutureTimestampRejected),
    ("Only Traffic Authority", FailureCategory::AuthorityOnlyViolation),
];

/// Phrases meaning the node could not run the registry's bytecode
pub const ENVIRONMENT_FAILURES: &[&str] = &["invalid opcode"];

/// One row of the classification table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefenseRule {
    pub pattern: Cow<'static, str>,
    pub category: FailureCategory,
}

/// Ordered, extensible phrase table
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    rules: Vec<DefenseRule>,
    environment_patterns: Vec<Cow<'static, str>>,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            rules: KNOWN_DEFENSES
                .iter()
                .map(|(pattern, category)| DefenseRule {
                    pattern: Cow::Borrowed(*pattern),
                    category: *category,
                })
                .collect(),
            environment_patterns: ENVIRONMENT_FAILURES.iter().map(|p| Cow::Borrowed(*p)).collect(),
        }
    }
}

impl FailureClassifier {
    /// Classifier with no rules; everything is unclassified
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            environment_patterns: Vec::new(),
        }
    }

    /// Append a rule after all existing ones
    pub fn with_rule(mut self, pattern: impl Into<Cow<'static, str>>, category: FailureCategory) -> Self {
        self.rules.push(DefenseRule {
            pattern: pattern.into(),
            category,
        });
        self
    }

    /// Append an execution-environment failure phrase
    pub fn with_environment_pattern(mut self, pattern: impl Into<Cow<'static, str>>) -> Self {
        self.environment_patterns.push(pattern.into());
        self
    }

    pub fn rules(&self) -> &[DefenseRule] {
        &self.rules
    }

    /// Map failure text to a category; first matching rule wins
    pub fn classify(&self, reason: &str) -> FailureCategory {
        self.rules
            .iter()
            .find(|rule| reason.contains(&*rule.pattern))
            .map_or(FailureCategory::Unclassified, |rule| rule.category)
    }

    /// Whether the text reports an execution-environment mismatch
    pub fn is_environment_incompatible(&self, reason: &str) -> bool {
        self.environment_patterns
            .iter()
            .any(|pattern| reason.contains(&**pattern))
    }
}

/// Classify against the built-in defense table
pub fn classify(reason: &str) -> FailureCategory {
    FailureClassifier::default().classify(reason)
}

/// Strip node boilerplate ahead of a revert reason
///
/// `"VM Exception while processing transaction: revert Access Denied"` becomes
/// `"Access Denied"`. Text without a revert marker is returned trimmed.
pub fn extract_revert_reason(message: &str) -> &str {
    const MARKERS: &[&str] = &["execution reverted:", "revert "];

    MARKERS
        .iter()
        .find_map(|marker| message.find(marker).map(|at| &message[at + marker.len()..]))
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| message.trim())
}
