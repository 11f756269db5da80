// verdict.rs — Policy verdicts, violations, and risk levels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, OsType};

/// Coarse severity attached to every verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One failed policy check.
///
/// Serialized with a `code` tag so journal consumers can match on the
/// stable code without parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Violation {
    /// The action kind is on the block list (or is never allowed).
    ActionBlocked { action: ActionKind },
    /// The action kind is not on the allow list.
    ActionNotAllowed { action: ActionKind },
    /// A target was named but the environment has no whitelist.
    UnsupportedEnvironment { os: Option<OsType> },
    /// The target is not whitelisted for the environment.
    TargetNotWhitelisted { target: String, os: OsType },
    /// The payload contains a forbidden pattern.
    ForbiddenPattern { pattern: String },
    /// A critical action arrived without prior approval.
    CriticalNotApproved,
}

impl Violation {
    /// Stable machine-checkable code.
    pub fn code(&self) -> &'static str {
        match self {
            Violation::ActionBlocked { .. } => "action_blocked",
            Violation::ActionNotAllowed { .. } => "action_not_allowed",
            Violation::UnsupportedEnvironment { .. } => "unsupported_environment",
            Violation::TargetNotWhitelisted { .. } => "target_not_whitelisted",
            Violation::ForbiddenPattern { .. } => "forbidden_pattern",
            Violation::CriticalNotApproved => "critical_not_approved",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ActionBlocked { action } => {
                write!(f, "action '{}' is blocked", action)
            }
            Violation::ActionNotAllowed { action } => {
                write!(f, "action '{}' not allowed", action)
            }
            Violation::UnsupportedEnvironment { os: Some(os) } => {
                write!(f, "operating environment '{}' has no app whitelist", os)
            }
            Violation::UnsupportedEnvironment { os: None } => {
                write!(f, "target named without an operating environment")
            }
            Violation::TargetNotWhitelisted { target, os } => {
                write!(f, "{} not whitelisted for {}", target, os)
            }
            Violation::ForbiddenPattern { pattern } => {
                write!(f, "payload contains blocked pattern: {}", pattern)
            }
            Violation::CriticalNotApproved => {
                write!(f, "critical action requires user approval")
            }
        }
    }
}

/// The policy engine's ruling on one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub allowed: bool,
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    /// "allowed", or the message of the first failed check.
    pub reason: String,
    /// Every failed check, in evaluation order.
    pub violations: Vec<Violation>,
    /// Version of the rule set that produced this verdict.
    pub rule_set_version: u32,
}

impl PolicyVerdict {
    /// Whether any violation carries the given code.
    pub fn has_violation(&self, code: &str) -> bool {
        self.violations.iter().any(|v| v.code() == code)
    }

    /// True when the verdict allows dispatch without a confirmation step.
    pub fn is_clear_to_dispatch(&self) -> bool {
        self.allowed && !self.requires_confirmation
    }
}
