// engine.rs — Policy evaluation engine.
//
// The PolicyEngine is the single chokepoint for the "default deny" model.
// Every action request passes through `evaluate()` which runs four
// independent checks, in this order:
//
// 1. Action: blocked kinds and kinds missing from the allow list
// 2. Target: a named app must be whitelisted for the environment
// 3. Payload: forbidden patterns anywhere in the payload or resource
// 4. Critical: critical actions need a prior explicit approval
//
// Unlike a first-match engine, every check runs so the verdict lists all
// violations; `reason` reports only the first. Evaluation is pure: no I/O,
// no clock, no randomness. The same request and rule set always produce the
// same verdict.

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, ActionRequest};
use crate::error::PolicyError;
use crate::rules::{is_glob, ForbiddenPattern, RuleSet};
use crate::verdict::{PolicyVerdict, RiskLevel, Violation};

const REASON_ALLOWED: &str = "allowed";

/// A step in the evaluation chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// Which check was performed (e.g. "action", "target").
    pub check: String,
    /// "passed" or the violation messages joined by "; ".
    pub outcome: String,
    pub passed: bool,
}

/// A verdict together with the per-check steps that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub verdict: PolicyVerdict,
    pub steps: Vec<EvaluationStep>,
}

/// A forbidden pattern ready for matching.
#[derive(Debug, Clone)]
enum CompiledPattern {
    Substring(String),
    Regex { source: String, regex: Regex },
}

impl CompiledPattern {
    fn compile(pattern: &ForbiddenPattern) -> Result<Self, PolicyError> {
        match pattern {
            ForbiddenPattern::Substring { pattern } => Ok(CompiledPattern::Substring(pattern.clone())),
            ForbiddenPattern::Regex { pattern } => {
                let regex = Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(CompiledPattern::Regex {
                    source: pattern.clone(),
                    regex,
                })
            }
        }
    }

    fn source(&self) -> &str {
        match self {
            CompiledPattern::Substring(s) => s,
            CompiledPattern::Regex { source, .. } => source,
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Substring(s) => text.contains(s.as_str()),
            CompiledPattern::Regex { regex, .. } => regex.is_match(text),
        }
    }
}

/// The policy engine: a validated rule set with its patterns precompiled.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: RuleSet,
    patterns: Vec<CompiledPattern>,
}

impl PolicyEngine {
    /// Build an engine over a rule set. Fails if the rule set is invalid.
    pub fn new(rules: RuleSet) -> Result<Self, PolicyError> {
        rules.validate()?;
        let patterns = rules
            .forbidden_patterns
            .iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            version = rules.version,
            name = %rules.name,
            patterns = patterns.len(),
            "policy engine ready"
        );
        Ok(Self { rules, patterns })
    }

    /// Engine over the built-in rule set.
    pub fn with_default_rules() -> Self {
        let rules = RuleSet::default();
        let patterns = rules
            .forbidden_patterns
            .iter()
            .filter_map(|p| CompiledPattern::compile(p).ok())
            .collect();
        Self { rules, patterns }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate a request and return the verdict.
    pub fn evaluate(&self, request: &ActionRequest) -> PolicyVerdict {
        let mut violations = Vec::new();
        violations.extend(self.check_action(request.action()));
        violations.extend(self.check_target(request));
        violations.extend(self.check_payload(request));
        violations.extend(check_critical(request));
        self.verdict_from(request.action(), violations)
    }

    /// Same as `evaluate()` but records each check for observability.
    pub fn evaluate_with_trace(&self, request: &ActionRequest) -> EvaluationTrace {
        let checks: [(&str, Vec<Violation>); 4] = [
            ("action", self.check_action(request.action())),
            ("target", self.check_target(request)),
            ("payload", self.check_payload(request)),
            ("critical_approval", check_critical(request)),
        ];

        let mut steps = Vec::with_capacity(checks.len());
        let mut violations = Vec::new();
        for (check, found) in checks {
            let outcome = if found.is_empty() {
                "passed".to_string()
            } else {
                found
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            steps.push(EvaluationStep {
                check: check.to_string(),
                outcome,
                passed: found.is_empty(),
            });
            violations.extend(found);
        }

        EvaluationTrace {
            verdict: self.verdict_from(request.action(), violations),
            steps,
        }
    }

    fn verdict_from(&self, action: &ActionKind, violations: Vec<Violation>) -> PolicyVerdict {
        let mut distinct: Vec<Violation> = Vec::with_capacity(violations.len());
        for v in violations {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }

        let reason = distinct
            .first()
            .map(|v| v.to_string())
            .unwrap_or_else(|| REASON_ALLOWED.to_string());

        PolicyVerdict {
            allowed: distinct.is_empty(),
            requires_confirmation: self.rules.mutating_actions.contains(action),
            risk_level: self.risk_for(action),
            reason,
            violations: distinct,
            rule_set_version: self.rules.version,
        }
    }

    /// Risk tier for a kind. Kinds missing from the table are critical.
    pub fn risk_for(&self, action: &ActionKind) -> RiskLevel {
        self.rules
            .risk_tiers
            .get(action)
            .copied()
            .unwrap_or(RiskLevel::Critical)
    }

    /// Check 1: the kind must be allowed and not blocked.
    fn check_action(&self, action: &ActionKind) -> Vec<Violation> {
        if action.is_always_blocked() || self.rules.blocked_actions.contains(action) {
            vec![Violation::ActionBlocked {
                action: action.clone(),
            }]
        } else if !self.rules.allowed_actions.contains(action) {
            vec![Violation::ActionNotAllowed {
                action: action.clone(),
            }]
        } else {
            Vec::new()
        }
    }

    /// Check 2: a named target app must be whitelisted for the request's
    /// environment. The resource plays no part here.
    fn check_target(&self, request: &ActionRequest) -> Vec<Violation> {
        let Some(target) = request.target() else {
            return Vec::new();
        };

        let Some(os) = request.os() else {
            return vec![Violation::UnsupportedEnvironment { os: None }];
        };

        let Some(whitelist) = self.rules.app_whitelists.get(os) else {
            return vec![Violation::UnsupportedEnvironment {
                os: Some(os.clone()),
            }];
        };

        if whitelist.iter().any(|entry| matches_entry(entry, target)) {
            Vec::new()
        } else {
            vec![Violation::TargetNotWhitelisted {
                target: target.to_string(),
                os: os.clone(),
            }]
        }
    }

    /// Check 3: neither the payload nor the resource may contain a
    /// forbidden pattern. Resources are not whitelisted, only screened.
    fn check_payload(&self, request: &ActionRequest) -> Vec<Violation> {
        let texts: Vec<&str> = [request.payload(), request.resource()]
            .into_iter()
            .flatten()
            .collect();
        self.patterns
            .iter()
            .filter(|p| texts.iter().any(|text| p.is_match(text)))
            .map(|p| Violation::ForbiddenPattern {
                pattern: p.source().to_string(),
            })
            .collect()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

/// Check 4: critical actions need a prior explicit approval.
fn check_critical(request: &ActionRequest) -> Vec<Violation> {
    if request.is_critical() && !request.is_approved() {
        vec![Violation::CriticalNotApproved]
    } else {
        Vec::new()
    }
}

/// Match a whitelist entry against a target: exact name, or glob when the
/// entry contains glob metacharacters. Invalid globs never match (fail-closed).
fn matches_entry(entry: &str, target: &str) -> bool {
    if is_glob(entry) {
        Pattern::new(entry).map(|p| p.matches(target)).unwrap_or(false)
    } else {
        entry == target
    }
}
