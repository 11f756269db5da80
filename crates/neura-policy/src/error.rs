// error.rs — Error types for the policy subsystem.
//
// Policy *denials* are not errors: they come back as a PolicyVerdict with
// `allowed = false`. These variants cover loading and validating rule sets.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or compiling a rule set.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The rule file could not be read.
    #[error("failed to read rule set at {path}: {source}")]
    RuleFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The rule file is not valid YAML for a RuleSet.
    #[error("failed to parse rule set: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A forbidden pattern or whitelist glob is malformed.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The rule set is structurally inconsistent.
    #[error("invalid rule set: {0}")]
    InvalidRuleSet(String),
}
