// rules.rs — The versioned rule set.
//
// A RuleSet is pure data: which action kinds are allowed or blocked, which
// apps are whitelisted per operating environment, which payload patterns are
// forbidden, which kinds mutate state, and how each kind maps to a risk tier.
// It can be loaded from YAML (`.neura/rules.yaml`); when no file exists the
// built-in rule set below applies.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, OsType};
use crate::error::PolicyError;
use crate::verdict::RiskLevel;

/// A payload pattern that denies any request containing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForbiddenPattern {
    /// Case-sensitive substring match.
    Substring { pattern: String },
    /// Regular expression (Rust `regex` syntax).
    Regex { pattern: String },
}

impl ForbiddenPattern {
    pub fn substring(pattern: impl Into<String>) -> Self {
        ForbiddenPattern::Substring {
            pattern: pattern.into(),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        ForbiddenPattern::Regex {
            pattern: pattern.into(),
        }
    }

    /// The pattern text as written in the rule set.
    pub fn as_str(&self) -> &str {
        match self {
            ForbiddenPattern::Substring { pattern } | ForbiddenPattern::Regex { pattern } => {
                pattern
            }
        }
    }
}

/// The complete, versioned rule set evaluated by the policy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Bumped whenever the rules change; recorded in every verdict.
    pub version: u32,

    #[serde(default = "default_name")]
    pub name: String,

    /// Action kinds that may be requested at all.
    pub allowed_actions: Vec<ActionKind>,

    /// Action kinds denied outright. Wins over `allowed_actions`.
    #[serde(default)]
    pub blocked_actions: Vec<ActionKind>,

    /// Whitelisted target apps per operating environment. Entries are exact
    /// names or glob patterns (e.g. `"Visual Studio*"`).
    #[serde(default)]
    pub app_whitelists: BTreeMap<OsType, Vec<String>>,

    #[serde(default)]
    pub forbidden_patterns: Vec<ForbiddenPattern>,

    /// Kinds that change state and therefore need confirmation before dispatch.
    #[serde(default)]
    pub mutating_actions: Vec<ActionKind>,

    /// Risk tier per action kind. Kinds missing here are treated as critical.
    #[serde(default)]
    pub risk_tiers: BTreeMap<ActionKind, RiskLevel>,
}

fn default_name() -> String {
    "custom".to_string()
}

impl RuleSet {
    /// Parse a rule set from YAML text and validate it.
    pub fn from_yaml_str(content: &str) -> Result<Self, PolicyError> {
        let rules: RuleSet = serde_yaml::from_str(content)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Load a rule set from a YAML file and validate it.
    pub fn from_yaml_file(path: &Path) -> Result<Self, PolicyError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| PolicyError::RuleFileRead {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&content)
    }

    /// Load from `path` if it exists, otherwise use the built-in rules.
    ///
    /// A file that exists but fails to parse or validate is an error: a
    /// broken rule file must never silently fall back to other rules.
    pub fn load_or_default(path: &Path) -> Result<Self, PolicyError> {
        if path.exists() {
            Self::from_yaml_file(path)
        } else {
            tracing::info!(path = %path.display(), "no rule file, using built-in rule set");
            Ok(Self::default())
        }
    }

    /// Serialize to YAML (used by `neura policy show`).
    pub fn to_yaml(&self) -> Result<String, PolicyError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check structural consistency and that every pattern compiles.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version == 0 {
            return Err(PolicyError::InvalidRuleSet(
                "version must be at least 1".to_string(),
            ));
        }

        let blocked: BTreeSet<&ActionKind> = self.blocked_actions.iter().collect();
        if let Some(kind) = self
            .allowed_actions
            .iter()
            .find(|k| blocked.contains(k) || k.is_always_blocked())
        {
            return Err(PolicyError::InvalidRuleSet(format!(
                "action '{}' is both allowed and blocked",
                kind
            )));
        }

        for pattern in &self.forbidden_patterns {
            match pattern {
                ForbiddenPattern::Substring { pattern } if pattern.is_empty() => {
                    return Err(PolicyError::InvalidPattern {
                        pattern: String::new(),
                        reason: "empty substring matches every payload".to_string(),
                    });
                }
                ForbiddenPattern::Substring { .. } => {}
                ForbiddenPattern::Regex { pattern } => {
                    Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }

        for apps in self.app_whitelists.values() {
            for entry in apps.iter().filter(|a| is_glob(a)) {
                Pattern::new(entry).map_err(|e| PolicyError::InvalidPattern {
                    pattern: entry.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }
}

/// Whitelist entries containing glob metacharacters are matched as patterns.
pub(crate) fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

impl Default for RuleSet {
    /// The built-in, reviewed rule set (version 1).
    fn default() -> Self {
        use ActionKind::*;

        let mut app_whitelists = BTreeMap::new();
        app_whitelists.insert(
            OsType::Mac,
            ["Terminal", "Notes", "TextEdit", "VSCode", "Calculator", "Safari", "Mail", "Finder"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        app_whitelists.insert(
            OsType::Linux,
            ["gedit", "kate", "code", "xterm", "gnome-terminal", "firefox", "nautilus"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        let forbidden_patterns = vec![
            // Destructive shell idioms.
            ForbiddenPattern::substring("rm -rf"),
            ForbiddenPattern::regex(r"(?:curl|wget)[^|\n]*\|\s*(?:ba|z)?sh\b"),
            ForbiddenPattern::regex(r"\bmkfs(?:\.\w+)?\b"),
            ForbiddenPattern::regex(r"\bdd\s+if="),
            ForbiddenPattern::regex(r":\(\)\s*\{\s*:\|:&\s*\};:"),
            // Privilege escalation.
            ForbiddenPattern::substring("sudo "),
            ForbiddenPattern::regex(r"\bchmod\s+-R\s+777\b"),
            // Protected filesystem paths.
            ForbiddenPattern::substring("/etc/"),
            ForbiddenPattern::substring("/System/"),
            // Destructive queries.
            ForbiddenPattern::regex(r"(?i)\bdrop\s+(?:table|database)\b"),
        ];

        let risk_tiers = [
            (OpenApp, RiskLevel::Low),
            (Click, RiskLevel::Low),
            (ListFiles, RiskLevel::Low),
            (ListEmails, RiskLevel::Low),
            (GetVolume, RiskLevel::Low),
            (GetBattery, RiskLevel::Low),
            (TypeText, RiskLevel::Medium),
            (OpenUrl, RiskLevel::Medium),
            (OpenFolder, RiskLevel::Medium),
            (CreateFolder, RiskLevel::Medium),
            (CreateNote, RiskLevel::Medium),
            (SetVolume, RiskLevel::High),
            (SendEmail, RiskLevel::High),
            (DeleteFile, RiskLevel::High),
            (DeleteAll, RiskLevel::Critical),
            (FormatDisk, RiskLevel::Critical),
            (ExecuteCommand, RiskLevel::Critical),
        ]
        .into_iter()
        .collect();

        Self {
            version: 1,
            name: "builtin".to_string(),
            allowed_actions: vec![
                OpenApp, Click, TypeText, OpenUrl, OpenFolder, ListFiles, CreateFolder,
                CreateNote, ListEmails, SendEmail, GetVolume, SetVolume, GetBattery, DeleteFile,
            ],
            blocked_actions: vec![ExecuteCommand, DeleteAll, FormatDisk],
            app_whitelists,
            forbidden_patterns,
            mutating_actions: vec![
                TypeText, CreateFolder, CreateNote, SendEmail, SetVolume, DeleteFile, DeleteAll,
                FormatDisk, ExecuteCommand,
            ],
            risk_tiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_rules_are_valid() {
        RuleSet::default().validate().unwrap();
    }

    #[test]
    fn builtin_rules_survive_yaml() {
        let rules = RuleSet::default();
        let yaml = rules.to_yaml().unwrap();
        let restored = RuleSet::from_yaml_str(&yaml).unwrap();
        assert_eq!(rules, restored);
    }

    #[test]
    fn parses_hand_written_yaml() {
        let yaml = r#"
version: 3
name: locked-down
allowed_actions: [open_app, click]
blocked_actions: [execute_command]
app_whitelists:
  mac: [Notes, "Visual Studio*"]
forbidden_patterns:
  - kind: substring
    pattern: "rm -rf"
  - kind: regex
    pattern: "(?i)shutdown"
mutating_actions: []
risk_tiers:
  open_app: low
  click: medium
"#;
        let rules = RuleSet::from_yaml_str(yaml).unwrap();
        assert_eq!(rules.version, 3);
        assert_eq!(rules.allowed_actions, vec![ActionKind::OpenApp, ActionKind::Click]);
        assert_eq!(rules.app_whitelists[&OsType::Mac].len(), 2);
        assert_eq!(rules.risk_tiers[&ActionKind::Click], RiskLevel::Medium);
    }

    #[test]
    fn rejects_version_zero() {
        let mut rules = RuleSet::default();
        rules.version = 0;
        assert!(matches!(rules.validate(), Err(PolicyError::InvalidRuleSet(_))));
    }

    #[test]
    fn rejects_whitelisting_execute_command() {
        let mut rules = RuleSet::default();
        rules.blocked_actions.clear();
        rules.allowed_actions.push(ActionKind::ExecuteCommand);
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("execute_command"));
    }

    #[test]
    fn rejects_action_both_allowed_and_blocked() {
        let mut rules = RuleSet::default();
        rules.blocked_actions.push(ActionKind::Click);
        assert!(rules.validate().is_err());
    }

    #[test]
    fn rejects_bad_regex() {
        let mut rules = RuleSet::default();
        rules.forbidden_patterns.push(ForbiddenPattern::regex("(unclosed"));
        match rules.validate() {
            Err(PolicyError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn rejects_empty_substring() {
        let mut rules = RuleSet::default();
        rules.forbidden_patterns.push(ForbiddenPattern::substring(""));
        assert!(matches!(
            rules.validate(),
            Err(PolicyError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn load_or_default_without_file_uses_builtin() {
        let dir = tempdir().unwrap();
        let rules = RuleSet::load_or_default(&dir.path().join("rules.yaml")).unwrap();
        assert_eq!(rules.name, "builtin");
    }

    #[test]
    fn load_or_default_with_broken_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "version: [not a number").unwrap();
        assert!(RuleSet::load_or_default(&path).is_err());
    }
}
