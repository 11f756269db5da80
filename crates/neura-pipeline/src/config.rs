// config.rs — Pipeline configuration.
//
// NeuraConfig says where the journal and rule set live and how actions are
// dispatched and confirmed. `for_project()` gives the standard layout under
// a `.neura/` directory in the project root; `load_or_default()` overlays
// `.neura/neura.toml` when it exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use neura_motor::{
    DispatchConfig, DryRunExecutor, ExecutorKind, ExecutorRegistry, ProcessExecutor,
};
use neura_policy::{ActionKind, OsType, RuleSet};

use crate::error::PipelineError;

/// Directory holding Neura's state inside a project.
pub const NEURA_DIR: &str = ".neura";
/// Config file name inside `NEURA_DIR`.
pub const CONFIG_FILE: &str = "neura.toml";

/// Top-level configuration from `.neura/neura.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuraConfig {
    /// Root that relative paths resolve against. Not stored in the file.
    #[serde(skip)]
    pub project_root: PathBuf,

    /// Audit journal location.
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,

    /// Rule set location; the built-in rule set is used when absent.
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    #[serde(default)]
    pub journal: JournalSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub confirmation: ConfirmationSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSettings {
    /// fsync after every append.
    #[serde(default = "default_true")]
    pub fsync: bool,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self { fsync: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Default per-action timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Route every action to the dry-run executor.
    #[serde(default)]
    pub dry_run: bool,

    /// Per-kind timeout overrides, in milliseconds.
    #[serde(default)]
    pub timeouts: BTreeMap<String, u64>,

    /// Per-kind argv templates for the process executor.
    #[serde(default)]
    pub process_commands: BTreeMap<String, Vec<String>>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            dry_run: false,
            timeouts: BTreeMap::new(),
            process_commands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// How long a prompt waits for an answer before timing out.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirmation_timeout_secs(),
        }
    }
}

fn default_journal_path() -> PathBuf {
    Path::new(NEURA_DIR).join("journal.jsonl")
}

fn default_rules_path() -> PathBuf {
    Path::new(NEURA_DIR).join("rules.yaml")
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_confirmation_timeout_secs() -> u64 {
    60
}

impl NeuraConfig {
    /// Standard `.neura/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            journal_path: default_journal_path(),
            rules_path: default_rules_path(),
            journal: JournalSettings::default(),
            dispatch: DispatchSettings::default(),
            confirmation: ConfirmationSettings::default(),
        }
    }

    /// Path of the config file for a project.
    pub fn config_path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(NEURA_DIR).join(CONFIG_FILE)
    }

    /// Load `.neura/neura.toml`; the file must exist.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = Self::config_path(&project_root);
        let content =
            std::fs::read_to_string(&path).map_err(|source| PipelineError::ConfigRead {
                path: path.clone(),
                source,
            })?;
        let mut config: NeuraConfig =
            toml::from_str(&content).map_err(|e| PipelineError::ConfigInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        config.project_root = project_root.as_ref().to_path_buf();
        config.validate(&path)?;
        Ok(config)
    }

    /// Load the config file when present, else the standard layout.
    ///
    /// A config file that exists but does not parse is an error, not a
    /// silent fallback.
    pub fn load_or_default(project_root: impl AsRef<Path>) -> Result<Self, PipelineError> {
        if Self::config_path(&project_root).exists() {
            Self::load(project_root)
        } else {
            Ok(Self::for_project(project_root))
        }
    }

    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::ConfigInvalid {
            path: Self::config_path(&self.project_root),
            reason: e.to_string(),
        })
    }

    pub fn journal_file(&self) -> PathBuf {
        self.resolve(&self.journal_path)
    }

    pub fn rules_file(&self) -> PathBuf {
        self.resolve(&self.rules_path)
    }

    /// The configured rule set, or the built-in one when the file is absent.
    pub fn load_rules(&self) -> Result<RuleSet, PipelineError> {
        Ok(RuleSet::load_or_default(&self.rules_file())?)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation.timeout_secs)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let mut config = DispatchConfig::default()
            .with_default_timeout(Duration::from_millis(self.dispatch.timeout_ms))
            .with_max_concurrent(self.dispatch.max_concurrent);
        for (action, ms) in &self.dispatch.timeouts {
            config = config.with_timeout(action.as_str(), Duration::from_millis(*ms));
        }
        config
    }

    /// The executor registry for `os`: dry-run when configured, otherwise
    /// the native executor with configured process commands taking
    /// precedence.
    pub fn executor_registry(&self, os: &OsType) -> Result<ExecutorRegistry, PipelineError> {
        if self.dispatch.dry_run {
            return Ok(ExecutorRegistry::dry_run(DryRunExecutor::new()));
        }

        let mut registry = ExecutorRegistry::for_os(os);
        if !self.dispatch.process_commands.is_empty() {
            let mut process = ProcessExecutor::new();
            for (action, argv) in &self.dispatch.process_commands {
                process = process.with_command(action.as_str(), argv.iter().cloned())?;
            }
            registry = registry.with_executor(process);
            for action in self.dispatch.process_commands.keys() {
                registry = registry.with_route(ActionKind::from(action.as_str()), ExecutorKind::Process);
            }
        }
        Ok(registry)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        let invalid = |reason: &str| PipelineError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.dispatch.timeout_ms == 0 {
            return Err(invalid("dispatch.timeout_ms must be positive"));
        }
        if self.dispatch.max_concurrent == 0 {
            return Err(invalid("dispatch.max_concurrent must be positive"));
        }
        if self.confirmation.timeout_secs == 0 {
            return Err(invalid("confirmation.timeout_secs must be positive"));
        }
        if self.dispatch.timeouts.values().any(|ms| *ms == 0) {
            return Err(invalid("dispatch.timeouts entries must be positive"));
        }
        Ok(())
    }
}
