// registry.rs — Fixed routing from action kinds to executors.

use std::collections::BTreeMap;

use neura_policy::{ActionKind, OsType};

use crate::error::DispatchError;
use crate::executor::{AppleScriptExecutor, DesktopExecutor, DryRunExecutor, Executor};
use crate::kind::ExecutorKind;

/// Which executor handles which action kind, and the installed executors.
///
/// Built once at startup; the dispatcher only reads it.
#[derive(Debug, Clone, Default)]
pub struct ExecutorRegistry {
    routes: BTreeMap<ActionKind, ExecutorKind>,
    executors: BTreeMap<ExecutorKind, Executor>,
    /// Route for kinds with no explicit entry.
    fallback: Option<ExecutorKind>,
}

impl ExecutorRegistry {
    /// An empty registry; every dispatch fails with `NoRoute`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The native registry for an operating environment: AppleScript on
    /// macOS, desktop tools on Linux, nothing elsewhere.
    pub fn for_os(os: &OsType) -> Self {
        match os {
            OsType::Mac => Self::new()
                .with_executor(AppleScriptExecutor::new())
                .with_routes_for(ExecutorKind::AppleScript),
            OsType::Linux => Self::new()
                .with_executor(DesktopExecutor::new())
                .with_routes_for(ExecutorKind::Desktop),
            OsType::Other(_) => Self::new(),
        }
    }

    /// Every action goes to the given dry-run executor.
    pub fn dry_run(executor: DryRunExecutor) -> Self {
        Self::new()
            .with_executor(executor)
            .with_fallback(ExecutorKind::DryRun)
    }

    /// Install an executor, replacing any of the same kind.
    pub fn with_executor(mut self, executor: impl Into<Executor>) -> Self {
        let executor = executor.into();
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn with_route(mut self, action: impl Into<ActionKind>, kind: ExecutorKind) -> Self {
        self.routes.insert(action.into(), kind);
        self
    }

    pub fn with_fallback(mut self, kind: ExecutorKind) -> Self {
        self.fallback = Some(kind);
        self
    }

    /// Route every known kind the installed executor of `kind` supports.
    pub fn with_routes_for(mut self, kind: ExecutorKind) -> Self {
        if let Some(executor) = self.executors.get(&kind) {
            let supported: Vec<ActionKind> = ActionKind::known()
                .into_iter()
                .filter(|action| executor.supports(action))
                .collect();
            for action in supported {
                self.routes.insert(action, kind);
            }
        }
        self
    }

    pub fn route(&self, action: &ActionKind) -> Option<ExecutorKind> {
        self.routes.get(action).copied().or(self.fallback)
    }

    pub fn executor(&self, kind: ExecutorKind) -> Option<&Executor> {
        self.executors.get(&kind)
    }

    pub fn routes(&self) -> &BTreeMap<ActionKind, ExecutorKind> {
        &self.routes
    }

    /// The executor that will run `action`.
    pub fn resolve(&self, action: &ActionKind) -> Result<&Executor, DispatchError> {
        let kind = self.route(action).ok_or_else(|| DispatchError::NoRoute {
            action: action.to_string(),
        })?;
        let executor = self
            .executors
            .get(&kind)
            .ok_or_else(|| DispatchError::ExecutorMissing {
                executor: kind,
                action: action.to_string(),
            })?;
        if !executor.supports(action) {
            return Err(DispatchError::Unsupported {
                executor: kind,
                action: action.to_string(),
            });
        }
        Ok(executor)
    }
}
