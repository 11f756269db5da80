// kind.rs — The closed set of executor kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every executor the dispatcher can route to. Closed: there is no plugin
/// mechanism, so the set of things that can touch the system is fixed at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// macOS automation through `osascript`.
    AppleScript,
    /// Linux desktop tools (`xdg-open`, `wmctrl`, `xdotool`).
    Desktop,
    /// Configured argv templates, run without a shell.
    Process,
    /// Records what would run; no side effects.
    DryRun,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::AppleScript => "apple_script",
            ExecutorKind::Desktop => "desktop",
            ExecutorKind::Process => "process",
            ExecutorKind::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apple_script" | "applescript" => Ok(ExecutorKind::AppleScript),
            "desktop" => Ok(ExecutorKind::Desktop),
            "process" => Ok(ExecutorKind::Process),
            "dry_run" | "dryrun" => Ok(ExecutorKind::DryRun),
            other => Err(format!("unknown executor kind '{}'", other)),
        }
    }
}
