// runner.rs — Spawns external commands for the executors.
//
// Commands run without a shell, with stdin closed and `kill_on_drop` set:
// when the dispatcher's timeout drops the future, the child is killed.

use std::process::Stdio;

use tokio::process::Command;

use crate::error::ExecutorError;

/// Longest output kept from a command, in characters.
pub(crate) const MAX_OUTPUT_CHARS: usize = 4096;

/// Run `program` with `args` and return its trimmed stdout.
pub(crate) async fn run(program: &str, args: &[String]) -> Result<String, ExecutorError> {
    tracing::debug!(program, args = args.len(), "spawning executor command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::ToolNotFound {
                    program: program.to_string(),
                }
            } else {
                ExecutorError::Spawn {
                    program: program.to_string(),
                    source,
                }
            }
        })?;

    if !output.status.success() {
        let status = match output.status.code() {
            Some(code) => format!("status {}", code),
            None => "a signal".to_string(),
        };
        return Err(ExecutorError::Failed {
            program: program.to_string(),
            status,
            stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
        });
    }

    Ok(truncate(String::from_utf8_lossy(&output.stdout).trim_end()))
}

/// Whether `program` resolves on PATH.
pub(crate) fn available(program: &str) -> bool {
    which::which(program).is_ok()
}

pub(crate) fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let mut kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    kept.push_str("…[truncated]");
    kept
}
