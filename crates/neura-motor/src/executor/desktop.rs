// executor/desktop.rs — Linux desktop automation.
//
// Apps are opened with `xdg-open`, falling back to raising an existing
// window with `wmctrl -a`. Typing and clicks go through `xdotool`. File
// listing and folder creation use the filesystem directly.

use neura_policy::{ActionKind, ActionRequest};

use super::{require_payload, require_point, require_resource, require_target, unsupported};
use crate::error::ExecutorError;
use crate::kind::ExecutorKind;
use crate::runner;

/// Entries returned by `list_files`, at most.
const MAX_LISTED: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct DesktopExecutor;

impl DesktopExecutor {
    pub fn new() -> Self {
        Self
    }

    pub fn supports(action: &ActionKind) -> bool {
        matches!(
            action,
            ActionKind::OpenApp
                | ActionKind::TypeText
                | ActionKind::Click
                | ActionKind::OpenUrl
                | ActionKind::OpenFolder
                | ActionKind::ListFiles
                | ActionKind::CreateFolder
        )
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        match request.action() {
            ActionKind::OpenApp => open_app(require_target(request)?).await,
            ActionKind::OpenUrl | ActionKind::OpenFolder => {
                let resource = require_resource(request)?;
                runner::run("xdg-open", &[resource.to_string()]).await?;
                Ok(format!("Opened {}", resource))
            }
            ActionKind::TypeText => {
                let text = require_payload(request)?;
                runner::run(
                    "xdotool",
                    &args(&["type", "--delay", "50", "--", text]),
                )
                .await?;
                Ok(format!("Typed {} characters", text.chars().count()))
            }
            ActionKind::Click => {
                let point = require_point(request)?;
                let (x, y) = (point.x.to_string(), point.y.to_string());
                runner::run(
                    "xdotool",
                    &args(&["mousemove", &x, &y, "click", "1"]),
                )
                .await?;
                Ok(format!("Clicked at ({}, {})", x, y))
            }
            ActionKind::ListFiles => list_files(request.resource().unwrap_or(".")).await,
            ActionKind::CreateFolder => {
                let path = require_resource(request)?;
                tokio::fs::create_dir_all(path).await?;
                Ok(format!("Created folder {}", path))
            }
            _ => Err(unsupported(ExecutorKind::Desktop, request)),
        }
    }
}

async fn open_app(app: &str) -> Result<String, ExecutorError> {
    match runner::run("xdg-open", &[app.to_string()]).await {
        Ok(_) => Ok(format!("Opened {}", app)),
        Err(first) if runner::available("wmctrl") => {
            tracing::debug!(app, error = %first, "xdg-open failed; trying wmctrl");
            runner::run("wmctrl", &args(&["-a", app])).await?;
            Ok(format!("Raised {}", app))
        }
        Err(first) => Err(first),
    }
}

async fn list_files(path: &str) -> Result<String, ExecutorError> {
    let mut names = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    let total = names.len();
    names.truncate(MAX_LISTED);
    let mut listing = names.join("\n");
    if total > MAX_LISTED {
        listing.push_str(&format!("\n… and {} more", total - MAX_LISTED));
    }
    Ok(listing)
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_and_list_folders() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("reports");
        let executor = DesktopExecutor::new();

        let created = executor
            .execute(
                &ActionRequest::new(ActionKind::CreateFolder)
                    .with_resource(folder.to_string_lossy()),
            )
            .await
            .unwrap();
        assert!(created.starts_with("Created folder"));
        assert!(folder.is_dir());

        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        let listing = executor
            .execute(
                &ActionRequest::new(ActionKind::ListFiles)
                    .with_resource(dir.path().to_string_lossy()),
            )
            .await
            .unwrap();
        assert_eq!(listing, "b.txt\nreports");
    }

    #[tokio::test]
    async fn listing_a_missing_folder_fails() {
        let dir = tempdir().unwrap();
        let err = DesktopExecutor::new()
            .execute(
                &ActionRequest::new(ActionKind::ListFiles)
                    .with_resource(dir.path().join("absent").to_string_lossy()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Io(_)));
    }

    #[tokio::test]
    async fn mail_is_not_a_desktop_action() {
        let err = DesktopExecutor::new()
            .execute(&ActionRequest::new(ActionKind::ListEmails))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Unsupported { executor: ExecutorKind::Desktop, .. }));
    }
}
