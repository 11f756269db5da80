// executor/mod.rs — The executor enumeration.
//
// `Executor` is a closed enum over the four implementations; the dispatcher
// never sees anything else. Required request fields are checked here, once,
// before any implementation runs.

pub mod applescript;
pub mod desktop;
pub mod dry_run;
pub mod process;

use neura_policy::{ActionKind, ActionRequest, ScreenPoint};

pub use applescript::AppleScriptExecutor;
pub use desktop::DesktopExecutor;
pub use dry_run::{DryRunExecutor, DryRunRecord};
pub use process::ProcessExecutor;

use crate::error::ExecutorError;
use crate::kind::ExecutorKind;

/// One installed executor.
#[derive(Debug, Clone)]
pub enum Executor {
    AppleScript(AppleScriptExecutor),
    Desktop(DesktopExecutor),
    Process(ProcessExecutor),
    DryRun(DryRunExecutor),
}

impl Executor {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            Executor::AppleScript(_) => ExecutorKind::AppleScript,
            Executor::Desktop(_) => ExecutorKind::Desktop,
            Executor::Process(_) => ExecutorKind::Process,
            Executor::DryRun(_) => ExecutorKind::DryRun,
        }
    }

    /// Whether this executor knows how to perform `action`.
    pub fn supports(&self, action: &ActionKind) -> bool {
        match self {
            Executor::AppleScript(_) => AppleScriptExecutor::supports(action),
            Executor::Desktop(_) => DesktopExecutor::supports(action),
            Executor::Process(e) => e.supports(action),
            Executor::DryRun(_) => true,
        }
    }

    /// Run the action and return its output.
    pub async fn execute(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        check_required_fields(request)?;
        match self {
            Executor::AppleScript(e) => e.execute(request).await,
            Executor::Desktop(e) => e.execute(request).await,
            Executor::Process(e) => e.execute(request).await,
            Executor::DryRun(e) => e.execute(request).await,
        }
    }
}

impl From<AppleScriptExecutor> for Executor {
    fn from(e: AppleScriptExecutor) -> Self {
        Executor::AppleScript(e)
    }
}

impl From<DesktopExecutor> for Executor {
    fn from(e: DesktopExecutor) -> Self {
        Executor::Desktop(e)
    }
}

impl From<ProcessExecutor> for Executor {
    fn from(e: ProcessExecutor) -> Self {
        Executor::Process(e)
    }
}

impl From<DryRunExecutor> for Executor {
    fn from(e: DryRunExecutor) -> Self {
        Executor::DryRun(e)
    }
}

/// Fields each action kind cannot run without.
fn check_required_fields(request: &ActionRequest) -> Result<(), ExecutorError> {
    match request.action() {
        ActionKind::OpenApp => {
            require_target(request)?;
        }
        ActionKind::OpenUrl
        | ActionKind::OpenFolder
        | ActionKind::CreateFolder
        | ActionKind::SendEmail
        | ActionKind::DeleteFile => {
            require_resource(request)?;
        }
        ActionKind::TypeText | ActionKind::CreateNote => {
            require_payload(request)?;
        }
        ActionKind::Click => {
            require_point(request)?;
        }
        ActionKind::SetVolume => {
            parse_volume(request)?;
        }
        _ => {}
    }
    Ok(())
}

pub(crate) fn require_target(request: &ActionRequest) -> Result<&str, ExecutorError> {
    request
        .target()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| missing(request, "target"))
}

/// URL, path or recipient, depending on the kind.
pub(crate) fn require_resource(request: &ActionRequest) -> Result<&str, ExecutorError> {
    request
        .resource()
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| missing(request, "resource"))
}

pub(crate) fn require_payload(request: &ActionRequest) -> Result<&str, ExecutorError> {
    request
        .payload()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| missing(request, "text payload"))
}

pub(crate) fn require_point(request: &ActionRequest) -> Result<ScreenPoint, ExecutorError> {
    request
        .point()
        .ok_or_else(|| missing(request, "screen point"))
}

/// Volume level 0..=100 from the payload.
pub(crate) fn parse_volume(request: &ActionRequest) -> Result<u8, ExecutorError> {
    request
        .payload()
        .and_then(|p| p.trim().parse::<u8>().ok())
        .filter(|v| *v <= 100)
        .ok_or_else(|| missing(request, "volume level between 0 and 100"))
}

fn missing(request: &ActionRequest, field: &'static str) -> ExecutorError {
    ExecutorError::MissingField {
        action: request.action().to_string(),
        field,
    }
}

pub(crate) fn unsupported(kind: ExecutorKind, request: &ActionRequest) -> ExecutorError {
    ExecutorError::Unsupported {
        executor: kind,
        action: request.action().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn type_text_without_payload_fails_before_running() {
        let dry = DryRunExecutor::new();
        let executor = Executor::from(dry.clone());
        let err = executor
            .execute(&ActionRequest::new(ActionKind::TypeText))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::MissingField { field: "text payload", .. }));
        assert!(dry.history().is_empty());
    }

    #[tokio::test]
    async fn click_requires_a_point() {
        let executor = Executor::from(DryRunExecutor::new());
        let err = executor
            .execute(&ActionRequest::new(ActionKind::Click))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "click requires a screen point");

        executor
            .execute(&ActionRequest::new(ActionKind::Click).with_point(10, 20))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn open_app_requires_a_target() {
        let executor = Executor::from(DryRunExecutor::new());
        let err = executor
            .execute(&ActionRequest::new(ActionKind::OpenApp).with_target("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::MissingField { field: "target", .. }));
    }

    #[tokio::test]
    async fn resource_kinds_run_without_an_app_target() {
        let dry = DryRunExecutor::new();
        let executor = Executor::from(dry.clone());

        let err = executor
            .execute(&ActionRequest::new(ActionKind::OpenUrl).with_target("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::MissingField { field: "resource", .. }));

        executor
            .execute(&ActionRequest::new(ActionKind::OpenUrl).with_resource("https://example.com"))
            .await
            .unwrap();
        executor
            .execute(
                &ActionRequest::new(ActionKind::SendEmail)
                    .with_resource("bob@example.com")
                    .with_payload("hello"),
            )
            .await
            .unwrap();
        assert_eq!(dry.history().len(), 2);
    }

    #[test]
    fn volume_must_be_a_percentage() {
        let ok = ActionRequest::new(ActionKind::SetVolume).with_payload("40");
        assert_eq!(parse_volume(&ok).unwrap(), 40);
        let too_loud = ActionRequest::new(ActionKind::SetVolume).with_payload("140");
        assert!(parse_volume(&too_loud).is_err());
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(Executor::from(DryRunExecutor::new()).kind(), ExecutorKind::DryRun);
        assert_eq!(
            Executor::from(AppleScriptExecutor::new()).kind(),
            ExecutorKind::AppleScript
        );
    }
}
