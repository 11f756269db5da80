// executor/applescript.rs — macOS automation through `osascript`.
//
// Each supported action kind maps to a small AppleScript program built from
// the request. Every value interpolated into a script goes through
// `escape()`, so request text can never close a string literal.

use neura_policy::{ActionKind, ActionRequest};

use super::{parse_volume, require_payload, require_point, require_resource, require_target, unsupported};
use crate::error::ExecutorError;
use crate::kind::ExecutorKind;
use crate::runner;

const OSASCRIPT: &str = "osascript";

#[derive(Debug, Clone, Default)]
pub struct AppleScriptExecutor;

impl AppleScriptExecutor {
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
                | ActionKind::CreateNote
                | ActionKind::ListEmails
                | ActionKind::SendEmail
                | ActionKind::GetVolume
                | ActionKind::SetVolume
                | ActionKind::GetBattery
                | ActionKind::DeleteFile
        )
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        let script = script_for(request)?;
        runner::run(OSASCRIPT, &["-e".to_string(), script]).await
    }
}

/// Build the AppleScript for a request.
pub fn script_for(request: &ActionRequest) -> Result<String, ExecutorError> {
    let script = match request.action() {
        ActionKind::OpenApp => {
            let app = escape(require_target(request)?);
            format!(
                "tell application \"{app}\"\n    activate\nend tell\nreturn \"Activated {app}\""
            )
        }
        ActionKind::TypeText => format!(
            "tell application \"System Events\" to keystroke \"{}\"",
            escape(require_payload(request)?)
        ),
        ActionKind::Click => {
            let point = require_point(request)?;
            format!(
                "tell application \"System Events\" to click at {{{}, {}}}",
                point.x, point.y
            )
        }
        ActionKind::OpenUrl => format!(
            "open location \"{}\"",
            escape(require_resource(request)?)
        ),
        ActionKind::OpenFolder => format!(
            "tell application \"Finder\"\n    open (POSIX file \"{}\" as alias)\n    activate\nend tell",
            escape(require_resource(request)?)
        ),
        ActionKind::ListFiles => match request.resource() {
            Some(path) => format!(
                "tell application \"Finder\" to get name of every item of folder (POSIX file \"{}\" as alias)",
                escape(path)
            ),
            None => "tell application \"Finder\" to get name of every item of (path to home folder)"
                .to_string(),
        },
        ActionKind::CreateFolder => format!(
            "do shell script \"mkdir -p \" & quoted form of \"{}\"",
            escape(require_resource(request)?)
        ),
        ActionKind::CreateNote => {
            let title = request.resource().unwrap_or("Neura note");
            format!(
                "tell application \"Notes\" to make new note with properties {{name:\"{}\", body:\"{}\"}}",
                escape(title),
                escape(require_payload(request)?)
            )
        }
        ActionKind::ListEmails => {
            "tell application \"Mail\" to get subject of messages of inbox".to_string()
        }
        ActionKind::SendEmail => {
            let subject = request
                .context()
                .get("subject")
                .and_then(|v| v.as_str())
                .unwrap_or("Message from Neura");
            format!(
                "tell application \"Mail\"\n    set msg to make new outgoing message with properties {{subject:\"{}\", content:\"{}\", visible:false}}\n    tell msg to make new to recipient at end of to recipients with properties {{address:\"{}\"}}\n    send msg\nend tell",
                escape(subject),
                escape(request.payload().unwrap_or_default()),
                escape(require_resource(request)?)
            )
        }
        ActionKind::GetVolume => "output volume of (get volume settings)".to_string(),
        ActionKind::SetVolume => format!("set volume output volume {}", parse_volume(request)?),
        ActionKind::GetBattery => "do shell script \"pmset -g batt\"".to_string(),
        ActionKind::DeleteFile => format!(
            "tell application \"Finder\" to delete (POSIX file \"{}\" as alias)",
            escape(require_resource(request)?)
        ),
        _ => return Err(unsupported(ExecutorKind::AppleScript, request)),
    };
    Ok(script)
}

/// Escape text for use inside an AppleScript string literal.
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_app_activates() {
        let request = ActionRequest::new(ActionKind::OpenApp).with_target("Notes");
        let script = script_for(&request).unwrap();
        assert!(script.starts_with("tell application \"Notes\"\n    activate"));
    }

    #[test]
    fn quotes_in_text_are_escaped() {
        let request = ActionRequest::new(ActionKind::TypeText)
            .with_payload("say \"hi\" \\ bye\" & do shell script \"x");
        let script = script_for(&request).unwrap();
        assert_eq!(
            script,
            "tell application \"System Events\" to keystroke \"say \\\"hi\\\" \\\\ bye\\\" & do shell script \\\"x\""
        );
    }

    #[test]
    fn click_uses_point() {
        let request = ActionRequest::new(ActionKind::Click).with_point(120, -4);
        assert_eq!(
            script_for(&request).unwrap(),
            "tell application \"System Events\" to click at {120, -4}"
        );
    }

    #[test]
    fn send_email_reads_subject_from_context() {
        let request = ActionRequest::new(ActionKind::SendEmail)
            .with_resource("bob@example.com")
            .with_payload("See you")
            .with_context("subject", serde_json::json!("Lunch"));
        let script = script_for(&request).unwrap();
        assert!(script.contains("subject:\"Lunch\""));
        assert!(script.contains("address:\"bob@example.com\""));
        assert!(script.contains("content:\"See you\""));
    }

    #[test]
    fn set_volume_validates_level() {
        let request = ActionRequest::new(ActionKind::SetVolume).with_payload("55");
        assert_eq!(script_for(&request).unwrap(), "set volume output volume 55");
    }

    #[test]
    fn destructive_bulk_actions_have_no_script() {
        for action in [ActionKind::DeleteAll, ActionKind::FormatDisk, ActionKind::ExecuteCommand] {
            let request = ActionRequest::new(action);
            assert!(!AppleScriptExecutor::supports(request.action()));
            assert!(matches!(
                script_for(&request),
                Err(ExecutorError::Unsupported { .. })
            ));
        }
    }
}
