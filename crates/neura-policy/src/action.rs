// action.rs — The action request data model.
//
// An ActionRequest describes one candidate operation an agent wants the
// system to perform. It is built once (builder style), handed to the policy
// engine, and recorded verbatim in the audit journal.
//
// `ActionKind` and `OsType` are closed vocabularies with an `Other` escape
// hatch: unknown kinds must be representable so that they can be denied by
// name rather than rejected at parse time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum payload length shown in logs before redaction kicks in.
const PREVIEW_LIMIT: usize = 200;

/// The kind of action being requested.
///
/// Serialized as its snake_case name (`"open_app"`, `"type_text"`, ...).
/// Anything outside the known vocabulary round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    OpenApp,
    Click,
    TypeText,
    OpenUrl,
    OpenFolder,
    ListFiles,
    CreateFolder,
    CreateNote,
    ListEmails,
    SendEmail,
    GetVolume,
    SetVolume,
    GetBattery,
    DeleteFile,
    DeleteAll,
    FormatDisk,
    /// Raw command execution. Blocked unconditionally by the policy engine.
    ExecuteCommand,
    /// A kind outside the known vocabulary.
    Other(String),
}

impl ActionKind {
    /// Every kind in the known vocabulary, in declaration order.
    pub fn known() -> Vec<ActionKind> {
        vec![
            ActionKind::OpenApp,
            ActionKind::Click,
            ActionKind::TypeText,
            ActionKind::OpenUrl,
            ActionKind::OpenFolder,
            ActionKind::ListFiles,
            ActionKind::CreateFolder,
            ActionKind::CreateNote,
            ActionKind::ListEmails,
            ActionKind::SendEmail,
            ActionKind::GetVolume,
            ActionKind::SetVolume,
            ActionKind::GetBattery,
            ActionKind::DeleteFile,
            ActionKind::DeleteAll,
            ActionKind::FormatDisk,
            ActionKind::ExecuteCommand,
        ]
    }

    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::OpenApp => "open_app",
            ActionKind::Click => "click",
            ActionKind::TypeText => "type_text",
            ActionKind::OpenUrl => "open_url",
            ActionKind::OpenFolder => "open_folder",
            ActionKind::ListFiles => "list_files",
            ActionKind::CreateFolder => "create_folder",
            ActionKind::CreateNote => "create_note",
            ActionKind::ListEmails => "list_emails",
            ActionKind::SendEmail => "send_email",
            ActionKind::GetVolume => "get_volume",
            ActionKind::SetVolume => "set_volume",
            ActionKind::GetBattery => "get_battery",
            ActionKind::DeleteFile => "delete_file",
            ActionKind::DeleteAll => "delete_all",
            ActionKind::FormatDisk => "format_disk",
            ActionKind::ExecuteCommand => "execute_command",
            ActionKind::Other(name) => name,
        }
    }

    /// Kinds that no rule set can ever whitelist.
    pub fn is_always_blocked(&self) -> bool {
        matches!(self, ActionKind::ExecuteCommand)
    }
}

impl From<&str> for ActionKind {
    fn from(s: &str) -> Self {
        match s {
            "open_app" => ActionKind::OpenApp,
            "click" => ActionKind::Click,
            "type_text" => ActionKind::TypeText,
            "open_url" => ActionKind::OpenUrl,
            "open_folder" => ActionKind::OpenFolder,
            "list_files" => ActionKind::ListFiles,
            "create_folder" => ActionKind::CreateFolder,
            "create_note" => ActionKind::CreateNote,
            "list_emails" => ActionKind::ListEmails,
            "send_email" => ActionKind::SendEmail,
            "get_volume" => ActionKind::GetVolume,
            "set_volume" => ActionKind::SetVolume,
            "get_battery" => ActionKind::GetBattery,
            "delete_file" => ActionKind::DeleteFile,
            "delete_all" => ActionKind::DeleteAll,
            "format_disk" => ActionKind::FormatDisk,
            "execute_command" => ActionKind::ExecuteCommand,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        ActionKind::from(s.as_str())
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for ActionKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ActionKind::from(s))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operating environment an action targets.
///
/// App whitelists are defined per environment; an environment with no
/// whitelist can never have a targeted action allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsType {
    Mac,
    Linux,
    Other(String),
}

impl OsType {
    /// Detect the host operating environment.
    ///
    /// Used by orchestrators when building requests; the policy engine never
    /// calls this, so evaluation stays independent of the host.
    pub fn current() -> Self {
        OsType::from(std::env::consts::OS)
    }

    /// Canonical wire name. Aliases held in `Other` collapse to the name
    /// they parse back into, so a serialized request reads back unchanged.
    pub fn as_str(&self) -> &str {
        match self {
            OsType::Mac => "mac",
            OsType::Linux => "linux",
            OsType::Other(name) => match OsType::from(name.as_str()) {
                OsType::Mac => "mac",
                OsType::Linux => "linux",
                OsType::Other(_) => name,
            },
        }
    }

    /// Fold an `Other` that names a known environment into its variant.
    pub fn canonical(self) -> Self {
        match self {
            OsType::Other(name) => OsType::from(name.as_str()),
            known => known,
        }
    }
}

impl From<&str> for OsType {
    fn from(s: &str) -> Self {
        match s {
            "mac" | "macos" | "darwin" => OsType::Mac,
            "linux" => OsType::Linux,
            other => OsType::Other(other.to_string()),
        }
    }
}

impl From<String> for OsType {
    fn from(s: String) -> Self {
        OsType::from(s.as_str())
    }
}

impl From<OsType> for String {
    fn from(os: OsType) -> Self {
        os.as_str().to_string()
    }
}

impl FromStr for OsType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(OsType::from(s))
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen coordinates for pointer actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

/// A candidate operation submitted for authorization.
///
/// Fields are read through accessors; the only way to shape a request is the
/// `with_*` builder chain before it is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    request_id: Uuid,
    action: ActionKind,
    /// Application the action runs in. Checked against the app whitelist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    /// What the action operates on: a URL, path or mail recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    point: Option<ScreenPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    os: Option<OsType>,
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    approved: bool,
    /// Requester-supplied context. A BTreeMap keeps serialization ordered,
    /// which the journal's content hash depends on.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl ActionRequest {
    /// Start a new request for the given action kind.
    pub fn new(action: impl Into<ActionKind>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            action: action.into(),
            target: None,
            resource: None,
            payload: None,
            point: None,
            os: None,
            critical: false,
            approved: false,
            context: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Name the target application.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Name the URL, path or recipient the action operates on.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Attach free-text payload (text to type, note body, mail body, ...).
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_point(mut self, x: i32, y: i32) -> Self {
        self.point = Some(ScreenPoint { x, y });
        self
    }

    /// Name the operating environment whose whitelist applies.
    pub fn with_os(mut self, os: impl Into<OsType>) -> Self {
        let os: OsType = os.into();
        self.os = Some(os.canonical());
        self
    }

    /// Mark the request critical. Critical requests need `approved(true)`.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Record that the user explicitly approved this request beforehand.
    pub fn approved(mut self, approved: bool) -> Self {
        self.approved = approved;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn action(&self) -> &ActionKind {
        &self.action
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn point(&self) -> Option<ScreenPoint> {
        self.point
    }

    pub fn os(&self) -> Option<&OsType> {
        self.os.as_ref()
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    pub fn context(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Payload safe for log lines: long text is cut and marked redacted.
    pub fn payload_preview(&self) -> String {
        match &self.payload {
            None => String::new(),
            Some(text) if text.chars().count() > PREVIEW_LIMIT => {
                let head: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
                format!("{}***redacted***", head)
            }
            Some(text) => text.clone(),
        }
    }

    /// One-line description for logs and confirmation prompts.
    pub fn summary(&self) -> String {
        let mut line = self.action.to_string();
        if let Some(resource) = &self.resource {
            line.push(' ');
            line.push_str(resource);
        }
        if let Some(target) = &self.target {
            line.push_str(" on ");
            line.push_str(target);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_round_trip_through_their_names() {
        for kind in ActionKind::known() {
            assert_eq!(ActionKind::from(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let kind = ActionKind::from("launch_missiles");
        assert_eq!(kind, ActionKind::Other("launch_missiles".into()));
        assert_eq!(kind.to_string(), "launch_missiles");
    }

    #[test]
    fn action_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&ActionKind::TypeText).unwrap();
        assert_eq!(json, "\"type_text\"");
        let back: ActionKind = serde_json::from_str("\"execute_command\"").unwrap();
        assert_eq!(back, ActionKind::ExecuteCommand);
    }

    #[test]
    fn os_aliases_normalize() {
        assert_eq!(OsType::from("macos"), OsType::Mac);
        assert_eq!(OsType::from("darwin"), OsType::Mac);
        assert_eq!(OsType::from("linux"), OsType::Linux);
        assert_eq!(OsType::from("windows"), OsType::Other("windows".into()));
    }

    #[test]
    fn os_alias_in_other_serializes_canonically() {
        let json = serde_json::to_string(&OsType::Other("macos".into())).unwrap();
        assert_eq!(json, "\"mac\"");
        assert_eq!(OsType::Other("darwin".into()).canonical(), OsType::Mac);
        assert_eq!(OsType::Other("windows".into()).as_str(), "windows");

        let request = ActionRequest::new("open_app")
            .with_target("Notes")
            .with_os(OsType::Other("macos".into()));
        assert_eq!(request.os(), Some(&OsType::Mac));
        let restored: ActionRequest =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(restored, request);
    }

    #[test]
    fn builder_sets_fields() {
        let request = ActionRequest::new(ActionKind::OpenApp)
            .with_target("Notes")
            .with_os(OsType::Mac)
            .critical(true)
            .approved(true)
            .with_context("session", serde_json::json!("s-1"));

        assert_eq!(request.action(), &ActionKind::OpenApp);
        assert_eq!(request.target(), Some("Notes"));
        assert_eq!(request.os(), Some(&OsType::Mac));
        assert!(request.is_critical());
        assert!(request.is_approved());
        assert_eq!(request.context()["session"], "s-1");
        assert_eq!(request.summary(), "open_app on Notes");
    }

    #[test]
    fn resource_is_kept_apart_from_target() {
        let request = ActionRequest::new(ActionKind::SendEmail)
            .with_target("Mail")
            .with_resource("bob@example.com")
            .with_payload("hello");
        assert_eq!(request.target(), Some("Mail"));
        assert_eq!(request.resource(), Some("bob@example.com"));
        assert_eq!(request.summary(), "send_email bob@example.com on Mail");

        let bare = ActionRequest::new("open_url").with_resource("https://example.com");
        assert_eq!(bare.target(), None);
        assert_eq!(bare.summary(), "open_url https://example.com");
    }

    #[test]
    fn payload_preview_redacts_long_text() {
        let long = "a".repeat(500);
        let request = ActionRequest::new("type_text").with_payload(long);
        let preview = request.payload_preview();
        assert!(preview.ends_with("***redacted***"));
        assert_eq!(preview.chars().count(), 197 + "***redacted***".len());

        let short = ActionRequest::new("type_text").with_payload("hello");
        assert_eq!(short.payload_preview(), "hello");
    }

    #[test]
    fn request_survives_json() {
        let request = ActionRequest::new("click").with_point(10, 20).with_os("linux");
        let json = serde_json::to_string(&request).unwrap();
        let restored: ActionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request, restored);
    }
}
