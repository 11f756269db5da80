// executor/process.rs — Configured argv templates, run without a shell.
//
// Each action kind may be mapped to an argv list such as
// `["notify-send", "Neura", "{payload}"]`. Placeholders are substituted per
// argument, so request text always lands in exactly one argv slot and is
// never interpreted by a shell.

use std::collections::BTreeMap;

use neura_policy::{ActionKind, ActionRequest};

use super::unsupported;
use crate::error::ExecutorError;
use crate::kind::ExecutorKind;
use crate::runner;

/// Placeholders recognised in templates.
const PLACEHOLDERS: [&str; 5] = ["{target}", "{resource}", "{payload}", "{x}", "{y}"];

#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    commands: BTreeMap<ActionKind, Vec<String>>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `action` to an argv template. The first element is the program.
    pub fn with_command(
        mut self,
        action: impl Into<ActionKind>,
        argv: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ExecutorError> {
        let action = action.into();
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        match argv.first() {
            None => {
                return Err(ExecutorError::InvalidTemplate {
                    action: action.to_string(),
                    reason: "argv is empty".to_string(),
                })
            }
            Some(program) if PLACEHOLDERS.iter().any(|p| program.contains(p)) => {
                return Err(ExecutorError::InvalidTemplate {
                    action: action.to_string(),
                    reason: "the program name cannot contain placeholders".to_string(),
                })
            }
            Some(_) => {}
        }
        self.commands.insert(action, argv);
        Ok(self)
    }

    pub fn supports(&self, action: &ActionKind) -> bool {
        self.commands.contains_key(action)
    }

    pub fn commands(&self) -> &BTreeMap<ActionKind, Vec<String>> {
        &self.commands
    }

    pub async fn execute(&self, request: &ActionRequest) -> Result<String, ExecutorError> {
        let template = self
            .commands
            .get(request.action())
            .ok_or_else(|| unsupported(ExecutorKind::Process, request))?;
        let argv = render(template, request)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| unsupported(ExecutorKind::Process, request))?;
        runner::run(program, args).await
    }
}

/// Substitute request fields into each template argument.
///
/// Substitution is a single left-to-right pass, so placeholder text inside a
/// substituted value is left alone.
pub fn render(template: &[String], request: &ActionRequest) -> Result<Vec<String>, ExecutorError> {
    let point = request.point();
    let value_for = |placeholder: &str| -> Option<String> {
        match placeholder {
            "{target}" => request.target().map(str::to_string),
            "{resource}" => request.resource().map(str::to_string),
            "{payload}" => request.payload().map(str::to_string),
            "{x}" => point.map(|p| p.x.to_string()),
            _ => point.map(|p| p.y.to_string()),
        }
    };

    template
        .iter()
        .map(|arg| {
            let mut rendered = String::with_capacity(arg.len());
            let mut rest = arg.as_str();
            while !rest.is_empty() {
                match PLACEHOLDERS.iter().find(|p| rest.starts_with(**p)) {
                    Some(placeholder) => {
                        let value = value_for(*placeholder).ok_or_else(|| {
                            ExecutorError::MissingField {
                                action: request.action().to_string(),
                                field: field_name(placeholder),
                            }
                        })?;
                        rendered.push_str(&value);
                        rest = &rest[placeholder.len()..];
                    }
                    None => {
                        let mut chars = rest.chars();
                        if let Some(c) = chars.next() {
                            rendered.push(c);
                        }
                        rest = chars.as_str();
                    }
                }
            }
            Ok(rendered)
        })
        .collect()
}

fn field_name(placeholder: &str) -> &'static str {
    match placeholder {
        "{target}" => "target",
        "{resource}" => "resource",
        "{payload}" => "text payload",
        _ => "screen point",
    }
}
