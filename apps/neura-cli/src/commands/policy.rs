// policy.rs — Policy subcommands: check, show.

use clap::{Args, Subcommand};
use neura_pipeline::NeuraConfig;
use neura_policy::{ActionRequest, OsType, PolicyEngine};

/// Fields of an action request, shared by `policy check` and `run`.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Action kind (e.g. open_app, type_text, send_email).
    pub action: String,
    /// Application the action runs in (checked against the whitelist).
    #[arg(long)]
    pub target: Option<String>,
    /// URL, path or recipient the action operates on.
    #[arg(long)]
    pub resource: Option<String>,
    /// Text payload (typed text, note body, email body, volume).
    #[arg(long)]
    pub payload: Option<String>,
    /// Screen x coordinate for click.
    #[arg(long, requires = "y")]
    pub x: Option<i32>,
    /// Screen y coordinate for click.
    #[arg(long, requires = "x")]
    pub y: Option<i32>,
    /// Operating environment (mac, linux). Defaults to the host.
    #[arg(long)]
    pub os: Option<String>,
    /// Mark the request as critical.
    #[arg(long)]
    pub critical: bool,
    /// The critical request was approved beforehand.
    #[arg(long)]
    pub approved: bool,
}

impl RequestArgs {
    pub fn to_request(&self) -> ActionRequest {
        let mut request = ActionRequest::new(self.action.as_str())
            .with_os(
                self.os
                    .as_deref()
                    .map(OsType::from)
                    .unwrap_or_else(OsType::current),
            )
            .critical(self.critical)
            .approved(self.approved);
        if let Some(target) = &self.target {
            request = request.with_target(target.as_str());
        }
        if let Some(resource) = &self.resource {
            request = request.with_resource(resource.as_str());
        }
        if let Some(payload) = &self.payload {
            request = request.with_payload(payload.as_str());
        }
        if let (Some(x), Some(y)) = (self.x, self.y) {
            request = request.with_point(x, y);
        }
        request
    }
}

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Evaluate a request without executing or journaling it.
    Check {
        #[command(flatten)]
        request: RequestArgs,
        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the active rule set as YAML.
    Show,
}

pub fn execute(cmd: &PolicyCommands, config: &NeuraConfig) -> anyhow::Result<()> {
    let engine = PolicyEngine::new(config.load_rules()?)?;

    match cmd {
        PolicyCommands::Check { request, json } => {
            let request = request.to_request();
            let trace = engine.evaluate_with_trace(&request);

            if *json {
                println!("{}", serde_json::to_string_pretty(&trace.verdict)?);
                return Ok(());
            }

            println!("Request:  {}", request.summary());
            for step in &trace.steps {
                let mark = if step.passed { "ok  " } else { "FAIL" };
                println!("  [{}] {:<18} {}", mark, step.check, step.outcome);
            }
            let verdict = &trace.verdict;
            println!();
            println!(
                "Verdict:  {}",
                if verdict.allowed { "ALLOWED" } else { "DENIED" }
            );
            println!("Risk:     {}", verdict.risk_level);
            println!(
                "Confirm:  {}",
                if verdict.requires_confirmation { "required" } else { "not required" }
            );
            println!("Reason:   {}", verdict.reason);
            println!("Rules:    v{}", verdict.rule_set_version);
        }

        PolicyCommands::Show => {
            let rules = engine.rule_set();
            println!(
                "# {} (v{}) from {}",
                rules.name,
                rules.version,
                if config.rules_file().exists() {
                    config.rules_file().display().to_string()
                } else {
                    "built-in defaults".to_string()
                }
            );
            print!("{}", rules.to_yaml()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neura_policy::ActionKind;

    fn args(action: &str) -> RequestArgs {
        RequestArgs {
            action: action.to_string(),
            target: None,
            resource: None,
            payload: None,
            x: None,
            y: None,
            os: Some("mac".to_string()),
            critical: false,
            approved: false,
        }
    }

    #[test]
    fn request_args_build_a_request() {
        let mut a = args("click");
        a.x = Some(10);
        a.y = Some(20);
        let request = a.to_request();
        assert_eq!(request.action(), &ActionKind::Click);
        assert_eq!(request.os(), Some(&OsType::Mac));
        let point = request.point().unwrap();
        assert_eq!((point.x, point.y), (10, 20));
    }

    #[test]
    fn checked_request_matches_engine_verdict() {
        let mut a = args("open_app");
        a.target = Some("Notes".to_string());
        let verdict = PolicyEngine::with_default_rules().evaluate(&a.to_request());
        assert!(verdict.allowed);
    }

    #[test]
    fn resource_flag_is_not_whitelisted_as_an_app() {
        let mut a = args("open_url");
        a.resource = Some("https://example.com".to_string());
        let request = a.to_request();
        assert_eq!(request.target(), None);
        assert_eq!(request.resource(), Some("https://example.com"));
        assert!(PolicyEngine::with_default_rules().evaluate(&request).allowed);
    }
}
