// run.rs — Send one action through the pipeline, confirming on the terminal.

use std::io::{BufRead, Write};

use clap::Args;
use neura_pipeline::{
    ActionPipeline, Completion, ConfirmationPrompt, Decision, NeuraConfig, Submission,
};

use super::policy::RequestArgs;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub request: RequestArgs,
    /// Route the action to the dry-run executor instead of the real one.
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: &RunArgs, mut config: NeuraConfig) -> anyhow::Result<()> {
    if args.dry_run {
        config.dispatch.dry_run = true;
    }
    let pipeline = ActionPipeline::from_config(&config)?;
    let request = args.request.to_request();
    let request_id = request.request_id();

    let completion = match pipeline.submit(request).await? {
        Submission::Finished(completion) => completion,
        Submission::AwaitingConfirmation(pending) => {
            if let Some(prompt) = pending.prompt().cloned() {
                let answering = pipeline.clone();
                // A plain thread so an unanswered prompt cannot hold up exit.
                std::thread::spawn(move || {
                    let decision = ask_terminal(&prompt);
                    if let Err(e) = answering.confirm(prompt.handle, decision) {
                        tracing::warn!(handle = %prompt.handle, error = %e, "answer not accepted");
                    }
                });
            }
            pending.finish().await?
        }
    };

    print_completion(request_id, &completion);
    Ok(())
}

/// Ask on stdin; critical prompts are asked twice.
fn ask_terminal(prompt: &ConfirmationPrompt) -> Decision {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stderr();
    decide(prompt, &mut input, &mut output)
}

fn decide(prompt: &ConfirmationPrompt, input: &mut impl BufRead, output: &mut impl Write) -> Decision {
    if !prompt.payload_preview.is_empty() {
        let _ = writeln!(output, "  payload: {}", prompt.payload_preview);
    }
    if !ask(&format!("{} [y/N] ", prompt.message), input, output) {
        return Decision::reject("declined at terminal");
    }
    if prompt.double_check && !ask("Are you absolutely sure? [y/N] ", input, output) {
        return Decision::reject("declined at second confirmation");
    }
    Decision::Approve
}

fn ask(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    let _ = write!(output, "{}", question);
    let _ = output.flush();
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
    }
}

fn print_completion(request_id: uuid::Uuid, completion: &Completion) {
    let entry = completion.entry();
    match completion {
        Completion::Denied { reason, verdict, .. } => {
            println!("DENIED ({}): {}", entry.disposition, reason);
            println!("Risk: {}", verdict.risk_level);
        }
        Completion::Executed { outcome, .. } => {
            if outcome.success {
                println!("OK via {} in {}ms", outcome.executor, outcome.duration_ms);
                if let Some(out) = outcome.output.as_deref().filter(|o| !o.is_empty()) {
                    println!("{}", out);
                }
            } else {
                println!(
                    "FAILED via {}: {}",
                    outcome.executor,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    println!("Request {} journaled as entry #{}", request_id, entry.seq);
}
