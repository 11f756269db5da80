// audit.rs — Audit subcommands: verify, search, export, stats, tail.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use neura_audit::{
    parse_since, Disposition, ExportFormat, ExportRange, Journal, JournalEntry, JournalQuery,
};
use neura_pipeline::NeuraConfig;
use uuid::Uuid;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the journal's hash chain.
    Verify {
        /// Path to the journal (defaults to .neura/journal.jsonl).
        #[arg(long)]
        journal: Option<PathBuf>,
    },
    /// Find entries matching filters.
    Search {
        #[arg(long)]
        journal: Option<PathBuf>,
        /// Only entries at or after this time (e.g. 2h, 7d, yesterday, 2026-01-31).
        #[arg(long)]
        since: Option<String>,
        /// Only entries before this time.
        #[arg(long)]
        until: Option<String>,
        /// Action kind.
        #[arg(long)]
        action: Option<String>,
        /// denied, confirmation_rejected, confirmation_timed_out, succeeded, failed.
        #[arg(long)]
        disposition: Option<String>,
        /// A single request id.
        #[arg(long)]
        request: Option<Uuid>,
        /// Keep the most recent N matches.
        #[arg(long)]
        limit: Option<usize>,
        /// Print matches as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Export entries with their chain anchor for offline verification.
    Export {
        #[arg(long)]
        journal: Option<PathBuf>,
        /// json or jsonl.
        #[arg(long, default_value = "json")]
        format: String,
        /// First sequence number to include.
        #[arg(long)]
        from_seq: Option<u64>,
        /// Last sequence number to include.
        #[arg(long)]
        to_seq: Option<u64>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Summarise the journal.
    Stats {
        #[arg(long)]
        journal: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show the most recent entries.
    Tail {
        #[arg(long)]
        journal: Option<PathBuf>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, config: &NeuraConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { journal } => {
            let path = journal_path(journal, config);
            if !path.exists() {
                println!("No journal found at {}", path.display());
                return Ok(());
            }

            let report = Journal::verify_path(&path)?;
            if report.ok {
                println!(
                    "Journal verified: {} entr{}, hash chain intact.",
                    report.entries_checked,
                    if report.entries_checked == 1 { "y" } else { "ies" }
                );
                if let Some(head) = &report.head_hash {
                    println!("Head: {}", head);
                }
                return Ok(());
            }

            if let Some(broken) = &report.first_broken {
                println!("INTEGRITY VIOLATION at line {} ({}):", broken.line, broken.kind);
                if let Some(id) = broken.entry_id {
                    println!("  Entry:  {}", id);
                }
                println!("  Detail: {}", broken.detail);
                println!();
                println!(
                    "{} entr{} before it verified. The journal may have been tampered with.",
                    report.entries_checked,
                    if report.entries_checked == 1 { "y" } else { "ies" }
                );
            }
            report.into_result()?;
        }

        AuditCommands::Search {
            journal,
            since,
            until,
            action,
            disposition,
            request,
            limit,
            json,
        } => {
            let journal = open_journal(&journal_path(journal, config))?;
            let mut query = JournalQuery::default();
            if let Some(spec) = since {
                query = query.with_since(parse_since(spec, Utc::now())?);
            }
            if let Some(spec) = until {
                query = query.with_until(parse_since(spec, Utc::now())?);
            }
            if let Some(action) = action {
                query = query.with_action(action.as_str());
            }
            if let Some(disposition) = disposition {
                let disposition: Disposition = disposition
                    .parse()
                    .map_err(|e| anyhow::anyhow!("{}", e))?;
                query = query.with_disposition(disposition);
            }
            if let Some(id) = request {
                query = query.with_request_id(*id);
            }
            if let Some(limit) = limit {
                query = query.with_limit(*limit);
            }

            let entries = journal.search(&query)?;
            if *json {
                for entry in &entries {
                    println!("{}", serde_json::to_string(entry)?);
                }
            } else if entries.is_empty() {
                println!("No matching entries.");
            } else {
                print_table(&entries);
            }
        }

        AuditCommands::Export {
            journal,
            format,
            from_seq,
            to_seq,
            since,
            until,
            output,
        } => {
            let journal = open_journal(&journal_path(journal, config))?;
            let format: ExportFormat = format.parse().map_err(|e| anyhow::anyhow!("{}", e))?;
            let range = ExportRange {
                from_seq: *from_seq,
                to_seq: *to_seq,
                since: since
                    .as_deref()
                    .map(|s| parse_since(s, Utc::now()))
                    .transpose()?,
                until: until
                    .as_deref()
                    .map(|s| parse_since(s, Utc::now()))
                    .transpose()?,
            };

            let bytes = journal.export(&range, format)?;
            match output {
                Some(path) => {
                    std::fs::write(path, &bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Exported to {}", path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }

        AuditCommands::Stats { journal, json } => {
            let journal = open_journal(&journal_path(journal, config))?;
            let stats = journal.stats()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("Entries:   {}", stats.total);
            if let (Some(first), Some(last)) = (stats.first_timestamp, stats.last_timestamp) {
                println!(
                    "Span:      {} .. {}",
                    first.format("%Y-%m-%d %H:%M:%S"),
                    last.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("Executed:  {} ({} succeeded)", stats.executed, stats.succeeded);
            if let Some(rate) = stats.success_rate {
                println!("Success:   {:.1}%", rate * 100.0);
            }
            println!();
            println!("By disposition:");
            for (disposition, count) in &stats.by_disposition {
                println!("  {:<24} {}", disposition, count);
            }
            println!("By action:");
            for (action, count) in &stats.by_action {
                println!("  {:<24} {}", action, count);
            }
        }

        AuditCommands::Tail { journal, n } => {
            let path = journal_path(journal, config);
            if !path.exists() {
                println!("No journal found at {}", path.display());
                return Ok(());
            }
            let journal = open_journal(&path)?;
            let entries = journal.search(&JournalQuery::default().with_limit(*n))?;
            if entries.is_empty() {
                println!("No journal entries.");
                return Ok(());
            }
            print_table(&entries);
        }
    }

    Ok(())
}

fn journal_path(flag: &Option<PathBuf>, config: &NeuraConfig) -> PathBuf {
    flag.clone().unwrap_or_else(|| config.journal_file())
}

fn open_journal(path: &std::path::Path) -> anyhow::Result<Journal> {
    Journal::open(path).with_context(|| format!("failed to open journal {}", path.display()))
}

fn print_table(entries: &[JournalEntry]) {
    println!(
        "{:<6} {:<20} {:<14} {:<24} TARGET",
        "SEQ", "TIMESTAMP", "ACTION", "DISPOSITION"
    );
    println!("{}", "-".repeat(80));
    for entry in entries {
        println!(
            "{:<6} {:<20} {:<14} {:<24} {}",
            entry.seq,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.request.action().as_str(),
            entry.disposition.as_str(),
            entry
                .request
                .resource()
                .or(entry.request.target())
                .unwrap_or("-"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neura_audit::NewEntry;
    use neura_policy::{ActionKind, ActionRequest, PolicyEngine};
    use tempfile::TempDir;

    fn seeded_project() -> (TempDir, NeuraConfig) {
        let project = TempDir::new().unwrap();
        let config = NeuraConfig::for_project(project.path());
        let journal = Journal::open(config.journal_file()).unwrap().with_fsync(false);
        let engine = PolicyEngine::with_default_rules();
        for _ in 0..3 {
            let request = ActionRequest::new(ActionKind::ExecuteCommand).with_payload("ls");
            let verdict = engine.evaluate(&request);
            journal.append(NewEntry::denied(request, verdict)).unwrap();
        }
        (project, config)
    }

    #[test]
    fn verify_passes_on_untouched_journal() {
        let (_project, config) = seeded_project();
        execute(&AuditCommands::Verify { journal: None }, &config).unwrap();
    }

    #[test]
    fn verify_fails_on_tampered_journal() {
        let (_project, config) = seeded_project();
        let path = config.journal_file();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replacen("\"ls\"", "\"pwd\"", 1)).unwrap();

        let result = execute(&AuditCommands::Verify { journal: None }, &config);
        assert!(result.is_err());
    }

    #[test]
    fn export_writes_requested_file() {
        let (project, config) = seeded_project();
        let output = project.path().join("export.jsonl");
        execute(
            &AuditCommands::Export {
                journal: None,
                format: "jsonl".to_string(),
                from_seq: None,
                to_seq: None,
                since: None,
                until: None,
                output: Some(output.clone()),
            },
            &config,
        )
        .unwrap();
        let exported = std::fs::read(&output).unwrap();
        assert_eq!(exported, std::fs::read(config.journal_file()).unwrap());
    }

    #[test]
    fn search_rejects_unknown_disposition() {
        let (_project, config) = seeded_project();
        let result = execute(
            &AuditCommands::Search {
                journal: None,
                since: None,
                until: None,
                action: None,
                disposition: Some("exploded".to_string()),
                request: None,
                limit: None,
                json: false,
            },
            &config,
        );
        assert!(result.is_err());
    }
}
