//! # neura-pipeline
//!
//! The action-authorization pipeline: every action an assistant wants to
//! perform goes through
//!
//! ```text
//! ActionRequest → PolicyEngine → (ConfirmationGate) → Dispatcher → Journal
//! ```
//!
//! - Policy denials never reach an executor.
//! - Actions that need confirmation wait (without blocking other requests)
//!   until a human approves, rejects, or the prompt times out.
//! - Every request ends in exactly one hash-chained journal entry, whatever
//!   path it took.
//! - Nothing is dispatched while the journal cannot be written.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use neura_pipeline::{ActionPipeline, Completion, NeuraConfig};
//! use neura_policy::{ActionKind, ActionRequest, OsType};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NeuraConfig::load_or_default(".")?;
//! let pipeline = ActionPipeline::from_config(&config)?;
//!
//! let request = ActionRequest::new(ActionKind::OpenApp)
//!     .with_target("Notes")
//!     .with_os(OsType::Mac);
//! match pipeline.run(request).await? {
//!     Completion::Executed { outcome, .. } => println!("ran: {}", outcome.success),
//!     Completion::Denied { reason, .. } => println!("denied: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;

pub use config::{
    ConfirmationSettings, DispatchSettings, JournalSettings, NeuraConfig, CONFIG_FILE, NEURA_DIR,
};
pub use error::{GateError, PipelineError};
pub use gate::{
    prompt_message, ConfirmationGate, ConfirmationNotifier, ConfirmationOutcome,
    ConfirmationPrompt, Decision, LogNotifier, PendingConfirmation,
};
pub use pipeline::{ActionPipeline, Completion, PendingAction, Submission};
