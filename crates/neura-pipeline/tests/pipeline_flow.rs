// pipeline_flow.rs — End-to-end request flows through policy, confirmation,
// dispatch and the journal, using the dry-run executor.

use std::sync::Arc;
use std::time::Duration;

use tempfile::{tempdir, TempDir};

use neura_audit::{BreakKind, Disposition, Journal, JournalQuery};
use neura_motor::{DispatchConfig, Dispatcher, DryRunExecutor, ExecutorRegistry};
use neura_pipeline::{
    ActionPipeline, Completion, ConfirmationGate, Decision, NeuraConfig, PipelineError,
    Submission,
};
use neura_policy::{ActionKind, ActionRequest, OsType, PolicyEngine};

struct Harness {
    _dir: TempDir,
    pipeline: ActionPipeline,
    executor: DryRunExecutor,
    journal_path: std::path::PathBuf,
}

fn harness_with(executor: DryRunExecutor, dispatch: DispatchConfig, expiry: Duration) -> Harness {
    let dir = tempdir().unwrap();
    let journal_path = dir.path().join("journal.jsonl");
    let journal = Journal::open(&journal_path).unwrap().with_fsync(false);
    let dispatcher = Dispatcher::new(ExecutorRegistry::dry_run(executor.clone()), dispatch);
    let pipeline = ActionPipeline::new(
        PolicyEngine::with_default_rules(),
        ConfirmationGate::new(expiry),
        dispatcher,
        Arc::new(journal),
    );
    Harness {
        _dir: dir,
        pipeline,
        executor,
        journal_path,
    }
}

fn harness() -> Harness {
    harness_with(
        DryRunExecutor::new(),
        DispatchConfig::default(),
        Duration::from_secs(5),
    )
}

fn type_text(text: &str) -> ActionRequest {
    ActionRequest::new(ActionKind::TypeText).with_payload(text)
}

#[tokio::test]
async fn raw_command_is_denied_and_never_dispatched() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::ExecuteCommand).with_payload("ls -la");

    let completion = h.pipeline.run(request).await.unwrap();
    match &completion {
        Completion::Denied { reason, .. } => assert!(reason.contains("execute_command")),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(completion.disposition(), Disposition::Denied);
    assert!(h.executor.history().is_empty());
}

#[tokio::test]
async fn whitelisted_app_runs_and_is_journaled() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::OpenApp)
        .with_target("Notes")
        .with_os(OsType::Mac);
    let request_id = request.request_id();

    let completion = h.pipeline.run(request).await.unwrap();
    assert!(completion.is_success());
    assert_eq!(completion.disposition(), Disposition::Succeeded);

    let history = h.executor.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].request_id, request_id);

    let entries = h.pipeline.journal().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request_id(), request_id);
    let outcome = entries[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.executor, "dry_run");
}

#[tokio::test]
async fn unlisted_app_is_denied() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::OpenApp)
        .with_target("Malware")
        .with_os(OsType::Mac);

    let completion = h.pipeline.run(request).await.unwrap();
    match completion {
        Completion::Denied { verdict, .. } => {
            assert!(!verdict.allowed);
            assert!(verdict.reason.contains("Malware"));
        }
        other => panic!("expected denial, got {:?}", other),
    }
    assert!(h.executor.history().is_empty());
}

#[tokio::test]
async fn forbidden_payload_is_denied() {
    let h = harness();
    let completion = h.pipeline.run(type_text("rm -rf /")).await.unwrap();
    assert_eq!(completion.disposition(), Disposition::Denied);
    assert!(h.executor.history().is_empty());
}

#[tokio::test]
async fn critical_request_needs_prior_approval() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::OpenApp)
        .with_target("Notes")
        .with_os(OsType::Mac)
        .critical(true);

    let completion = h.pipeline.run(request).await.unwrap();
    assert_eq!(completion.disposition(), Disposition::Denied);

    let approved = ActionRequest::new(ActionKind::OpenApp)
        .with_target("Notes")
        .with_os(OsType::Mac)
        .critical(true)
        .approved(true);
    assert!(h.pipeline.run(approved).await.unwrap().is_success());
}

#[tokio::test]
async fn approved_confirmation_dispatches() {
    let h = harness();
    let request = type_text("hello world");

    let pending = match h.pipeline.submit(request).await.unwrap() {
        Submission::AwaitingConfirmation(pending) => pending,
        Submission::Finished(c) => panic!("expected confirmation, got {:?}", c),
    };
    assert_eq!(h.pipeline.pending_confirmations().len(), 1);
    assert!(h.executor.history().is_empty());

    h.pipeline.confirm(pending.handle(), Decision::Approve).unwrap();
    let completion = pending.finish().await.unwrap();
    assert!(completion.is_success());

    let entry = completion.entry();
    let record = entry.confirmation.as_ref().unwrap();
    assert_eq!(record.decision, neura_audit::ConfirmationDecision::Approved);
    assert!(h.pipeline.pending_confirmations().is_empty());
    assert_eq!(h.executor.history().len(), 1);
}

#[tokio::test]
async fn confirmed_email_reaches_the_executor() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::SendEmail)
        .with_resource("bob@example.com")
        .with_payload("see you at noon");

    let pending = match h.pipeline.submit(request).await.unwrap() {
        Submission::AwaitingConfirmation(pending) => pending,
        Submission::Finished(c) => panic!("expected confirmation, got {:?}", c),
    };
    assert_eq!(
        pending.prompt().unwrap().message,
        "Send email to bob@example.com?"
    );

    h.pipeline.confirm(pending.handle(), Decision::Approve).unwrap();
    let completion = pending.finish().await.unwrap();
    assert!(completion.is_success(), "{:?}", completion);
    assert_eq!(completion.disposition(), Disposition::Succeeded);
    assert_eq!(
        completion.entry().request.resource(),
        Some("bob@example.com")
    );
    assert_eq!(h.executor.history().len(), 1);
}

#[tokio::test]
async fn url_opens_without_an_app_whitelist_entry() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::OpenUrl)
        .with_resource("https://example.com")
        .with_os(OsType::Linux);

    let completion = h.pipeline.run(request).await.unwrap();
    assert!(completion.is_success(), "{:?}", completion);
    assert_eq!(h.executor.history().len(), 1);
}

#[tokio::test]
async fn system_path_resource_is_denied() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::DeleteFile).with_resource("/etc/hosts");

    let completion = h.pipeline.run(request).await.unwrap();
    assert_eq!(completion.disposition(), Disposition::Denied);
    assert!(h.executor.history().is_empty());
}

#[tokio::test]
async fn rejected_confirmation_is_journaled_without_dispatch() {
    let h = harness();
    let pending = match h.pipeline.submit(type_text("hello")).await.unwrap() {
        Submission::AwaitingConfirmation(pending) => pending,
        Submission::Finished(c) => panic!("expected confirmation, got {:?}", c),
    };

    h.pipeline
        .confirm(pending.handle(), Decision::reject("not now"))
        .unwrap();
    let completion = pending.finish().await.unwrap();
    match &completion {
        Completion::Denied { reason, .. } => assert_eq!(reason, "confirmation rejected: not now"),
        other => panic!("expected denial, got {:?}", other),
    }
    assert_eq!(completion.disposition(), Disposition::ConfirmationRejected);
    assert!(h.executor.history().is_empty());
}

#[tokio::test]
async fn unanswered_confirmation_times_out() {
    let h = harness_with(
        DryRunExecutor::new(),
        DispatchConfig::default(),
        Duration::from_millis(50),
    );

    let completion = h.pipeline.run(type_text("hello")).await.unwrap();
    assert_eq!(completion.disposition(), Disposition::ConfirmationTimedOut);
    assert!(h.executor.history().is_empty());
    assert!(h.pipeline.pending_confirmations().is_empty());
}

#[tokio::test]
async fn dropped_pending_action_is_journaled_as_abandoned() {
    let h = harness();
    let request = type_text("hello");
    let request_id = request.request_id();

    match h.pipeline.submit(request).await.unwrap() {
        Submission::AwaitingConfirmation(pending) => drop(pending),
        Submission::Finished(c) => panic!("expected confirmation, got {:?}", c),
    }

    let entries = h.pipeline.journal().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request_id(), request_id);
    assert_eq!(entries[0].disposition, Disposition::ConfirmationRejected);
    let record = entries[0].confirmation.as_ref().unwrap();
    assert_eq!(record.reason.as_deref(), Some("confirmation abandoned"));
    assert!(h.pipeline.pending_confirmations().is_empty());
}

#[tokio::test]
async fn answering_an_unknown_handle_fails() {
    let h = harness();
    let err = h
        .pipeline
        .confirm(uuid::Uuid::new_v4(), Decision::Approve)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Gate(_)));
}

#[tokio::test]
async fn resubmitting_a_request_is_refused() {
    let h = harness();
    let request = ActionRequest::new(ActionKind::GetBattery);

    h.pipeline.run(request.clone()).await.unwrap();
    let err = h.pipeline.run(request.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateRequest(id) if id == request.request_id()));
    assert_eq!(h.pipeline.journal().entries().unwrap().len(), 1);
}

#[tokio::test]
async fn request_awaiting_confirmation_cannot_be_resubmitted() {
    let h = harness();
    let request = type_text("hello");

    let pending = match h.pipeline.submit(request.clone()).await.unwrap() {
        Submission::AwaitingConfirmation(pending) => pending,
        Submission::Finished(c) => panic!("expected confirmation, got {:?}", c),
    };
    let err = h.pipeline.submit(request).await.unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateRequest(_)));
    drop(pending);
}

#[tokio::test]
async fn every_request_gets_exactly_one_entry() {
    let h = harness_with(
        DryRunExecutor::new(),
        DispatchConfig::default(),
        Duration::from_millis(30),
    );
    let requests = vec![
        ActionRequest::new(ActionKind::ExecuteCommand).with_payload("whoami"),
        ActionRequest::new(ActionKind::OpenApp)
            .with_target("Calculator")
            .with_os(OsType::Mac),
        ActionRequest::new(ActionKind::OpenApp).with_target("Notes"),
        type_text("unanswered"),
        ActionRequest::new(ActionKind::ListFiles),
    ];
    let ids: Vec<_> = requests.iter().map(|r| r.request_id()).collect();

    for request in requests {
        h.pipeline.run(request).await.unwrap();
    }

    let entries = h.pipeline.journal().entries().unwrap();
    assert_eq!(entries.len(), ids.len());
    for id in ids {
        let found = h
            .pipeline
            .journal()
            .search(&JournalQuery::default().with_request_id(id))
            .unwrap();
        assert_eq!(found.len(), 1, "request {} journaled {} times", id, found.len());
    }
    assert!(h.pipeline.journal().verify_integrity().unwrap().ok);
}

#[tokio::test]
async fn dispatch_timeout_is_journaled_as_failed() {
    let h = harness_with(
        DryRunExecutor::new().with_delay(Duration::from_millis(500)),
        DispatchConfig::default().with_default_timeout(Duration::from_millis(50)),
        Duration::from_secs(5),
    );

    let completion = h
        .pipeline
        .run(ActionRequest::new(ActionKind::GetVolume))
        .await
        .unwrap();
    assert_eq!(completion.disposition(), Disposition::Failed);
    match completion {
        Completion::Executed { outcome, .. } => {
            assert!(!outcome.success);
            assert!(outcome.error.unwrap_or_default().contains("timed out"));
        }
        other => panic!("expected failed execution, got {:?}", other),
    }
}

#[tokio::test]
async fn cancelled_dispatch_is_journaled_as_failed() {
    let h = harness_with(
        DryRunExecutor::new().with_delay(Duration::from_secs(5)),
        DispatchConfig::default(),
        Duration::from_secs(5),
    );
    let request = ActionRequest::new(ActionKind::GetBattery);
    let request_id = request.request_id();

    let run = h.pipeline.run(request);
    let cancelled = tokio::time::timeout(Duration::from_millis(50), run).await;
    assert!(cancelled.is_err());

    let entries = h.pipeline.journal().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request_id(), request_id);
    assert_eq!(entries[0].disposition, Disposition::Failed);
    let outcome = entries[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.error.as_deref(), Some("cancelled before completion"));
}

#[tokio::test]
async fn concurrent_requests_keep_the_chain_intact() {
    let h = harness();
    let mut tasks = Vec::new();
    for i in 0..20 {
        let pipeline = h.pipeline.clone();
        tasks.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                ActionRequest::new(ActionKind::GetVolume)
            } else {
                ActionRequest::new(ActionKind::ExecuteCommand).with_payload("id")
            };
            pipeline.run(request).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let report = Journal::verify_path(&h.journal_path).unwrap();
    assert!(report.ok);
    assert_eq!(report.entries_checked, 20);
    assert_eq!(h.executor.history().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fsynced_appends_keep_every_outcome() {
    let dir = tempdir().unwrap();
    let journal_path = dir.path().join("journal.jsonl");
    let executor = DryRunExecutor::new();
    let pipeline = ActionPipeline::new(
        PolicyEngine::with_default_rules(),
        ConfirmationGate::new(Duration::from_secs(5)),
        Dispatcher::new(
            ExecutorRegistry::dry_run(executor.clone()),
            DispatchConfig::default(),
        ),
        Arc::new(Journal::open(&journal_path).unwrap().with_fsync(true)),
    );

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pipeline = pipeline.clone();
        tasks.push(tokio::spawn(async move {
            let request = if i % 2 == 0 {
                ActionRequest::new(ActionKind::GetBattery)
            } else {
                ActionRequest::new(ActionKind::DeleteAll)
            };
            pipeline.run(request).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let report = pipeline.journal().verify_integrity().unwrap();
    assert!(report.ok, "{:?}", report.first_broken);
    assert_eq!(report.entries_checked, 8);
    assert_eq!(executor.history().len(), 4);
}

#[tokio::test]
async fn tampered_journal_fails_verification() {
    let h = harness();
    for _ in 0..3 {
        h.pipeline
            .run(ActionRequest::new(ActionKind::GetBattery))
            .await
            .unwrap();
    }

    let content = std::fs::read_to_string(&h.journal_path).unwrap();
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    lines[1] = lines[1].replace("get_battery", "get_volume");
    std::fs::write(&h.journal_path, lines.join("\n") + "\n").unwrap();

    let report = Journal::verify_path(&h.journal_path).unwrap();
    assert!(!report.ok);
    let broken = report.first_broken.unwrap();
    assert_eq!(broken.line, 2);
    assert_eq!(broken.kind, BreakKind::HashMismatch);
}

#[tokio::test]
async fn pipeline_from_config_uses_dry_run_and_project_journal() {
    let dir = tempdir().unwrap();
    let mut config = NeuraConfig::for_project(dir.path());
    config.dispatch.dry_run = true;
    config.journal.fsync = false;

    let pipeline = ActionPipeline::from_config(&config).unwrap();
    let completion = pipeline
        .run(ActionRequest::new(ActionKind::ListEmails))
        .await
        .unwrap();
    assert!(completion.is_success());
    assert!(config.journal_file().exists());
    assert_eq!(pipeline.journal().entries().unwrap().len(), 1);
}
