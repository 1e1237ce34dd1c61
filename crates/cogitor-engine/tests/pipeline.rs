//! End-to-end pipeline scenarios: query in, files and reports out, with a
//! scripted LLM backend standing in for the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cogitor_engine::{
    AutoPilot, Config, EngineError, LlmBackend, QueryOutcome, Session, SessionStore,
};
use cogitor_patch::PathSandbox;
use cogitor_runtime::{ChatRequest, ProviderError, ProviderKind};
use tempfile::TempDir;

/// Replays queued replies, recording every prompt it saw.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn send(
        &self,
        scope: &CancellationToken,
        _kind: &ProviderKind,
        req: ChatRequest,
    ) -> Result<String, ProviderError> {
        if scope.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.seen.lock().unwrap().push(req.message);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ProviderError::MockQueueEmpty)
    }
}

/// Never answers; returns only when the scope is tripped.
struct HangingBackend;

#[async_trait]
impl LlmBackend for HangingBackend {
    async fn send(
        &self,
        scope: &CancellationToken,
        _kind: &ProviderKind,
        _req: ChatRequest,
    ) -> Result<String, ProviderError> {
        scope.cancelled().await;
        Err(ProviderError::Cancelled)
    }
}

fn session_with(dir: &TempDir, backend: Box<dyn LlmBackend>) -> Arc<Session> {
    Session::with_backend(
        ProviderKind::Ollama,
        "test-model",
        None,
        Config::default(),
        PathSandbox::new(dir.path()).unwrap(),
        SessionStore::new(dir.path().join(".cogitor-sessions")),
        backend,
    )
    .unwrap()
}

#[tokio::test]
async fn prose_reply_passes_through_and_grows_history() {
    let dir = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(&["Use a binary search here."]);
    let session = session_with(&dir, Box::new(backend));

    let outcome = session
        .process_query("how do I find an item fast?", true, &AutoPilot)
        .await
        .unwrap();

    match outcome {
        QueryOutcome::Prose { text } => assert_eq!(text, "Use a binary search here."),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(session.history.len().await, 1);
}

#[tokio::test]
async fn commands_are_forwarded_not_processed() {
    let dir = TempDir::new().unwrap();
    let session = session_with(&dir, Box::new(ScriptedBackend::default()));

    let outcome = session.process_query(":stats", true, &AutoPilot).await.unwrap();
    match outcome {
        QueryOutcome::Command { raw } => assert_eq!(raw, ":stats"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // No LLM call, no history entry.
    assert_eq!(session.history.len().await, 0);
}

#[tokio::test]
async fn whole_file_generation_writes_builds_and_records_history() {
    let dir = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(&["--- File: hello.py ---\nprint(\"hi\")\n"]);
    let session = session_with(&dir, Box::new(backend));

    let outcome = session
        .process_query("$cod write hello world in python", false, &AutoPilot)
        .await
        .unwrap();

    let report = match outcome {
        QueryOutcome::CodeGeneration(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.written, vec!["hello.py"]);
    assert!(report.skipped.is_empty());
    assert!(report.run_error.is_none(), "run failed: {:?}", report.run_error);
    assert!(report.run_output.as_deref().unwrap_or("").contains("hi"));

    let on_disk = std::fs::read_to_string(dir.path().join("hello.py")).unwrap();
    assert_eq!(on_disk, "print(\"hi\")");
    assert_eq!(session.history.len().await, 1);
}

#[tokio::test]
async fn generation_outside_the_sandbox_is_skipped() {
    let dir = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(&[concat!(
        "--- File: ../escape.py ---\n",
        "print('nope')\n",
        "--- File: safe.txt ---\n",
        "kept\n",
    )]);
    let session = session_with(&dir, Box::new(backend));

    let outcome = session
        .process_query("$cod make files", true, &AutoPilot)
        .await
        .unwrap();

    let report = match outcome {
        QueryOutcome::CodeGeneration(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.written, vec!["safe.txt"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path, "../escape.py");
    assert!(!dir.path().parent().unwrap().join("escape.py").exists());
}

#[tokio::test]
async fn diff_apply_reports_partial_success() {
    let dir = TempDir::new().unwrap();
    let content: String = (0..20).map(|i| format!("line{i}\n")).collect();
    std::fs::write(dir.path().join("a.txt"), &content).unwrap();

    // Block one matches exactly; block two only at 50% and is rejected.
    let reply = concat!(
        "--- Diff: a.txt ---\n",
        "Original lines 3-4:\n",
        "line2\n",
        "line3\n",
        "Modified:\n",
        "LINE2\n",
        "LINE3\n",
        "--- Diff: a.txt ---\n",
        "Original lines 9-10:\n",
        "line8\n",
        "never-was-here\n",
        "Modified:\n",
        "x\n",
        "y\n",
    );
    let backend = ScriptedBackend::new(&[reply]);
    let session = session_with(&dir, Box::new(backend));

    let outcome = session
        .process_query("$diff upcase some lines @a.txt", true, &AutoPilot)
        .await
        .unwrap();

    let report = match outcome {
        QueryOutcome::DiffApplied(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.applied(), 1);
    assert_eq!(report.total(), 2);
    assert_eq!(report.files[0].warnings.len(), 1);
    assert!(report.check_errors.is_empty());

    let updated = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
    assert!(updated.contains("LINE2"));
    assert!(updated.contains("line8"));
    assert_eq!(session.history.len().await, 1);
}

#[tokio::test]
async fn diff_without_file_references_is_rejected() {
    let dir = TempDir::new().unwrap();
    let session = session_with(&dir, Box::new(ScriptedBackend::default()));

    let err = session
        .process_query("$diff fix whatever", true, &AutoPilot)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoReferencesResolved));
}

#[tokio::test]
async fn diff_sandbox_violation_spares_other_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("ok.txt"), "keep me\n").unwrap();

    let reply = concat!(
        "--- Diff: ../outside.txt ---\n",
        "Original lines 1-1:\n",
        "anything\n",
        "Modified:\n",
        "evil\n",
        "--- Diff: ok.txt ---\n",
        "Original lines 1-1:\n",
        "keep me\n",
        "Modified:\n",
        "kept you\n",
    );
    let backend = ScriptedBackend::new(&[reply]);
    let session = session_with(&dir, Box::new(backend));

    let outcome = session
        .process_query("$diff adjust @ok.txt @../outside.txt", true, &AutoPilot)
        .await
        .unwrap();

    let report = match outcome {
        QueryOutcome::DiffApplied(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "../outside.txt");
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].applied, 1);

    let kept = std::fs::read_to_string(dir.path().join("ok.txt")).unwrap();
    assert!(kept.contains("kept you"));
    assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
}

#[tokio::test]
async fn cancellation_mid_llm_aborts_cleanly() {
    let dir = TempDir::new().unwrap();
    let session = session_with(&dir, Box::new(HangingBackend));

    let worker = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session
                .process_query("explain the borrow checker", true, &AutoPilot)
                .await
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(session.cancel_active_request());

    let result = worker.await.unwrap();
    assert!(matches!(result, Err(EngineError::CancelledByUser)));
    assert_eq!(session.history.len().await, 0);
    assert!(!session.has_active_request());
}

#[tokio::test]
async fn new_request_cancels_the_previous_one() {
    let dir = TempDir::new().unwrap();
    let session = session_with(&dir, Box::new(HangingBackend));

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session
                .process_query("first long question", true, &AutoPilot)
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // A $diff query with no references fails fast, but entering it still
    // installs a fresh scope and cancels the in-flight request.
    let second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session
                .process_query("$diff no references here", true, &AutoPilot)
                .await
        })
    };

    let first_result = first.await.unwrap();
    assert!(matches!(first_result, Err(EngineError::CancelledByUser)));
    let second_result = second.await.unwrap();
    assert!(matches!(
        second_result,
        Err(EngineError::NoReferencesResolved)
    ));
}

#[tokio::test]
async fn internet_request_rejects_non_url_replies() {
    let dir = TempDir::new().unwrap();
    let backend = ScriptedBackend::new(&["sorry, I don't know that site"]);
    let session = session_with(&dir, Box::new(backend));

    let err = session
        .process_query("$int open the rust homepage", true, &AutoPilot)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ParseFailed(_)));
    assert_eq!(session.history.len().await, 0);
}
