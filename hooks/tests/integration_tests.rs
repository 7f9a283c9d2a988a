//! Integration tests for the hook system
//!
//! Drives `add_hooks` end to end: pattern resolution, trusted and sandboxed
//! loading, inline hook sources, worker delegation and dispatch.

use contract_hooks::HookOrchestrator;
use contract_hooks::HookPhase;
use contract_hooks::HookRegistry;
use contract_hooks::HookRunner;
use contract_hooks::HookfilesPattern;
use contract_hooks::HooksConfig;
use contract_hooks::HooksError;
use contract_hooks::NoExchange;
use contract_hooks::RunnerContext;
use contract_hooks::WorkerConfig;
use contract_hooks::WorkerState;
use contract_hooks::add_hooks;
use contract_hooks::config::HookLanguage;
use contract_hooks::loader::HookLoader;
use contract_hooks::loader::SourceUnit;
use contract_hooks_protocol::Transaction;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

const GROUPLESS: &str = " > Machines collection > Get Machines";
const FIXED: &str = "Machines collection > Get Machines";

#[derive(Debug, Default)]
struct CountingLoader {
    calls: AtomicUsize,
}

impl HookLoader for CountingLoader {
    fn load(&self, _unit: &SourceUnit, _registry: &mut HookRegistry) -> Result<(), HooksError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn write(dir: &TempDir, name: &str, code: &str) {
    std::fs::write(dir.path().join(name), code).unwrap();
}

fn transactions() -> Vec<Transaction> {
    vec![
        Transaction::new("Machines > Machines collection > Get Machines"),
        Transaction::new(GROUPLESS),
    ]
}

fn registry(runner: &RunnerContext) -> &HookRegistry {
    runner.hooks.as_ref().unwrap()
}

fn keys(map: &IndexMap<String, Vec<contract_hooks::HookCallback>>) -> Vec<String> {
    map.keys().cloned().collect()
}

#[tokio::test]
async fn test_registry_shares_runner_logs() {
    let mut runner = RunnerContext::new(HooksConfig::default(), "/");
    runner.logs.push("item");

    add_hooks(&mut runner, &[]).await.unwrap();

    let hooks = registry(&runner);
    assert!(hooks.logs.ptr_eq(&runner.logs));
    assert_eq!(hooks.logs.entries()[0].content, "item");
    assert!(hooks.hooks.is_empty());
}

#[tokio::test]
async fn test_no_pattern_expands_nothing() {
    let mut runner = RunnerContext::new(HooksConfig::default(), "/definitely/not/there");

    add_hooks(&mut runner, &transactions()).await.unwrap();

    let hooks = registry(&runner);
    assert!(hooks.hookfiles.is_empty());
    assert!(hooks.hooks.is_empty());
    assert_eq!(hooks.transactions.len(), 2);
}

#[tokio::test]
async fn test_valid_pattern_resolves_sorted_absolute_paths() {
    let dir = TempDir::new().unwrap();
    write(&dir, "b.star", "");
    write(&dir, "a.star", "");
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::Many(vec![
            "./*.star".to_string(),
            "a.star".to_string(),
        ])),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());

    add_hooks(&mut runner, &[]).await.unwrap();

    assert_eq!(
        registry(&runner).hookfiles,
        vec![dir.path().join("a.star"), dir.path().join("b.star")]
    );
}

#[tokio::test]
async fn test_two_files_hooking_one_transaction_both_run_in_file_order() {
    let dir = TempDir::new().unwrap();
    for (file, label) in [("1-first.star", "first"), ("2-second.star", "second")] {
        write(
            &dir,
            file,
            &format!(
                r#"
def mark(transaction):
    transaction["request"]["trace"].append("{label}")

before("X", mark)
"#
            ),
        );
    }
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("*.star")),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());
    add_hooks(&mut runner, &[]).await.unwrap();

    let mut transaction = Transaction::new("X");
    transaction.request = serde_json::json!({"trace": []});
    HookRunner::new(registry(&runner))
        .run_before(&mut transaction)
        .await;

    assert_eq!(
        transaction.request,
        serde_json::json!({"trace": ["first", "second"]})
    );
}

#[tokio::test]
async fn test_trusted_hooks_see_configuration() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "hooks.star",
        r#"
URL = configuration["custom"]["apiUrl"]

def point(transaction):
    transaction["request"] = {"uri": URL + "/machines"}

before_each(point)
"#,
    );
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("hooks.star")),
        custom: serde_json::json!({"apiUrl": "http://localhost:3000"}),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());
    add_hooks(&mut runner, &[]).await.unwrap();

    let mut transaction = Transaction::new("A");
    HookRunner::new(registry(&runner))
        .run_before(&mut transaction)
        .await;

    assert_eq!(
        transaction.request,
        serde_json::json!({"uri": "http://localhost:3000/machines"})
    );
}

#[tokio::test]
async fn test_trusted_load_error_aborts_but_keeps_earlier_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "1-good.star", r#"before_each(lambda transaction: None)"#);
    write(&dir, "2-bad.star", r#"fail("syntax is fine, logic is not")"#);
    write(&dir, "3-never.star", r#"after_each(lambda transaction: None)"#);
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("*.star")),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());

    let err = add_hooks(&mut runner, &[]).await.unwrap_err();

    assert!(matches!(err, HooksError::Evaluation { .. }));
    let hooks = &registry(&runner).hooks;
    assert_eq!(hooks.before_each.len(), 1);
    assert!(hooks.after_each.is_empty());
}

#[tokio::test]
async fn test_sandboxed_files_are_loaded_from_disk() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "hooks.star",
        r#"
after("some-transaction-name", lambda transaction: None)
before("some-transaction-name", lambda transaction: None)
"#,
    );
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("hooks.star")),
        sandbox: true,
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());

    add_hooks(&mut runner, &[]).await.unwrap();

    let hooks = &registry(&runner).hooks;
    assert_eq!(keys(&hooks.after), vec!["some-transaction-name"]);
    assert_eq!(keys(&hooks.before), vec!["some-transaction-name"]);
}

#[tokio::test]
async fn test_sandboxed_files_cannot_reach_host() {
    let dir = TempDir::new().unwrap();
    write(&dir, "hooks.star", r#"SECRET = getenv("HOME")"#);
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("hooks.star")),
        sandbox: true,
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());

    let err = add_hooks(&mut runner, &[]).await.unwrap_err();

    assert!(err.to_string().contains("getenv"));
}

#[tokio::test]
async fn test_inline_hooks_loaded_in_sandbox() {
    let config = HooksConfig {
        sandbox: true,
        hooks_data: Some(IndexMap::from([(
            "some-filename.star".to_string(),
            r#"
after("some-transaction-name", lambda transaction: None)
before("some-transaction-name", lambda transaction: None)
"#
            .to_string(),
        )])),
        ..Default::default()
    };
    let trusted = Arc::new(CountingLoader::default());
    let mut runner = RunnerContext::new(config, "/");

    HookOrchestrator::new()
        .with_trusted_loader(trusted.clone())
        .add_hooks(&mut runner, &[])
        .await
        .unwrap();

    let hooks = &registry(&runner).hooks;
    assert_eq!(keys(&hooks.after), vec!["some-transaction-name"]);
    assert_eq!(keys(&hooks.before), vec!["some-transaction-name"]);
    assert_eq!(trusted.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_inline_unit_leaves_no_registrations() {
    let config = HooksConfig {
        sandbox: true,
        hooks_data: Some(IndexMap::from([(
            "broken.star".to_string(),
            "before(\"X\", lambda transaction: None)\nfail(\"midway\")\n".to_string(),
        )])),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, "/");

    let err = add_hooks(&mut runner, &[]).await.unwrap_err();

    assert!(err.to_string().contains("broken.star"));
    assert!(registry(&runner).hooks.is_empty());
}

#[tokio::test]
async fn test_inline_hooks_without_sandbox_not_implemented() {
    let config = HooksConfig {
        hooks_data: Some(IndexMap::from([(
            "some-filename.star".to_string(),
            r#"before_all(lambda transactions: None)"#.to_string(),
        )])),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, "/");

    let err = add_hooks(&mut runner, &[]).await.unwrap_err();

    assert!(matches!(err, HooksError::NotImplemented(_)));
    assert!(err.to_string().contains("not implemented"));
}

#[tokio::test]
async fn test_pattern_matching_nothing_ignores_inline_hooks() {
    let dir = TempDir::new().unwrap();
    for sandbox in [false, true] {
        let config = HooksConfig {
            hookfiles: Some(HookfilesPattern::from("*.nothing")),
            sandbox,
            hooks_data: Some(IndexMap::from([(
                "inline.star".to_string(),
                r#"before_all(lambda transactions: None)"#.to_string(),
            )])),
            ..Default::default()
        };
        let sandboxed = Arc::new(CountingLoader::default());
        let mut runner = RunnerContext::new(config, dir.path());

        HookOrchestrator::new()
            .with_sandboxed_loader(sandboxed.clone())
            .add_hooks(&mut runner, &[])
            .await
            .unwrap();

        let hooks = registry(&runner);
        assert!(hooks.hookfiles.is_empty());
        assert!(hooks.hooks.is_empty());
        assert_eq!(sandboxed.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_groupless_names_are_fixed_in_sandbox() {
    let code = format!(
        r#"
def fail_it(transaction):
    transaction["fail"] = "failed in sandboxed hook"

after("{GROUPLESS}", fail_it)
before("{GROUPLESS}", fail_it)
"#
    );
    let config = HooksConfig {
        sandbox: true,
        hooks_data: Some(IndexMap::from([("hookfile.star".to_string(), code)])),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, "/");

    add_hooks(&mut runner, &transactions()).await.unwrap();

    let hooks = &registry(&runner).hooks;
    assert_eq!(keys(&hooks.after), vec![FIXED]);
    assert_eq!(keys(&hooks.before), vec![FIXED]);

    let mut transaction = Transaction::new(GROUPLESS);
    HookRunner::new(registry(&runner))
        .run_after(&mut transaction)
        .await;
    assert_eq!(transaction.fail.as_deref(), Some("failed in sandboxed hook"));
}

#[tokio::test]
async fn test_groupless_names_are_fixed_in_trusted_files() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "groupless-names.star",
        &format!(
            r#"
after("{GROUPLESS}", lambda transaction: None)
before("{GROUPLESS}", lambda transaction: None)
"#
        ),
    );
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("groupless-names.star")),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, dir.path());

    add_hooks(&mut runner, &transactions()).await.unwrap();

    let hooks = &registry(&runner).hooks;
    assert!(!hooks.after.contains_key(GROUPLESS));
    assert_eq!(keys(&hooks.after), vec![FIXED]);
    assert_eq!(hooks.hooks_for(HookPhase::Before, GROUPLESS).len(), 1);
}

/// Echoes the handshake and every request unchanged.
const ECHO_WORKER: &str = r#"while IFS= read -r line; do printf '%s\n' "$line"; done"#;

fn shell_worker(script: &str, request_timeout_ms: u64) -> WorkerConfig {
    WorkerConfig {
        command: Some("sh".to_string()),
        args: vec!["-c".to_string(), script.to_string()],
        startup_timeout_ms: 2000,
        request_timeout_ms,
        shutdown_timeout_ms: 500,
        ..WorkerConfig::default()
    }
}

#[tokio::test]
async fn test_worker_language_starts_worker_and_skips_loaders() {
    let dir = TempDir::new().unwrap();
    write(&dir, "hooks.sh", "# handled by the worker");
    let config = HooksConfig {
        hookfiles: Some(HookfilesPattern::from("*.sh")),
        language: HookLanguage::new("shell"),
        worker: shell_worker(ECHO_WORKER, 2000),
        ..Default::default()
    };
    let trusted = Arc::new(CountingLoader::default());
    let sandboxed = Arc::new(CountingLoader::default());
    let mut runner = RunnerContext::new(config, dir.path());

    HookOrchestrator::new()
        .with_trusted_loader(trusted.clone())
        .with_sandboxed_loader(sandboxed.clone())
        .add_hooks(&mut runner, &transactions())
        .await
        .unwrap();

    let hooks = registry(&runner);
    let worker = hooks.worker().unwrap();
    assert_eq!(worker.state().await, WorkerState::Ready);
    assert_eq!(
        worker.args().last().map(String::as_str),
        Some(dir.path().join("hooks.sh").to_str().unwrap())
    );
    assert_eq!(trusted.calls.load(Ordering::SeqCst), 0);
    assert_eq!(sandboxed.calls.load(Ordering::SeqCst), 0);
    assert_eq!(hooks.hooks.before_each.len(), 1);
    assert_eq!(hooks.hooks.after_all.len(), 1);

    let mut run = transactions();
    let failures = HookRunner::new(hooks).run(&mut run, &NoExchange).await;
    assert_eq!(failures, 0);
    assert_eq!(run, transactions());

    hooks.shutdown().await.unwrap();
    assert_eq!(hooks.worker().unwrap().state().await, WorkerState::Stopped);
}

#[tokio::test]
async fn test_unanswered_worker_request_fails_transaction() {
    // Completes the handshake, then never answers.
    let script = r#"IFS= read -r line; printf '%s\n' "$line"; cat > /dev/null"#;
    let config = HooksConfig {
        language: HookLanguage::new("shell"),
        worker: shell_worker(script, 200),
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, "/");
    add_hooks(&mut runner, &[]).await.unwrap();
    let hooks = registry(&runner);

    let mut transaction = Transaction::new("A");
    let failures = HookRunner::new(hooks).run_before(&mut transaction).await;

    assert_eq!(failures, 1);
    let reason = transaction.fail.unwrap();
    assert!(reason.starts_with("before_each hook worker: sh beforeEach failed"));
    assert!(reason.contains("within 200ms"));
    hooks.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_that_never_starts_is_fatal() {
    let config = HooksConfig {
        language: HookLanguage::new("shell"),
        worker: WorkerConfig {
            command: Some("/nonexistent/hooks-shell".to_string()),
            ..WorkerConfig::default()
        },
        ..Default::default()
    };
    let mut runner = RunnerContext::new(config, Path::new("/"));

    let err = add_hooks(&mut runner, &[]).await.unwrap_err();

    assert!(matches!(err, HooksError::Worker(_)));
    assert!(registry(&runner).worker().is_none());
}
