//! Executor integration tests against a scripted fake agent.
#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use ccs_delegation::{
    DelegationConfig, ExecutionOptions, ExecutorError, HeadlessExecutor, StreamEvent,
    extract_session_info,
};

/// Executor that runs `sh <script>` in place of the real agent.
fn fake_agent(dir: &Path, script: &str, max_output_bytes: usize) -> HeadlessExecutor {
    let path = dir.join("fake-agent.sh");
    std::fs::write(&path, script).unwrap();
    HeadlessExecutor::new(DelegationConfig {
        executable: "sh".to_string(),
        executable_args: vec![path.display().to_string()],
        default_timeout_secs: 30,
        permission_mode: None,
        max_output_bytes,
    })
}

fn options(dir: &Path) -> ExecutionOptions {
    ExecutionOptions {
        prompt: "do the thing".to_string(),
        cwd: Some(dir.to_path_buf()),
        profile: "test".to_string(),
        ..Default::default()
    }
}

const HAPPY_SCRIPT: &str = r#"
printf '%s\n' '{"type":"system","subtype":"init","session_id":"sess-42"}'
printf '%s\n' 'garbage line'
printf '%s' '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}'
printf '%s\n' '}'
printf '%s\n' '{"type":"result","subtype":"success","session_id":"sess-42","total_cost_usd":0.12,"num_turns":2,"result":"all done"}'
echo "warning on stderr" >&2
"#;

#[tokio::test]
async fn collects_events_and_terminal_summary() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(dir.path(), HAPPY_SCRIPT, 1024 * 1024);

    let mut seen = Vec::new();
    let result = executor
        .execute(options(dir.path()), |event: &StreamEvent| {
            seen.push(event.kind().unwrap_or("?").to_string());
        })
        .await
        .unwrap();

    assert_eq!(seen, vec!["system", "assistant", "result"]);
    assert_eq!(result.exit_code, 0);
    assert!(result.success);
    assert!(!result.timed_out);
    assert_eq!(result.content, "all done");
    assert_eq!(result.session_id.as_deref(), Some("sess-42"));
    assert_eq!(result.num_turns, Some(2));
    assert_eq!(result.profile, "test");
    assert!(result.stdout.contains("garbage line"));
    assert!(result.stderr.contains("warning on stderr"));

    let session = extract_session_info(&result).unwrap();
    assert_eq!(session.session_id, "sess-42");
    assert_eq!(session.total_cost, Some(0.12));
}

#[tokio::test]
async fn nonzero_exit_without_result_event_is_degraded_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(dir.path(), "echo 'plain text output'\nexit 3\n", 1024 * 1024);

    let result = executor.execute(options(dir.path()), |_| {}).await.unwrap();

    assert_eq!(result.exit_code, 3);
    assert!(!result.success);
    assert!(result.messages.is_empty());
    assert_eq!(result.content, "plain text output\n");
    assert_eq!(result.session_id, None);
}

#[tokio::test]
async fn timeout_kills_agent_and_marks_result() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(
        dir.path(),
        "printf '%s\\n' '{\"type\":\"system\"}'\nexec sleep 30\n",
        1024 * 1024,
    );

    let mut opts = options(dir.path());
    opts.timeout = Some(Duration::from_millis(300));
    let result = executor.execute(opts, |_| {}).await.unwrap();

    assert!(result.timed_out);
    assert!(!result.success);
    assert!(result.duration < 30_000);
}

#[tokio::test]
async fn timeout_keeps_stderr_written_before_the_kill() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(
        dir.path(),
        "echo \"partial diagnostics\" >&2\nexec sleep 30\n",
        1024 * 1024,
    );

    let mut opts = options(dir.path());
    opts.timeout = Some(Duration::from_millis(300));
    let result = executor.execute(opts, |_| {}).await.unwrap();

    assert!(result.timed_out);
    assert!(result.stderr.contains("partial diagnostics"), "{:?}", result.stderr);
}

#[tokio::test]
async fn grandchild_holding_stderr_does_not_hang_completion() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(
        dir.path(),
        "sleep 30 >/dev/null &\necho \"early warning\" >&2\nprintf '%s\\n' '{\"type\":\"result\",\"result\":\"ok\"}'\nexit 0\n",
        1024 * 1024,
    );

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        executor.execute(options(dir.path()), |_| {}),
    )
    .await
    .expect("execute should not wait on the grandchild")
    .unwrap();

    assert!(!result.timed_out);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.content, "ok");
    assert!(result.stderr.contains("early warning"));
    assert!(result.duration < 5_000);
}

#[tokio::test]
async fn oversized_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let executor = fake_agent(
        dir.path(),
        "i=0\nwhile [ $i -lt 200 ]; do printf '%s' 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'; i=$((i+1)); done\n",
        1024,
    );

    let err = executor.execute(options(dir.path()), |_| {}).await.unwrap_err();
    assert!(matches!(err, ExecutorError::OutputLimit { limit: 1024 }));
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = HeadlessExecutor::new(DelegationConfig {
        executable: "definitely-not-a-real-agent-binary".to_string(),
        ..DelegationConfig::default()
    });

    let err = executor.execute(options(dir.path()), |_| {}).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Spawn { .. }));
}
