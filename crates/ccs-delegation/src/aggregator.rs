//! Fold a finished run's events into a single [`ExecutionResult`].

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::event::{ExecutionError, PermissionDenial, RESULT_EVENT_TYPE, StreamEvent};

/// Outcome of one headless CLI agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub cwd: String,
    pub profile: String,
    /// Wall-clock duration in milliseconds.
    pub duration: u64,
    pub timed_out: bool,
    pub success: bool,
    pub messages: Vec<StreamEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// API-side duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_denials: Option<Vec<PermissionDenial>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ExecutionError>>,
    pub content: String,
}

/// Inputs for [`build_execution_result`].
#[derive(Debug, Clone, Default)]
pub struct ResultParams {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub cwd: String,
    pub profile: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub messages: Vec<StreamEvent>,
}

/// Minimal tuple needed to continue a session in a later invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    pub cwd: String,
}

/// Build the result record, pulling summary fields from the terminal event.
///
/// A run without a terminal event is still a valid result: `content` falls
/// back to the raw stdout and the summary fields stay `None`.
pub fn build_execution_result(params: ResultParams) -> ExecutionResult {
    let ResultParams {
        exit_code,
        stdout,
        stderr,
        cwd,
        profile,
        duration,
        timed_out,
        messages,
    } = params;

    let mut result = ExecutionResult {
        exit_code,
        stdout,
        stderr,
        cwd,
        profile,
        duration: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        timed_out,
        success: exit_code == 0 && !timed_out,
        messages,
        session_id: None,
        total_cost: None,
        num_turns: None,
        is_error: None,
        kind: None,
        subtype: None,
        duration_api: None,
        permission_denials: None,
        errors: None,
        content: String::new(),
    };

    match result.messages.iter().find_map(StreamEvent::result_summary) {
        Some(terminal) => {
            result.session_id = terminal.session_id.filter(|id| !id.is_empty());
            result.total_cost = Some(terminal.total_cost_usd.unwrap_or(0.0));
            result.num_turns = Some(terminal.num_turns.unwrap_or(0));
            result.is_error = Some(terminal.is_error.unwrap_or(false));
            result.kind = Some(RESULT_EVENT_TYPE.to_string());
            result.subtype = terminal.subtype.filter(|s| !s.is_empty());
            result.duration_api = Some(terminal.duration_api_ms.unwrap_or(0));
            result.permission_denials = Some(terminal.permission_denials.unwrap_or_default());
            result.errors = Some(terminal.errors.unwrap_or_default());
            result.content = terminal.result.unwrap_or_default();
        }
        None => {
            debug!("No result message found in stream-json output");
            result.content = result.stdout.clone();
        }
    }

    result
}

/// Session continuation info, or `None` when no session id was recovered.
pub fn extract_session_info(result: &ExecutionResult) -> Option<SessionInfo> {
    let session_id = result.session_id.clone()?;
    Some(SessionInfo {
        session_id,
        total_cost: result.total_cost,
        cwd: result.cwd.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::StreamDecoder;

    fn events(lines: &str) -> Vec<StreamEvent> {
        let mut decoder = StreamDecoder::new();
        let mut events = decoder.feed_str(lines).unwrap();
        events.extend(decoder.finish());
        events
    }

    fn params(exit_code: i32, timed_out: bool, messages: Vec<StreamEvent>) -> ResultParams {
        ResultParams {
            exit_code,
            stdout: "raw stdout".to_string(),
            stderr: String::new(),
            cwd: "/work".to_string(),
            profile: "glm".to_string(),
            duration: Duration::from_millis(1500),
            timed_out,
            messages,
        }
    }

    #[test]
    fn copies_all_terminal_fields() {
        let messages = events(concat!(
            r#"{"type":"system","subtype":"init","session_id":"sess-1"}"#,
            "\n",
            r#"{"type":"result","subtype":"success","session_id":"sess-1","total_cost_usd":0.42,"num_turns":7,"is_error":true,"duration_api_ms":900,"permission_denials":[{"tool_name":"Bash","tool_input":{"command":"rm -rf /"}}],"errors":[{"message":"boom"}],"result":"final answer"}"#,
            "\n",
        ));
        let result = build_execution_result(params(0, false, messages));

        assert!(result.success);
        assert_eq!(result.session_id.as_deref(), Some("sess-1"));
        assert_eq!(result.total_cost, Some(0.42));
        assert_eq!(result.num_turns, Some(7));
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.kind.as_deref(), Some("result"));
        assert_eq!(result.subtype.as_deref(), Some("success"));
        assert_eq!(result.duration_api, Some(900));
        let denials = result.permission_denials.as_ref().unwrap();
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].tool_name.as_deref(), Some("Bash"));
        assert_eq!(
            denials[0].tool_input.as_ref().unwrap().command.as_deref(),
            Some("rm -rf /")
        );
        assert_eq!(result.errors.as_ref().unwrap()[0].message.as_deref(), Some("boom"));
        assert_eq!(result.content, "final answer");
        assert_eq!(result.duration, 1500);
        assert_eq!(result.messages.len(), 2);
    }

    #[test]
    fn absent_terminal_fields_take_zero_values() {
        let messages = events("{\"type\":\"result\"}\n");
        let result = build_execution_result(params(0, false, messages));

        assert_eq!(result.session_id, None);
        assert_eq!(result.total_cost, Some(0.0));
        assert_eq!(result.num_turns, Some(0));
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.duration_api, Some(0));
        assert_eq!(result.permission_denials, Some(Vec::new()));
        assert_eq!(result.errors, Some(Vec::new()));
        assert_eq!(result.content, "");
    }

    #[test]
    fn missing_terminal_event_falls_back_to_stdout() {
        let messages = events("{\"type\":\"assistant\",\"message\":{\"content\":[]}}\n");
        let result = build_execution_result(params(0, false, messages));

        assert!(result.success);
        assert_eq!(result.content, "raw stdout");
        assert_eq!(result.session_id, None);
        assert_eq!(result.total_cost, None);
        assert_eq!(result.num_turns, None);
        assert_eq!(result.kind, None);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn error_result_with_string_errors_keeps_terminal_fields() {
        let messages = events(concat!(
            r#"{"type":"result","subtype":"error_during_execution","session_id":"sess-7","is_error":true,"errors":["boom","tool crashed"],"result":"partial"}"#,
            "\n",
        ));
        let result = build_execution_result(params(1, false, messages));

        assert!(!result.success);
        assert_eq!(result.content, "partial");
        assert_eq!(result.session_id.as_deref(), Some("sess-7"));
        assert_eq!(result.subtype.as_deref(), Some("error_during_execution"));
        assert_eq!(result.is_error, Some(true));
        let errors = result.errors.as_ref().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message.as_deref(), Some("boom"));
        assert_eq!(errors[1].message.as_deref(), Some("tool crashed"));
        assert_eq!(extract_session_info(&result).unwrap().session_id, "sess-7");
    }

    #[test]
    fn float_api_duration_is_rounded() {
        let messages = events(concat!(
            r#"{"type":"result","session_id":"sess-8","duration_api_ms":1234.5,"num_turns":2,"result":"ok"}"#,
            "\n",
        ));
        let result = build_execution_result(params(0, false, messages));

        assert_eq!(result.duration_api, Some(1235));
        assert_eq!(result.num_turns, Some(2));
        assert_eq!(result.session_id.as_deref(), Some("sess-8"));
        assert_eq!(result.content, "ok");
    }

    #[test]
    fn mistyped_field_takes_its_zero_value() {
        let messages = events(concat!(
            r#"{"type":"result","session_id":"sess-9","total_cost_usd":"free","result":"done"}"#,
            "\n",
        ));
        let result = build_execution_result(params(0, false, messages));

        assert_eq!(result.total_cost, Some(0.0));
        assert_eq!(result.session_id.as_deref(), Some("sess-9"));
        assert_eq!(result.content, "done");
    }

    #[test]
    fn success_requires_zero_exit_and_no_timeout() {
        assert!(build_execution_result(params(0, false, Vec::new())).success);
        assert!(!build_execution_result(params(1, false, Vec::new())).success);
        assert!(!build_execution_result(params(-1, false, Vec::new())).success);
        assert!(!build_execution_result(params(0, true, Vec::new())).success);
    }

    #[test]
    fn first_terminal_event_wins() {
        let messages = events(concat!(
            r#"{"type":"result","result":"first"}"#,
            "\n",
            r#"{"type":"result","result":"second"}"#,
            "\n",
        ));
        let result = build_execution_result(params(0, false, messages));
        assert_eq!(result.content, "first");
    }

    #[test]
    fn session_info_requires_session_id() {
        let with_session = build_execution_result(params(
            0,
            false,
            events("{\"type\":\"result\",\"session_id\":\"abc\",\"total_cost_usd\":1.5}\n"),
        ));
        assert_eq!(
            extract_session_info(&with_session),
            Some(SessionInfo {
                session_id: "abc".to_string(),
                total_cost: Some(1.5),
                cwd: "/work".to_string(),
            })
        );

        let without = build_execution_result(params(0, false, Vec::new()));
        assert_eq!(extract_session_info(&without), None);

        let empty_id = build_execution_result(params(
            0,
            false,
            events("{\"type\":\"result\",\"session_id\":\"\"}\n"),
        ));
        assert_eq!(extract_session_info(&empty_id), None);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let result = build_execution_result(params(
            0,
            false,
            events("{\"type\":\"result\",\"session_id\":\"abc\"}\n"),
        ));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["exitCode"], 0);
        assert_eq!(value["timedOut"], false);
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["type"], "result");
        assert_eq!(value["messages"][0]["type"], "result");
    }
}
