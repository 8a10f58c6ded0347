//! One-line summaries of tool invocations for progress display.

use serde_json::Value;

use crate::event::StreamEvent;

static NO_INPUT: Value = Value::Null;

/// Format a tool invocation as `[Tool] <name>: <detail>`.
pub fn format_tool_verbose(tool_name: &str, input: &Value) -> String {
    let mut line = format!("[Tool] {tool_name}");
    let field = |key: &str| input.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    match tool_name {
        "Bash" => {
            if let Some(command) = field("command") {
                line.push_str(": ");
                line.push_str(&truncate(command, 80));
            }
        }
        "Edit" | "Write" | "Read" => {
            if let Some(path) = field("file_path") {
                line.push_str(": ");
                line.push_str(path);
            }
        }
        "NotebookEdit" | "NotebookRead" => {
            if let Some(path) = field("notebook_path") {
                line.push_str(": ");
                line.push_str(path);
            }
        }
        "Grep" => {
            if let Some(pattern) = field("pattern") {
                line.push_str(&format!(": searching for \"{pattern}\""));
                if let Some(path) = field("path") {
                    line.push_str(" in ");
                    line.push_str(path);
                }
            }
        }
        "Glob" => {
            if let Some(pattern) = field("pattern") {
                line.push_str(": ");
                line.push_str(pattern);
            }
        }
        "SlashCommand" => {
            if let Some(command) = field("command") {
                line.push_str(": ");
                line.push_str(command);
            }
        }
        "Task" => {
            if let Some(description) = field("description") {
                line.push_str(": ");
                line.push_str(description);
            } else if let Some(prompt) = field("prompt") {
                line.push_str(": ");
                line.push_str(&truncate(prompt, 60));
            }
        }
        "TodoWrite" => {
            if let Some(todos) = input.get("todos").and_then(Value::as_array) {
                let active = todos
                    .iter()
                    .find(|todo| todo.get("status").and_then(Value::as_str) == Some("in_progress"))
                    .and_then(|todo| todo.get("activeForm").and_then(Value::as_str))
                    .filter(|s| !s.is_empty());
                match active {
                    Some(active) => {
                        line.push_str(": ");
                        line.push_str(active);
                    }
                    None => line.push_str(&format!(": {} task(s)", todos.len())),
                }
            }
        }
        "WebFetch" => {
            if let Some(url) = field("url") {
                line.push_str(": ");
                line.push_str(url);
            }
        }
        "WebSearch" => {
            if let Some(query) = field("query") {
                line.push_str(&format!(": \"{query}\""));
            }
        }
        _ => {
            // Unknown tools show their first parameter if it is short text.
            let first = input
                .as_object()
                .and_then(|map| map.values().next())
                .and_then(Value::as_str);
            if let Some(value) = first.filter(|v| v.chars().count() < 60) {
                line.push_str(": ");
                line.push_str(value);
            }
        }
    }

    line
}

/// Tool invocations (`name`, `input`) contained in an assistant event.
pub fn tool_invocations(event: &StreamEvent) -> impl Iterator<Item = (&str, &Value)> {
    event
        .as_assistant()
        .into_iter()
        .flat_map(|assistant| assistant.message.content.iter())
        .filter(|block| block.is_tool_use())
        .filter_map(|block| {
            let name = block.name.as_deref()?;
            Some((name, block.input.as_ref().unwrap_or(&NO_INPUT)))
        })
}

/// Progress lines for every tool invocation in `event`.
pub fn verbose_lines(event: &StreamEvent) -> Vec<String> {
    tool_invocations(event)
        .map(|(name, input)| format_tool_verbose(name, input))
        .collect()
}

/// Cut `text` to `max` characters, replacing the tail with `...`.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bash_command_is_truncated() {
        let long = "x".repeat(100);
        let line = format_tool_verbose("Bash", &json!({ "command": long }));
        assert_eq!(line, format!("[Tool] Bash: {}...", "x".repeat(77)));

        let line = format_tool_verbose("Bash", &json!({ "command": "ls -la" }));
        assert_eq!(line, "[Tool] Bash: ls -la");
    }

    #[test]
    fn file_tools_show_path() {
        for tool in ["Edit", "Write", "Read"] {
            let line = format_tool_verbose(tool, &json!({ "file_path": "/tmp/a.rs" }));
            assert_eq!(line, format!("[Tool] {tool}: /tmp/a.rs"));
        }
        let line = format_tool_verbose("NotebookEdit", &json!({ "notebook_path": "nb.ipynb" }));
        assert_eq!(line, "[Tool] NotebookEdit: nb.ipynb");
    }

    #[test]
    fn grep_includes_optional_path() {
        let line = format_tool_verbose("Grep", &json!({ "pattern": "fn main" }));
        assert_eq!(line, "[Tool] Grep: searching for \"fn main\"");
        let line = format_tool_verbose("Grep", &json!({ "pattern": "fn main", "path": "src" }));
        assert_eq!(line, "[Tool] Grep: searching for \"fn main\" in src");
    }

    #[test]
    fn task_prefers_description_over_prompt() {
        let line = format_tool_verbose(
            "Task",
            &json!({ "description": "Review code", "prompt": "long prompt" }),
        );
        assert_eq!(line, "[Tool] Task: Review code");

        let prompt = "p".repeat(61);
        let line = format_tool_verbose("Task", &json!({ "prompt": prompt }));
        assert_eq!(line, format!("[Tool] Task: {}...", "p".repeat(57)));
    }

    #[test]
    fn todo_write_shows_active_or_count() {
        let input = json!({ "todos": [
            { "status": "completed", "activeForm": "Reading" },
            { "status": "in_progress", "activeForm": "Writing tests" },
        ]});
        assert_eq!(
            format_tool_verbose("TodoWrite", &input),
            "[Tool] TodoWrite: Writing tests"
        );

        let input = json!({ "todos": [{ "status": "pending" }, { "status": "pending" }] });
        assert_eq!(format_tool_verbose("TodoWrite", &input), "[Tool] TodoWrite: 2 task(s)");
    }

    #[test]
    fn web_tools() {
        assert_eq!(
            format_tool_verbose("WebFetch", &json!({ "url": "https://example.com" })),
            "[Tool] WebFetch: https://example.com"
        );
        assert_eq!(
            format_tool_verbose("WebSearch", &json!({ "query": "rust tokio" })),
            "[Tool] WebSearch: \"rust tokio\""
        );
    }

    #[test]
    fn unknown_tool_uses_first_short_string() {
        let line = format_tool_verbose("mcp__db__query", &json!({ "sql": "select 1", "db": "x" }));
        assert_eq!(line, "[Tool] mcp__db__query: select 1");

        let line = format_tool_verbose("Other", &json!({ "blob": "y".repeat(60) }));
        assert_eq!(line, "[Tool] Other");

        let line = format_tool_verbose("Other", &json!({ "n": 3 }));
        assert_eq!(line, "[Tool] Other");
    }

    #[test]
    fn missing_fields_produce_bare_name() {
        assert_eq!(format_tool_verbose("Bash", &json!({})), "[Tool] Bash");
        assert_eq!(format_tool_verbose("Glob", &Value::Null), "[Tool] Glob");
    }

    #[test]
    fn verbose_lines_from_assistant_event() {
        let event = StreamEvent::parse(
            br#"{"type":"assistant","message":{"content":[{"type":"text","text":"ok"},{"type":"tool_use","name":"Read","input":{"file_path":"a.txt"}},{"type":"tool_use","name":"Glob","input":{"pattern":"**/*.rs"}}]}}"#,
        )
        .unwrap();
        assert_eq!(
            verbose_lines(&event),
            vec!["[Tool] Read: a.txt", "[Tool] Glob: **/*.rs"]
        );

        let result = StreamEvent::parse(br#"{"type":"result"}"#).unwrap();
        assert!(verbose_lines(&result).is_empty());
    }
}
