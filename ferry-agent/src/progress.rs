// ABOUTME: Human-readable progress lines for tool invocations.
// ABOUTME: Known tools get a template keyed on one input field; others get "Using <name>...".

use serde_json::Value;

const MAX_COMMAND_CHARS: usize = 60;
const MAX_FIELD_CHARS: usize = 120;

/// Describe a tool call for the user
pub fn describe_tool(name: &str, input: &Value) -> String {
    let raw = |key: &str| {
        input
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    };
    let field = |key: &str| raw(key).map(|s| truncate(s, MAX_FIELD_CHARS));

    let described = match name {
        "Read" | "NotebookRead" => field("file_path")
            .or_else(|| field("notebook_path"))
            .map(|p| format!("📖 Reading {}...", p)),
        "Grep" => field("pattern").map(|p| format!("🔍 Searching for \"{}\"...", p)),
        "Glob" | "LS" => field("pattern")
            .or_else(|| field("path"))
            .map(|p| format!("📂 Finding files matching {}...", p)),
        "Bash" => raw("command").map(|c| format!("💻 Running: {}...", truncate(c, MAX_COMMAND_CHARS))),
        "Edit" | "MultiEdit" | "NotebookEdit" => field("file_path")
            .or_else(|| field("notebook_path"))
            .map(|p| format!("✏️ Editing {}...", p)),
        "Write" => field("file_path").map(|p| format!("📝 Writing {}...", p)),
        "WebSearch" => field("query").map(|q| format!("🌐 Searching the web for \"{}\"...", q)),
        "WebFetch" => field("url").map(|u| format!("🌐 Fetching {}...", u)),
        "TodoWrite" => Some("📋 Updating task list...".to_string()),
        "Task" => field("description").map(|d| format!("🤖 Delegating: {}...", d)),
        _ => None,
    };

    described.unwrap_or_else(|| {
        let name = if name.is_empty() { "a tool" } else { name };
        format!("Using {}...", name)
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    if first_line.chars().count() <= max_chars && first_line.len() == s.trim_end().len() {
        return first_line.to_string();
    }
    let mut out: String = first_line.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_tools() {
        assert_eq!(
            describe_tool("Read", &json!({"file_path": "src/main.rs"})),
            "📖 Reading src/main.rs..."
        );
        assert_eq!(
            describe_tool("Grep", &json!({"pattern": "fn main"})),
            "🔍 Searching for \"fn main\"..."
        );
        assert_eq!(
            describe_tool("Glob", &json!({"pattern": "**/*.rs"})),
            "📂 Finding files matching **/*.rs..."
        );
        assert_eq!(
            describe_tool("Bash", &json!({"command": "cargo test"})),
            "💻 Running: cargo test..."
        );
        assert_eq!(
            describe_tool("Edit", &json!({"file_path": "a.rs"})),
            "✏️ Editing a.rs..."
        );
        assert_eq!(
            describe_tool("Write", &json!({"file_path": "b.rs"})),
            "📝 Writing b.rs..."
        );
        assert_eq!(
            describe_tool("WebSearch", &json!({"query": "rust async"})),
            "🌐 Searching the web for \"rust async\"..."
        );
        assert_eq!(
            describe_tool("WebFetch", &json!({"url": "https://example.com"})),
            "🌐 Fetching https://example.com..."
        );
    }

    #[test]
    fn test_unknown_tool_falls_back() {
        assert_eq!(describe_tool("mcp__db__query", &json!({})), "Using mcp__db__query...");
    }

    #[test]
    fn test_missing_field_falls_back() {
        assert_eq!(describe_tool("Read", &json!({})), "Using Read...");
        assert_eq!(describe_tool("Bash", &Value::Null), "Using Bash...");
    }

    #[test]
    fn test_long_command_is_truncated() {
        let command = "x".repeat(200);
        let line = describe_tool("Bash", &json!({ "command": command }));
        assert!(line.contains('…'));
        assert!(line.chars().count() < 100);
    }

    #[test]
    fn test_long_fields_are_truncated() {
        let url = format!("https://example.com/{}", "a".repeat(5000));
        let line = describe_tool("WebFetch", &json!({ "url": url }));
        assert!(line.starts_with("🌐 Fetching https://example.com/"));
        assert!(line.chars().count() < MAX_FIELD_CHARS + 20);

        let path = format!("/srv/{}/notes.md", "deep/".repeat(100));
        assert!(describe_tool("Read", &json!({ "file_path": path })).contains('…'));
    }

    #[test]
    fn test_multiline_command_shows_first_line() {
        let line = describe_tool("Bash", &json!({"command": "echo one\necho two"}));
        assert_eq!(line, "💻 Running: echo one…...");
    }
}
