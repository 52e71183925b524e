// ABOUTME: Closed event grammar for the Claude CLI stream-json protocol.
// ABOUTME: Decoding is soft: anything outside the grammar becomes None or Unrecognized.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One decoded line of agent output
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// `system` events; the `init` subtype carries the session token
    System(SystemEvent),
    /// Assistant message with text and tool_use blocks
    Assistant(MessageEvent),
    /// User message; in a stream this carries tool_result blocks
    User(MessageEvent),
    /// Terminal event for the turn
    Result(ResultEvent),
    /// Valid JSON with a `type` we don't handle (stream_event, etc.)
    #[serde(other)]
    Unrecognized,
}

impl StreamEvent {
    /// Decode one line. Returns None for blank lines, non-JSON diagnostics,
    /// and JSON that doesn't match the grammar at all.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::trace!(error = %e, line_len = line.len(), "Discarding undecodable agent line");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SystemEvent {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SystemEvent {
    pub fn is_init(&self) -> bool {
        self.subtype.as_deref() == Some("init")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "content_blocks")]
    pub content: Vec<ContentBlock>,
}

/// A block inside `message.content`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        is_error: bool,
    },
    /// thinking, image, and anything newer
    #[serde(other)]
    Other,
}

/// User prompts echo `content` as a bare string; tool results use a block list.
fn content_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Blocks(Vec<ContentBlock>),
        Text(String),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::Blocks(blocks)) => blocks,
        Some(Repr::Text(text)) => vec![ContentBlock::Text { text }],
        None => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultEvent {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub num_turns: Option<u32>,
    #[serde(default)]
    pub usage: Option<Value>,
}

impl ResultEvent {
    /// Human-readable failure text: explicit message first, then the joined sub-errors.
    pub fn error_message(&self) -> String {
        if let Some(error) = non_empty(self.error.as_deref()) {
            return error.to_string();
        }
        if let Some(result) = non_empty(self.result.as_deref()) {
            return result.to_string();
        }
        let joined = self
            .errors
            .iter()
            .map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        if joined.is_empty() {
            match self.subtype.as_deref() {
                Some(subtype) if subtype != "success" => format!("Agent reported {}", subtype),
                _ => "Unknown error".to_string(),
            }
        } else {
            joined
        }
    }

    /// Final text, if the event carries a non-empty one
    pub fn final_text(&self) -> Option<&str> {
        non_empty(self.result.as_deref())
    }

    pub fn usage(&self) -> Option<Usage> {
        let mut usage = Usage::default();
        let mut found = false;

        if let Some(cost) = self.total_cost_usd {
            usage.cost_usd = Some(cost);
            found = true;
        }

        if let Some(obj) = self.usage.as_ref() {
            usage.input_tokens = obj.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            usage.output_tokens = obj.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
            usage.cache_read_tokens = obj.get("cache_read_input_tokens").and_then(|v| v.as_u64());
            usage.cache_write_tokens = obj
                .get("cache_creation_input_tokens")
                .and_then(|v| v.as_u64());
            found = true;
        }

        usage.duration_ms = self.duration_ms;
        usage.num_turns = self.num_turns;

        found.then_some(usage)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// Token usage and cost reported by the terminal event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: Option<u64>,
    pub cache_write_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub num_turns: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_init() {
        let event = StreamEvent::decode(
            r#"{"type":"system","subtype":"init","session_id":"abc","tools":["Read"]}"#,
        )
        .unwrap();
        match event {
            StreamEvent::System(sys) => {
                assert!(sys.is_init());
                assert_eq!(sys.session_id.as_deref(), Some("abc"));
            }
            other => panic!("Expected System, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_non_json_is_none() {
        assert!(StreamEvent::decode("Warning: something on stdout").is_none());
        assert!(StreamEvent::decode("").is_none());
        assert!(StreamEvent::decode("   ").is_none());
    }

    #[test]
    fn test_decode_unknown_type() {
        let event = StreamEvent::decode(r#"{"type":"stream_event","event":{}}"#).unwrap();
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_decode_missing_type_is_none() {
        assert!(StreamEvent::decode(r#"{"hello":"world"}"#).is_none());
    }

    #[test]
    fn test_decode_assistant_blocks() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Looking"},
                {"type": "tool_use", "id": "t1", "name": "Read", "input": {"file_path": "a.rs"}}
            ]}
        })
        .to_string();

        let StreamEvent::Assistant(msg) = StreamEvent::decode(&line).unwrap() else {
            panic!("Expected Assistant");
        };
        assert_eq!(msg.message.content.len(), 3);
        assert_eq!(msg.message.content[0], ContentBlock::Other);
        assert_eq!(
            msg.message.content[1],
            ContentBlock::Text {
                text: "Looking".to_string()
            }
        );
        assert!(matches!(
            &msg.message.content[2],
            ContentBlock::ToolUse { name, input, .. } if name == "Read" && input["file_path"] == "a.rs"
        ));
    }

    #[test]
    fn test_decode_user_string_content() {
        let line = r#"{"type":"user","message":{"role":"user","content":"hi"}}"#;
        let StreamEvent::User(msg) = StreamEvent::decode(line).unwrap() else {
            panic!("Expected User");
        };
        assert_eq!(
            msg.message.content,
            vec![ContentBlock::Text {
                text: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_tool_result() {
        let line = json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "ok"}
            ]}
        })
        .to_string();
        let StreamEvent::User(msg) = StreamEvent::decode(&line).unwrap() else {
            panic!("Expected User");
        };
        assert!(matches!(
            &msg.message.content[0],
            ContentBlock::ToolResult { tool_use_id, is_error: false } if tool_use_id == "t1"
        ));
    }

    #[test]
    fn test_result_error_message_joins_errors() {
        let event = ResultEvent {
            is_error: true,
            errors: vec![json!("a"), json!("b")],
            ..Default::default()
        };
        assert_eq!(event.error_message(), "a; b");
    }

    #[test]
    fn test_result_error_message_prefers_explicit() {
        let event = ResultEvent {
            is_error: true,
            error: Some("boom".to_string()),
            errors: vec![json!("a")],
            ..Default::default()
        };
        assert_eq!(event.error_message(), "boom");
    }

    #[test]
    fn test_result_error_message_subtype_fallback() {
        let event = ResultEvent {
            is_error: true,
            subtype: Some("error_max_turns".to_string()),
            ..Default::default()
        };
        assert_eq!(event.error_message(), "Agent reported error_max_turns");
    }

    #[test]
    fn test_result_usage() {
        let line = json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": "done",
            "session_id": "s",
            "total_cost_usd": 0.25,
            "num_turns": 3,
            "usage": {"input_tokens": 10, "output_tokens": 20, "cache_read_input_tokens": 5}
        })
        .to_string();
        let StreamEvent::Result(result) = StreamEvent::decode(&line).unwrap() else {
            panic!("Expected Result");
        };
        let usage = result.usage().unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 20);
        assert_eq!(usage.cache_read_tokens, Some(5));
        assert_eq!(usage.cost_usd, Some(0.25));
        assert_eq!(usage.num_turns, Some(3));
        assert_eq!(result.final_text(), Some("done"));
    }

    #[test]
    fn test_result_without_usage() {
        let result = ResultEvent::default();
        assert!(result.usage().is_none());
        assert!(result.final_text().is_none());
    }
}
