//! The caller-facing view of an agent run.
//!
//! A run produces internal [`Message`]s (text, tool requests, tool responses).
//! Callers see a flattened transcript instead: one [`RunMessage`] per user or
//! assistant turn, with each tool request folded together with its result.
use std::collections::HashMap;
use std::fmt;

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::content::Content;
use super::message::{Message, MessageContent};
use super::role::Role;
use crate::errors::AgentResult;

/// A tool invocation recorded during a live run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecution {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// A tool call as handed to callers.
///
/// Live runs produce structured records. Transcripts loaded back from the
/// session table carry whatever JSON object was stored, which may come from
/// an older layout and is only loosely typed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawToolCall {
    Record(ToolExecution),
    Mapping(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RawToolCall>,
}

impl RunMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_call(mut self, call: RawToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// The outcome of one invocation of an agent or team
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub session_id: String,
    pub run_id: String,
    /// Text of the final assistant turn
    pub content: Option<String>,
    /// All assistant text produced during the run
    pub output_text: Option<String>,
    pub messages: Vec<RunMessage>,
}

impl RunResult {
    pub fn new(session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            run_id: run_id.into(),
            content: None,
            output_text: None,
            messages: Vec::new(),
        }
    }

    pub fn with_content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunResult(session_id={}, run_id={}, messages={})",
            self.session_id,
            self.run_id,
            self.messages.len()
        )
    }
}

/// One item of a streaming run
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// An increment of assistant text
    Delta(String),
    /// The run finished; always the last event of a successful run
    Completed(RunResult),
}

pub type EventSender = mpsc::Sender<AgentResult<RunEvent>>;

/// A finite, single-pass sequence of run events
pub type RunStream = BoxStream<'static, AgentResult<RunEvent>>;

/// Flatten internal messages into the caller-facing transcript.
///
/// Messages that only carry tool responses disappear; their results are
/// attached to the tool call that requested them. Tool requests the model
/// produced in an invalid shape are not recorded.
pub fn transcript(messages: &[Message]) -> Vec<RunMessage> {
    let mut results: HashMap<&str, Value> = HashMap::new();
    for message in messages {
        for content in &message.content {
            if let MessageContent::ToolResponse(response) = content {
                results.insert(response.id.as_str(), tool_result_value(&response.tool_result));
            }
        }
    }

    messages
        .iter()
        .filter(|message| !message.is_tool_response())
        .map(|message| {
            let mut run_message = RunMessage::new(message.role, message.text());
            for request in message.tool_requests() {
                if let Ok(call) = &request.tool_call {
                    run_message = run_message.with_tool_call(RawToolCall::Record(ToolExecution {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: results
                            .get(request.id.as_str())
                            .cloned()
                            .unwrap_or(Value::Null),
                    }));
                }
            }
            run_message
        })
        .collect()
}

/// Tool output is text; structured payloads (search results) are kept as JSON
fn tool_result_value(result: &AgentResult<Vec<Content>>) -> Value {
    match result {
        Ok(contents) => {
            let text = contents
                .iter()
                .filter_map(|content| content.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            match serde_json::from_str::<Value>(&text) {
                Ok(value) if value.is_object() || value.is_array() => value,
                _ => Value::String(text),
            }
        }
        Err(e) => json!({ "error": e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::models::tool::ToolCall;

    #[test]
    fn test_transcript_folds_tool_responses_into_calls() {
        let messages = vec![
            Message::user().with_text("Find rust news"),
            Message::assistant().with_tool_request(
                "call_1",
                Ok(ToolCall::new("search__web_search", json!({"query": "rust"}))),
            ),
            Message::user().with_tool_response(
                "call_1",
                Ok(vec![Content::text(
                    r#"{"results": [{"url": "https://blog.rust-lang.org"}]}"#,
                )]),
            ),
            Message::assistant().with_text("Here is the news"),
        ];

        let transcript = transcript(&messages);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0], RunMessage::new(Role::User, "Find rust news"));
        assert_eq!(
            transcript[1].tool_calls,
            vec![RawToolCall::Record(ToolExecution {
                name: "search__web_search".to_string(),
                arguments: json!({"query": "rust"}),
                result: json!({"results": [{"url": "https://blog.rust-lang.org"}]}),
            })]
        );
        assert_eq!(transcript[2].content, "Here is the news");
    }

    #[test]
    fn test_transcript_keeps_plain_text_and_errors() {
        let messages = vec![
            Message::assistant()
                .with_tool_request("a", Ok(ToolCall::new("calendar__all_events", json!({}))))
                .with_tool_request("b", Ok(ToolCall::new("calendar__missing", json!({}))))
                .with_tool_request("c", Err(AgentError::ToolNotFound("bad name".into()))),
            Message::user()
                .with_tool_response("a", Ok(vec![Content::text("No events found in the calendar.")]))
                .with_tool_response("b", Err(AgentError::ToolNotFound("missing".into()))),
        ];

        let transcript = transcript(&messages);
        assert_eq!(transcript.len(), 1);
        let calls = &transcript[0].tool_calls;
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            RawToolCall::Record(call) => {
                assert_eq!(call.result, json!("No events found in the calendar."))
            }
            other => panic!("unexpected shape: {:?}", other),
        }
        match &calls[1] {
            RawToolCall::Record(call) => {
                assert_eq!(call.result, json!({"error": "Tool not found: missing"}))
            }
            other => panic!("unexpected shape: {:?}", other),
        }
    }

    #[test]
    fn test_run_result_display() {
        let result = RunResult::new("s-1", "r-1");
        assert_eq!(
            result.to_string(),
            "RunResult(session_id=s-1, run_id=r-1, messages=0)"
        );
    }
}
