use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

pub mod calendar;
pub mod email;
pub mod search;

pub use calendar::CalendarSystem;
pub use email::EmailSystem;
pub use search::SearchSystem;

/// Core trait that defines a system that can be operated by an AI agent
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get system instructions
    fn instructions(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;
}

pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> AgentResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AgentError::InvalidParameters(format!("Missing '{}' parameter", key)))
}

pub(crate) fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Models sometimes send numbers as strings
pub(crate) fn optional_u32(params: &Value, key: &str) -> AgentResult<Option<u32>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                AgentError::InvalidParameters(format!("'{}' must be a positive integer", key))
            }),
        Some(Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| {
            AgentError::InvalidParameters(format!("'{}' must be a positive integer", key))
        }),
        Some(_) => Err(AgentError::InvalidParameters(format!(
            "'{}' must be a positive integer",
            key
        ))),
    }
}
