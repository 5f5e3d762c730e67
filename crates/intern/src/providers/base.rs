use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::run::{EventSender, RunEvent};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Base trait for AI providers (OpenAI and compatible endpoints)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the model this provider completes with
    fn model(&self) -> &str;

    /// Generate the next message using the provided system prompt, history and tools
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)>;

    /// Like `complete`, but forwards assistant text to `events` as it is produced.
    ///
    /// Providers without incremental output send the whole text as one delta.
    /// Fails once the receiving side of `events` has been dropped.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        events: &EventSender,
    ) -> Result<(Message, Usage)> {
        let (message, usage) = self.complete(system, messages, tools).await?;
        let text = message.text();
        if !text.is_empty() {
            events
                .send(Ok(RunEvent::Delta(text)))
                .await
                .map_err(|_| anyhow!("event receiver dropped"))?;
        }
        Ok((message, usage))
    }
}
