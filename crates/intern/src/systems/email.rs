use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{optional_u32, required_str, System};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::store::{Email, Store};

const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Read access to the mailbox
pub struct EmailSystem {
    store: Arc<Store>,
    tools: Vec<Tool>,
}

impl EmailSystem {
    pub fn new(store: Arc<Store>) -> Self {
        let recent_emails = Tool::new(
            "recent_emails",
            "List the most recently received emails, newest first.",
            json!({
                "type": "object",
                "required": [],
                "properties": {
                    "limit": {
                        "type": "integer",
                        "default": DEFAULT_RECENT_LIMIT,
                        "description": "How many emails to return."
                    }
                }
            }),
        );

        let search_emails = Tool::new(
            "search_emails",
            "Find emails whose sender, subject or body mention the query.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Text to look for, such as a name or topic."
                    }
                }
            }),
        );

        let emails_from = Tool::new(
            "emails_from",
            "List emails sent by a specific person.",
            json!({
                "type": "object",
                "required": ["sender"],
                "properties": {
                    "sender": {
                        "type": "string",
                        "description": "Name or email address of the sender."
                    }
                }
            }),
        );

        Self {
            store,
            tools: vec![recent_emails, search_emails, emails_from],
        }
    }

    fn recent_emails(&self, params: &serde_json::Value) -> AgentResult<String> {
        let limit = optional_u32(params, "limit")?.unwrap_or(DEFAULT_RECENT_LIMIT);
        let emails = self.store.recent_emails(limit)?;
        Ok(format_emails(&emails, || "No emails found.".to_string()))
    }

    fn search_emails(&self, params: &serde_json::Value) -> AgentResult<String> {
        let query = required_str(params, "query")?;
        let emails = self.store.search_emails(query)?;
        Ok(format_emails(&emails, || {
            format!("No emails found matching '{}'.", query)
        }))
    }

    fn emails_from(&self, params: &serde_json::Value) -> AgentResult<String> {
        let sender = required_str(params, "sender")?;
        let emails = self.store.emails_from(sender)?;
        Ok(format_emails(&emails, || {
            format!("No emails found from '{}'.", sender)
        }))
    }
}

fn format_emails(emails: &[Email], empty: impl FnOnce() -> String) -> String {
    if emails.is_empty() {
        return empty();
    }
    emails
        .iter()
        .map(|email| {
            format!(
                "ID: {}\nFrom: {}\nReceived: {}\nSubject: {}\nContent: {}\n",
                email.id, email.sender, email.received_at, email.subject, email.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[async_trait]
impl System for EmailSystem {
    fn name(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Look up emails in the user's mailbox"
    }

    fn instructions(&self) -> &str {
        "Retrieve and summarize emails. Extract key information such as names, dates and requests. \
        Quote the sender and subject when referring to a specific email."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let text = match tool_call.name.as_str() {
            "recent_emails" => self.recent_emails(&tool_call.arguments),
            "search_emails" => self.search_emails(&tool_call.arguments),
            "emails_from" => self.emails_from(&tool_call.arguments),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }?;
        Ok(vec![Content::text(text)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> EmailSystem {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_email(
                "Dana <dana@example.com>",
                "2025-11-02T16:01:00Z",
                "Standup notes",
                "Chris will run standup tomorrow.",
            )
            .unwrap();
        store
            .insert_email(
                "Alex <alex@client.com>",
                "2025-11-02T18:00:00Z",
                "Contract",
                "Please review the attached contract.",
            )
            .unwrap();
        EmailSystem::new(Arc::new(store))
    }

    fn text(contents: Vec<Content>) -> String {
        contents[0].as_text().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_recent_emails_respects_limit() {
        let system = system();
        let result = system
            .call(ToolCall::new("recent_emails", json!({"limit": 1})))
            .await
            .unwrap();
        let text = text(result);
        assert!(text.contains("Subject: Contract"));
        assert!(!text.contains("Standup notes"));
    }

    #[tokio::test]
    async fn test_search_and_sender_lookups() {
        let system = system();
        let found = text(
            system
                .call(ToolCall::new("search_emails", json!({"query": "Chris"})))
                .await
                .unwrap(),
        );
        assert!(found.contains("From: Dana <dana@example.com>"));

        let from_alex = text(
            system
                .call(ToolCall::new("emails_from", json!({"sender": "alex"})))
                .await
                .unwrap(),
        );
        assert!(from_alex.contains("Contract"));

        let none = text(
            system
                .call(ToolCall::new("emails_from", json!({"sender": "Nobody"})))
                .await
                .unwrap(),
        );
        assert_eq!(none, "No emails found from 'Nobody'.");
    }

    #[tokio::test]
    async fn test_invalid_calls() {
        let system = system();
        let error = system
            .call(ToolCall::new("search_emails", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::InvalidParameters(_)));

        let error = system
            .call(ToolCall::new("delete_emails", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::ToolNotFound(_)));
    }
}
