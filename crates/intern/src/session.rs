//! Per-session conversation history, one row per transcript message.
//!
//! Rows are keyed by the session id the caller supplied and by the owner
//! (the agent or team id), so the members of a team keep separate histories
//! under the same session.
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::role::Role;
use crate::models::run::{RawToolCall, RunMessage};
use crate::store::{format_timestamp, Store};

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<Store>,
}

impl SessionStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Append the transcript of one run
    pub fn append_run(
        &self,
        session_id: &str,
        owner: &str,
        run_id: &str,
        messages: &[RunMessage],
    ) -> AgentResult<()> {
        let created_at = format_timestamp(Utc::now());
        let mut conn = self.store.conn();
        let tx = conn.transaction()?;
        for message in messages {
            let tool_calls = if message.tool_calls.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&message.tool_calls)?)
            };
            tx.execute(
                "INSERT INTO session_messages
                    (session_id, owner, run_id, role, content, tool_calls, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session_id,
                    owner,
                    run_id,
                    message.role.as_str(),
                    message.content,
                    tool_calls,
                    created_at
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every stored message of the session, oldest first. Unknown sessions are empty.
    pub fn messages(&self, session_id: &str, owner: &str) -> AgentResult<Vec<RunMessage>> {
        self.query(
            "SELECT role, content, tool_calls FROM session_messages
             WHERE session_id = ?1 AND owner = ?2
             ORDER BY id ASC",
            params![session_id, owner],
        )
    }

    /// Messages of the last `runs` runs of the session, oldest first
    pub fn history(
        &self,
        session_id: &str,
        owner: &str,
        runs: usize,
    ) -> AgentResult<Vec<RunMessage>> {
        if runs == 0 {
            return Ok(Vec::new());
        }
        self.query(
            "SELECT role, content, tool_calls FROM session_messages
             WHERE session_id = ?1 AND owner = ?2 AND run_id IN (
                SELECT run_id FROM session_messages
                WHERE session_id = ?1 AND owner = ?2
                GROUP BY run_id
                ORDER BY MIN(id) DESC
                LIMIT ?3
             )
             ORDER BY id ASC",
            params![session_id, owner, runs as i64],
        )
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> AgentResult<Vec<RunMessage>> {
        let rows: Vec<(String, String, Option<String>)> = {
            let conn = self.store.conn();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter()
            .map(|(role, content, tool_calls)| {
                let role: Role = role.parse().map_err(AgentError::Store)?;
                Ok(RunMessage {
                    role,
                    content,
                    tool_calls: parse_tool_calls(tool_calls.as_deref())?,
                })
            })
            .collect()
    }
}

/// Stored tool calls come back as plain JSON objects; non-object entries are dropped
fn parse_tool_calls(raw: Option<&str>) -> AgentResult<Vec<RawToolCall>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let values: Vec<Value> = serde_json::from_str(raw)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(RawToolCall::Mapping(map)),
            _ => None,
        })
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run::ToolExecution;
    use serde_json::json;

    fn sessions() -> SessionStore {
        SessionStore::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn run(question: &str, answer: &str) -> Vec<RunMessage> {
        vec![
            RunMessage::new(Role::User, question),
            RunMessage::new(Role::Assistant, answer),
        ]
    }

    #[test]
    fn test_unknown_session_is_empty() -> AgentResult<()> {
        let sessions = sessions();
        assert!(sessions.messages("missing", "team")?.is_empty());
        assert!(sessions.history("missing", "team", 3)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_messages_are_scoped_by_session_and_owner() -> AgentResult<()> {
        let sessions = sessions();
        sessions.append_run("s1", "team", "r1", &run("hi", "hello"))?;
        sessions.append_run("s1", "calendar-agent", "r2", &run("task", "done"))?;
        sessions.append_run("s2", "team", "r3", &run("other", "session"))?;

        let messages = sessions.messages("s1", "team")?;
        assert_eq!(messages, run("hi", "hello"));
        Ok(())
    }

    #[test]
    fn test_history_keeps_last_runs() -> AgentResult<()> {
        let sessions = sessions();
        for i in 0..5 {
            sessions.append_run(
                "s1",
                "team",
                &format!("r{i}"),
                &run(&format!("q{i}"), &format!("a{i}")),
            )?;
        }

        let history = sessions.history("s1", "team", 2)?;
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q3", "a3", "q4", "a4"]);
        assert!(sessions.history("s1", "team", 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_tool_calls_load_back_as_mappings() -> AgentResult<()> {
        let sessions = sessions();
        let message = RunMessage::new(Role::Assistant, "").with_tool_call(RawToolCall::Record(
            ToolExecution {
                name: "search__web_search".to_string(),
                arguments: json!({"query": "rust"}),
                result: json!({"results": [{"url": "https://www.rust-lang.org"}]}),
            },
        ));
        sessions.append_run("s1", "search-agent", "r1", &[message])?;

        let loaded = sessions.messages("s1", "search-agent")?;
        assert_eq!(loaded.len(), 1);
        match &loaded[0].tool_calls[..] {
            [RawToolCall::Mapping(map)] => {
                assert_eq!(map["name"], json!("search__web_search"));
                assert_eq!(map["arguments"], json!({"query": "rust"}));
                assert_eq!(
                    map["result"]["results"][0]["url"],
                    json!("https://www.rust-lang.org")
                );
            }
            other => panic!("unexpected tool calls: {:?}", other),
        }
        Ok(())
    }
}
