//! A leader agent that hands tasks to member agents.
//!
//! The leader reaches its members through a delegation system that exists for
//! a single run. Members answer within the same session, and what they did
//! (including their own tool calls) is appended to the team's result.
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::agent::{Agent, MemberInfo};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::run::{EventSender, RunMessage, RunResult, RunStream};
use crate::models::tool::{Tool, ToolCall};
use crate::systems::{optional_str, required_str, System};

#[derive(Clone)]
pub struct Team {
    leader: Agent,
    members: Arc<Vec<Agent>>,
}

impl Team {
    pub fn new(leader: Agent, members: Vec<Agent>) -> Self {
        let info = members
            .iter()
            .map(|member| MemberInfo {
                id: member.id().to_string(),
                name: member.name().to_string(),
                role: member.role().map(str::to_string),
            })
            .collect();
        Self {
            leader: leader.with_members(info),
            members: Arc::new(members),
        }
    }

    pub fn id(&self) -> &str {
        self.leader.id()
    }

    pub fn name(&self) -> &str {
        self.leader.name()
    }

    pub fn members(&self) -> &[Agent] {
        &self.members
    }

    pub async fn run(&self, message: &str, session_id: Option<String>) -> AgentResult<RunResult> {
        self.execute(message, session_id, None).await
    }

    /// Streams the leader's text; members answer the leader, not the caller
    pub fn run_stream(&self, message: &str, session_id: Option<String>) -> RunStream {
        let team = self.clone();
        let message = message.to_string();
        crate::coordinator::spawn_run(move |events| async move {
            team.execute(&message, session_id, Some(&events)).await
        })
    }

    pub fn session_messages(&self, session_id: &str) -> AgentResult<Vec<RunMessage>> {
        self.leader.session_messages(session_id)
    }

    async fn execute(
        &self,
        message: &str,
        session_id: Option<String>,
        events: Option<&EventSender>,
    ) -> AgentResult<RunResult> {
        // Members need the id before the leader would generate one
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let delegation = Arc::new(Delegation::new(self.members.clone(), session_id.clone()));

        let mut result = self
            .leader
            .execute(
                message,
                Some(session_id),
                Some(delegation.clone() as Arc<dyn System>),
                events,
            )
            .await?;
        result.messages.extend(delegation.take_transcripts());
        Ok(result)
    }
}

/// Gives the leader its members for the length of one run
struct Delegation {
    members: Arc<Vec<Agent>>,
    session_id: String,
    tools: Vec<Tool>,
    transcripts: Mutex<Vec<RunMessage>>,
}

impl Delegation {
    fn new(members: Arc<Vec<Agent>>, session_id: String) -> Self {
        let member_ids: Vec<&str> = members.iter().map(Agent::id).collect();
        let transfer = Tool::new(
            "transfer_task_to_member",
            "Hand a task to a team member and get their answer back.",
            json!({
                "type": "object",
                "required": ["member_id", "task"],
                "properties": {
                    "member_id": {
                        "enum": member_ids,
                        "description": "The id of the member to transfer the task to."
                    },
                    "task": {
                        "type": "string",
                        "description": "A clear, self-contained description of the task."
                    },
                    "expected_output": {
                        "type": "string",
                        "default": null,
                        "description": "What the member should answer with."
                    }
                }
            }),
        );
        Self {
            members,
            session_id,
            tools: vec![transfer],
            transcripts: Mutex::new(Vec::new()),
        }
    }

    fn take_transcripts(&self) -> Vec<RunMessage> {
        self.transcripts
            .lock()
            .map(|mut transcripts| std::mem::take(&mut *transcripts))
            .unwrap_or_default()
    }

    async fn transfer(&self, params: &serde_json::Value) -> AgentResult<String> {
        let member_id = required_str(params, "member_id")?;
        let task = required_str(params, "task")?;
        let member = self
            .members
            .iter()
            .find(|member| member.id() == member_id)
            .ok_or_else(|| {
                let known: Vec<&str> = self.members.iter().map(Agent::id).collect();
                AgentError::InvalidParameters(format!(
                    "Unknown member '{}', expected one of: {}",
                    member_id,
                    known.join(", ")
                ))
            })?;

        let task = match optional_str(params, "expected_output").filter(|s| !s.is_empty()) {
            Some(expected) => format!("{}\n\nExpected output: {}", task, expected),
            None => task.to_string(),
        };

        tracing::info!(member = member_id, session_id = %self.session_id, "task transferred");
        let result = member
            .execute(&task, Some(self.session_id.clone()), None, None)
            .await
            .map_err(|e| AgentError::ExecutionError(format!("{} failed: {}", member_id, e)))?;

        let answer = result
            .content
            .clone()
            .or_else(|| result.output_text.clone())
            .unwrap_or_else(|| format!("{} finished without an answer.", member.name()));
        if let Ok(mut transcripts) = self.transcripts.lock() {
            transcripts.extend(result.messages);
        }
        Ok(answer)
    }
}

#[async_trait]
impl System for Delegation {
    fn name(&self) -> &str {
        "team"
    }

    fn description(&self) -> &str {
        "Delegate tasks to the members of your team"
    }

    fn instructions(&self) -> &str {
        "Transfer each part of the request to the member best suited for it. \
        Several transfers can run at once when they are independent."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "transfer_task_to_member" => Ok(vec![Content::text(
                self.transfer(&tool_call.arguments).await?,
            )]),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::models::role::Role;
    use crate::models::run::{RawToolCall, RunEvent};
    use crate::providers::mock::MockProvider;
    use crate::session::SessionStore;
    use crate::store::Store;
    use futures::StreamExt;

    fn transfer(member_id: &str, task: &str) -> Message {
        Message::assistant().with_tool_request(
            "call_1",
            Ok(ToolCall::new(
                "team__transfer_task_to_member",
                json!({"member_id": member_id, "task": task}),
            )),
        )
    }

    fn team(leader: Vec<Message>, member: Vec<Message>) -> (Team, Arc<MockProvider>) {
        let member_provider = Arc::new(MockProvider::new(member));
        let member = Agent::new("calendar-agent", "Calendar Agent", member_provider.clone())
            .with_role("Manage calendar events");
        let leader = Agent::new(
            "assistant-team",
            "Personal Assistant Team",
            Arc::new(MockProvider::new(leader)),
        );
        (Team::new(leader, vec![member]), member_provider)
    }

    #[tokio::test]
    async fn test_leader_delegates_to_member() -> AgentResult<()> {
        let (team, member_provider) = team(
            vec![
                transfer("calendar-agent", "List meetings with Chris"),
                Message::assistant().with_text("You have standup with Chris."),
            ],
            vec![Message::assistant().with_text("Standup, tomorrow 10:00")],
        );

        let result = team.run("What's on with Chris?", Some("s-1".into())).await?;

        assert_eq!(result.content.as_deref(), Some("You have standup with Chris."));
        // leader user + transfer + answer, then member user + answer
        assert_eq!(result.messages.len(), 5);
        match &result.messages[1].tool_calls[0] {
            RawToolCall::Record(call) => {
                assert_eq!(call.result, json!("Standup, tomorrow 10:00"))
            }
            other => panic!("unexpected tool call: {:?}", other),
        }
        assert_eq!(
            result.messages[3],
            RunMessage::new(Role::User, "List meetings with Chris")
        );
        assert_eq!(member_provider.received().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_member_is_reported_to_leader() -> AgentResult<()> {
        let (team, member_provider) = team(
            vec![
                transfer("travel-agent", "Book a flight"),
                Message::assistant().with_text("I can't book flights."),
            ],
            vec![],
        );

        let result = team.run("Book a flight", None).await?;

        match &result.messages[1].tool_calls[0] {
            RawToolCall::Record(call) => assert!(call.result["error"]
                .as_str()
                .unwrap()
                .contains("Unknown member 'travel-agent'")),
            other => panic!("unexpected tool call: {:?}", other),
        }
        assert!(member_provider.received().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_members_share_the_session() -> AgentResult<()> {
        let store = Arc::new(Store::open_in_memory()?);
        let sessions = SessionStore::new(store);
        let member = Agent::new(
            "email-agent",
            "Email Agent",
            Arc::new(MockProvider::new(vec![Message::assistant().with_text("No new email")])),
        )
        .with_sessions(sessions.clone());
        let leader = Agent::new(
            "assistant-team",
            "Personal Assistant Team",
            Arc::new(MockProvider::new(vec![
                transfer("email-agent", "Check email"),
                Message::assistant().with_text("Inbox is empty."),
            ])),
        )
        .with_sessions(sessions.clone());
        let team = Team::new(leader, vec![member]);

        let result = team.run("Any email?", None).await?;

        assert_eq!(sessions.messages(&result.session_id, "email-agent")?.len(), 2);
        assert_eq!(team.session_messages(&result.session_id)?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_team_stream_ends_with_full_result() {
        let (team, _) = team(
            vec![
                transfer("calendar-agent", "List meetings"),
                Message::assistant().with_text("Done."),
            ],
            vec![Message::assistant().with_text("Nothing scheduled")],
        );

        let events: Vec<_> = team.run_stream("Meetings?", None).collect().await;

        // Member output is not streamed
        assert_eq!(events[0], Ok(RunEvent::Delta("Done.".into())));
        match events.last() {
            Some(Ok(RunEvent::Completed(result))) => assert_eq!(result.messages.len(), 5),
            other => panic!("unexpected last event: {:?}", other),
        }
    }
}
