use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::role::Role;
use crate::models::run::{transcript, EventSender, RunMessage, RunResult, RunStream};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::session::SessionStore;
use crate::store::format_timestamp;
use crate::systems::System;

pub const DEFAULT_HISTORY_RUNS: usize = 3;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// How a team member is introduced to the leader
#[derive(Clone, Debug, Serialize)]
pub(crate) struct MemberInfo {
    pub id: String,
    pub name: String,
    pub role: Option<String>,
}

#[derive(Serialize)]
struct PromptContext<'a> {
    name: &'a str,
    role: Option<&'a str>,
    current_time: String,
    instructions: &'a [String],
    systems: Vec<SystemInfo>,
    members: &'a [MemberInfo],
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
#[derive(Clone)]
pub struct Agent {
    id: String,
    name: String,
    role: Option<String>,
    instructions: Vec<String>,
    provider: Arc<dyn Provider>,
    systems: Vec<Arc<dyn System>>,
    members: Vec<MemberInfo>,
    sessions: Option<SessionStore>,
    history_runs: usize,
    max_tool_rounds: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new<I, N>(id: I, name: N, provider: Arc<dyn Provider>) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            instructions: Vec::new(),
            provider,
            systems: Vec::new(),
            members: Vec::new(),
            sessions: None,
            history_runs: DEFAULT_HISTORY_RUNS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_role<S: Into<String>>(mut self, role: S) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_system(mut self, system: Arc<dyn System>) -> Self {
        self.add_system(system);
        self
    }

    /// Persist runs and read back the last `history_runs` of a session
    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_history_runs(mut self, history_runs: usize) -> Self {
        self.history_runs = history_runs;
        self
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    pub(crate) fn with_members(mut self, members: Vec<MemberInfo>) -> Self {
        self.members = members;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Arc<dyn System>) {
        self.systems.push(system);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn sessions(&self) -> Option<&SessionStore> {
        self.sessions.as_ref()
    }

    /// Answer `message` in one go
    pub async fn run(&self, message: &str, session_id: Option<String>) -> AgentResult<RunResult> {
        self.execute(message, session_id, None, None).await
    }

    /// Answer `message`, yielding text deltas as the model produces them and
    /// the finished result last. Dropping the stream cancels the run.
    pub fn run_stream(&self, message: &str, session_id: Option<String>) -> RunStream {
        let agent = self.clone();
        let message = message.to_string();
        crate::coordinator::spawn_run(move |events| async move {
            agent
                .execute(&message, session_id, None, Some(&events))
                .await
        })
    }

    /// Stored transcript of this agent's runs in the session
    pub fn session_messages(&self, session_id: &str) -> AgentResult<Vec<RunMessage>> {
        match &self.sessions {
            Some(sessions) => sessions.messages(session_id, &self.id),
            None => Ok(Vec::new()),
        }
    }

    /// One complete run: load history, loop the model over tool calls, persist.
    ///
    /// `extra` is a system available for this run only. With `events`, text is
    /// streamed and the run stops once the receiving side is dropped.
    pub(crate) async fn execute(
        &self,
        message: &str,
        session_id: Option<String>,
        extra: Option<Arc<dyn System>>,
        events: Option<&EventSender>,
    ) -> AgentResult<RunResult> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let run_id = Uuid::new_v4().to_string();

        let mut systems = self.systems.clone();
        systems.extend(extra);
        let tools = prefixed_tools(&systems);
        let system_prompt = self.system_prompt(&systems)?;

        let mut messages = self.history(&session_id)?;
        let user_message = Message::user().with_text(message);
        messages.push(user_message.clone());
        let mut produced = vec![user_message];

        tracing::info!(
            agent = %self.id,
            session_id = %session_id,
            run_id = %run_id,
            history = messages.len() - 1,
            "run started"
        );

        for round in 0..=self.max_tool_rounds {
            // Out of tool rounds, the model has to answer with what it has
            let round_tools: &[Tool] = if round == self.max_tool_rounds {
                &[]
            } else {
                &tools
            };
            let response = self
                .complete(&system_prompt, &messages, round_tools, events)
                .await?;
            messages.push(response.clone());
            produced.push(response.clone());

            let tool_requests: Vec<&ToolRequest> = response.tool_requests();
            if tool_requests.is_empty() {
                break;
            }
            if round == self.max_tool_rounds {
                tracing::warn!(agent = %self.id, run_id = %run_id, "tool round limit reached");
                break;
            }

            // Dispatch in parallel but wait until all are finished
            let futures: Vec<_> = tool_requests
                .iter()
                .map(|request| dispatch_tool_call(&systems, request.tool_call.clone()))
                .collect();
            let outputs = cancellable(events, join_all(futures)).await?;

            let mut tool_response = Message::user();
            for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                if let Err(e) = &output {
                    tracing::warn!(agent = %self.id, tool_call_id = %request.id, "tool failed: {}", e);
                }
                tool_response = tool_response.with_tool_response(request.id.clone(), output);
            }
            messages.push(tool_response.clone());
            produced.push(tool_response);
        }

        let run_messages = transcript(&produced);
        if let Some(sessions) = &self.sessions {
            sessions.append_run(&session_id, &self.id, &run_id, &run_messages)?;
        }

        let mut result = RunResult::new(session_id, run_id);
        let assistant_texts: Vec<String> = produced
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
            .filter(|text| !text.is_empty())
            .collect();
        result.content = produced
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
            .filter(|text| !text.is_empty());
        if !assistant_texts.is_empty() {
            result.output_text = Some(assistant_texts.join("\n\n"));
        }
        result.messages = run_messages;

        tracing::info!(agent = %self.id, "completed {}", result);
        Ok(result)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[Tool],
        events: Option<&EventSender>,
    ) -> AgentResult<Message> {
        let response = match events {
            Some(events) => {
                cancellable(
                    Some(events),
                    self.provider.stream(system_prompt, messages, tools, events),
                )
                .await?
            }
            None => self.provider.complete(system_prompt, messages, tools).await,
        };
        response
            .map(|(message, _usage)| message)
            .map_err(|e| AgentError::Provider(e.to_string()))
    }

    fn system_prompt(&self, systems: &[Arc<dyn System>]) -> AgentResult<String> {
        let context = PromptContext {
            name: &self.name,
            role: self.role.as_deref(),
            current_time: format_timestamp(Utc::now()),
            instructions: &self.instructions,
            systems: systems
                .iter()
                .map(|system| {
                    SystemInfo::new(system.name(), system.description(), system.instructions())
                })
                .collect(),
            members: &self.members,
        };
        load_prompt_file("agent.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Text turns of the last runs of this session; tool traffic is not replayed
    fn history(&self, session_id: &str) -> AgentResult<Vec<Message>> {
        let Some(sessions) = &self.sessions else {
            return Ok(Vec::new());
        };
        let history = sessions.history(session_id, &self.id, self.history_runs)?;
        Ok(history
            .into_iter()
            .filter(|m| m.role.is_conversational() && !m.content.is_empty())
            .map(|m| match m.role {
                Role::Assistant => Message::assistant().with_text(m.content),
                _ => Message::user().with_text(m.content),
            })
            .collect())
    }
}

/// Run `future` unless the receiving side of `events` goes away first
async fn cancellable<F: Future>(events: Option<&EventSender>, future: F) -> AgentResult<F::Output> {
    match events {
        Some(events) => tokio::select! {
            output = future => Ok(output),
            _ = events.closed() => Err(AgentError::Cancelled("client disconnected".to_string())),
        },
        None => Ok(future.await),
    }
}

/// Get all tools from all systems with proper system prefixing
fn prefixed_tools(systems: &[Arc<dyn System>]) -> Vec<Tool> {
    let mut tools = Vec::new();
    for system in systems {
        for tool in system.tools() {
            tools.push(Tool::new(
                format!("{}__{}", system.name(), tool.name),
                &tool.description,
                tool.input_schema.clone(),
            ));
        }
    }
    tools
}

/// Dispatch a single tool call to the appropriate system
async fn dispatch_tool_call(
    systems: &[Arc<dyn System>],
    tool_call: AgentResult<ToolCall>,
) -> AgentResult<Vec<Content>> {
    let call = tool_call?;
    let (system_name, tool_name) = call
        .name
        .split_once("__")
        .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
    let system = systems
        .iter()
        .find(|system| system.name() == system_name)
        .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

    tracing::debug!(tool = %call.name, "dispatching tool call");
    system
        .call(ToolCall::new(tool_name, call.arguments))
        .await
}
