//! Entry points the HTTP layer talks to: a single agent or a team, looked up by model name.
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::Agent;
use crate::errors::AgentResult;
use crate::models::run::{EventSender, RunEvent, RunMessage, RunResult, RunStream};
use crate::team::Team;

/// Bound on undelivered stream events before the run waits for the client
const EVENT_BUFFER: usize = 32;

pub enum RunOutput {
    Completed(RunResult),
    Chunks(RunStream),
}

/// Something that can answer a chat message within a session
#[async_trait]
pub trait Coordinator: Send + Sync {
    fn id(&self) -> &str;

    /// Run one message. With `stream`, output arrives as [`RunOutput::Chunks`]
    /// ending in [`RunEvent::Completed`]; otherwise as [`RunOutput::Completed`].
    async fn run(
        &self,
        message: &str,
        session_id: Option<String>,
        stream: bool,
    ) -> AgentResult<RunOutput>;

    /// Every stored message of the session, oldest first
    async fn messages_for_session(&self, session_id: &str) -> AgentResult<Vec<RunMessage>>;
}

/// Run `run` in its own task, forwarding its events and then its outcome.
///
/// The task ends early when the returned stream is dropped.
pub(crate) fn spawn_run<F, Fut>(run: F) -> RunStream
where
    F: FnOnce(EventSender) -> Fut + Send + 'static,
    Fut: Future<Output = AgentResult<RunResult>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        let outcome = run(tx.clone()).await.map(RunEvent::Completed);
        if let Err(e) = &outcome {
            tracing::warn!("streaming run failed: {}", e);
        }
        // Nobody to tell if the receiver is gone
        let _ = tx.send(outcome).await;
    });
    ReceiverStream::new(rx).boxed()
}

#[async_trait]
impl Coordinator for Agent {
    fn id(&self) -> &str {
        Agent::id(self)
    }

    async fn run(
        &self,
        message: &str,
        session_id: Option<String>,
        stream: bool,
    ) -> AgentResult<RunOutput> {
        if stream {
            Ok(RunOutput::Chunks(self.run_stream(message, session_id)))
        } else {
            Ok(RunOutput::Completed(Agent::run(self, message, session_id).await?))
        }
    }

    async fn messages_for_session(&self, session_id: &str) -> AgentResult<Vec<RunMessage>> {
        self.session_messages(session_id)
    }
}

#[async_trait]
impl Coordinator for Team {
    fn id(&self) -> &str {
        Team::id(self)
    }

    async fn run(
        &self,
        message: &str,
        session_id: Option<String>,
        stream: bool,
    ) -> AgentResult<RunOutput> {
        if stream {
            Ok(RunOutput::Chunks(self.run_stream(message, session_id)))
        } else {
            Ok(RunOutput::Completed(Team::run(self, message, session_id).await?))
        }
    }

    async fn messages_for_session(&self, session_id: &str) -> AgentResult<Vec<RunMessage>> {
        self.session_messages(session_id)
    }
}

/// Coordinators built at startup, one per configured model name
#[derive(Clone)]
pub struct CoordinatorRegistry {
    default_model: String,
    coordinators: HashMap<String, Arc<dyn Coordinator>>,
}

impl CoordinatorRegistry {
    pub fn new<S: Into<String>>(default_model: S, coordinator: Arc<dyn Coordinator>) -> Self {
        let default_model = default_model.into();
        let mut coordinators = HashMap::new();
        coordinators.insert(default_model.clone(), coordinator);
        Self {
            default_model,
            coordinators,
        }
    }

    pub fn with_model<S: Into<String>>(
        mut self,
        model: S,
        coordinator: Arc<dyn Coordinator>,
    ) -> Self {
        self.coordinators.insert(model.into(), coordinator);
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The coordinator for `model`, or the default one when no model is asked for
    pub fn get(&self, model: Option<&str>) -> Option<Arc<dyn Coordinator>> {
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model);
        self.coordinators.get(model).cloned()
    }

    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.coordinators.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use crate::models::message::Message;
    use crate::providers::mock::MockProvider;

    fn agent(id: &str, reply: &str) -> Agent {
        Agent::new(
            id,
            id,
            Arc::new(MockProvider::new(vec![Message::assistant().with_text(reply)])),
        )
    }

    #[tokio::test]
    async fn test_spawn_run_sends_completed_last() {
        let events: Vec<_> = spawn_run(|events| async move {
            events
                .send(Ok(RunEvent::Delta("partial".into())))
                .await
                .map_err(|_| AgentError::Cancelled("closed".into()))?;
            Ok(RunResult::new("s", "r").with_content("done"))
        })
        .collect()
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(RunEvent::Delta("partial".into())));
        assert_eq!(
            events[1],
            Ok(RunEvent::Completed(RunResult::new("s", "r").with_content("done")))
        );
    }

    #[tokio::test]
    async fn test_spawn_run_forwards_errors() {
        let events: Vec<_> =
            spawn_run(|_| async { Err(AgentError::Provider("boom".into())) })
                .collect()
                .await;
        assert_eq!(events, vec![Err(AgentError::Provider("boom".into()))]);
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = CoordinatorRegistry::new("gpt-4o", Arc::new(agent("default", "a")))
            .with_model("gpt-4o-mini", Arc::new(agent("mini", "b")));

        assert_eq!(registry.get(None).map(|c| c.id().to_string()), Some("default".into()));
        assert_eq!(registry.get(Some("  ")).map(|c| c.id().to_string()), Some("default".into()));
        assert_eq!(
            registry.get(Some("gpt-4o-mini")).map(|c| c.id().to_string()),
            Some("mini".into())
        );
        assert!(registry.get(Some("unknown")).is_none());
        assert_eq!(registry.models(), vec!["gpt-4o", "gpt-4o-mini"]);
    }

    #[tokio::test]
    async fn test_agent_coordinator_modes() -> AgentResult<()> {
        let coordinator: Arc<dyn Coordinator> = Arc::new(agent("a", "hello"));
        match coordinator.run("hi", None, false).await? {
            RunOutput::Completed(result) => assert_eq!(result.content.as_deref(), Some("hello")),
            RunOutput::Chunks(_) => panic!("expected a completed run"),
        }

        let coordinator: Arc<dyn Coordinator> = Arc::new(agent("a", "hello"));
        match coordinator.run("hi", None, true).await? {
            RunOutput::Chunks(stream) => {
                let events: Vec<_> = stream.collect().await;
                assert_eq!(events[0], Ok(RunEvent::Delta("hello".into())));
                assert!(matches!(events.last(), Some(Ok(RunEvent::Completed(_)))));
            }
            RunOutput::Completed(_) => panic!("expected chunks"),
        }

        assert!(coordinator.messages_for_session("unknown").await?.is_empty());
        Ok(())
    }
}
