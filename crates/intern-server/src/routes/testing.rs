//! Test doubles shared by the route tests.
use crate::state::AppState;
use async_trait::async_trait;
use axum::response::Response;
use intern::coordinator::{Coordinator, CoordinatorRegistry, RunOutput};
use intern::errors::{AgentError, AgentResult};
use intern::models::run::RunMessage;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Script = Box<dyn Fn(Option<String>, bool) -> AgentResult<RunOutput> + Send + Sync>;

pub struct FakeCoordinator {
    runs: AtomicUsize,
    script: Script,
    messages: AgentResult<Vec<RunMessage>>,
}

impl FakeCoordinator {
    pub fn replying<F>(script: F) -> Arc<Self>
    where
        F: Fn(Option<String>, bool) -> AgentResult<RunOutput> + Send + Sync + 'static,
    {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            script: Box::new(script),
            messages: Ok(Vec::new()),
        })
    }

    pub fn with_messages(messages: AgentResult<Vec<RunMessage>>) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            script: Box::new(|_, _| Err(AgentError::Internal("no script".into()))),
            messages,
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Coordinator for FakeCoordinator {
    fn id(&self) -> &str {
        "fake"
    }

    async fn run(
        &self,
        _message: &str,
        session_id: Option<String>,
        stream: bool,
    ) -> AgentResult<RunOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        (self.script)(session_id, stream)
    }

    async fn messages_for_session(&self, _session_id: &str) -> AgentResult<Vec<RunMessage>> {
        self.messages.clone()
    }
}

pub fn app_state(coordinator: Arc<FakeCoordinator>) -> AppState {
    AppState::new(CoordinatorRegistry::new("gpt-4o", coordinator))
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
