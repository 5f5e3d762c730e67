use std::sync::Arc;

use intern::assistants::{build_assistant_team, TeamOptions};
use intern::coordinator::{Coordinator, CoordinatorRegistry};
use intern::exa::ExaClient;
use intern::providers::configs::OpenAiProviderConfig;
use intern::providers::openai::OpenAiProvider;
use intern::store::Store;

use crate::configuration::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinators: Arc<CoordinatorRegistry>,
    pub search: Option<Arc<ExaClient>>,
    pub require_session_id: bool,
}

impl AppState {
    pub fn new(coordinators: CoordinatorRegistry) -> Self {
        Self {
            coordinators: Arc::new(coordinators),
            search: None,
            require_session_id: false,
        }
    }

    pub fn with_search(mut self, search: Arc<ExaClient>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_require_session_id(mut self, require: bool) -> Self {
        self.require_session_id = require;
        self
    }

    /// One assistant team per configured model, all sharing `store`
    pub fn from_settings(settings: Settings, store: Arc<Store>) -> anyhow::Result<Self> {
        let search = match settings.search.exa_config() {
            Some(config) => Some(Arc::new(ExaClient::new(config)?)),
            None => {
                tracing::info!("search api key not set, web search is disabled");
                None
            }
        };
        let options = TeamOptions {
            history_runs: settings.chat.history_runs,
            max_tool_rounds: settings.chat.max_tool_rounds,
        };

        let provider_config = settings.provider.into_config()?;
        let default_model = provider_config.model.clone();
        let team = |config: OpenAiProviderConfig| -> anyhow::Result<Arc<dyn Coordinator>> {
            let provider = Arc::new(OpenAiProvider::new(config)?);
            let team: Arc<dyn Coordinator> = Arc::new(build_assistant_team(
                provider,
                store.clone(),
                search.clone(),
                options,
            ));
            Ok(team)
        };

        let mut registry =
            CoordinatorRegistry::new(default_model.clone(), team(provider_config.clone())?);
        for model in settings.chat.models.iter().filter(|m| **m != default_model) {
            registry =
                registry.with_model(model.clone(), team(provider_config.for_model(model.as_str()))?);
        }
        tracing::info!(models = ?registry.models(), "coordinators ready");

        let mut state =
            AppState::new(registry).with_require_session_id(settings.chat.require_session_id);
        if let Some(search) = search {
            state = state.with_search(search);
        }
        Ok(state)
    }
}
