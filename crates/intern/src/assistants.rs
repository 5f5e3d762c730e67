//! The personal assistant team served by the chat API.
use std::sync::Arc;

use crate::agent::{Agent, DEFAULT_HISTORY_RUNS, DEFAULT_MAX_TOOL_ROUNDS};
use crate::exa::ExaClient;
use crate::providers::base::Provider;
use crate::session::SessionStore;
use crate::store::Store;
use crate::systems::{CalendarSystem, EmailSystem, SearchSystem};
use crate::team::Team;

pub const TEAM_ID: &str = "assistant-team";
pub const EMAIL_AGENT_ID: &str = "email-agent";
pub const CALENDAR_AGENT_ID: &str = "calendar-agent";
pub const SEARCH_AGENT_ID: &str = "search-agent";

#[derive(Debug, Clone, Copy)]
pub struct TeamOptions {
    pub history_runs: usize,
    pub max_tool_rounds: usize,
}

impl Default for TeamOptions {
    fn default() -> Self {
        Self {
            history_runs: DEFAULT_HISTORY_RUNS,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Email and calendar agents, plus a web search agent when `search` is configured,
/// led by a coordinator that shares their session history store.
pub fn build_assistant_team(
    provider: Arc<dyn Provider>,
    store: Arc<Store>,
    search: Option<Arc<ExaClient>>,
    options: TeamOptions,
) -> Team {
    let sessions = SessionStore::new(store.clone());
    let agent = |id: &str, name: &str| {
        Agent::new(id, name, provider.clone())
            .with_sessions(sessions.clone())
            .with_history_runs(options.history_runs)
            .with_max_tool_rounds(options.max_tool_rounds)
    };

    let mut members = vec![
        agent(EMAIL_AGENT_ID, "Email Agent")
            .with_role("Retrieve and summarize emails")
            .with_instructions([
                "Retrieve and summarize emails, extracting key information and names.",
                "Mention the sender and date of every email you refer to.",
            ])
            .with_system(Arc::new(EmailSystem::new(store.clone()))),
        agent(CALENDAR_AGENT_ID, "Calendar Agent")
            .with_role("Manage calendar events, add new events, and list upcoming schedule")
            .with_instructions([
                "Manage the calendar database including adding, retrieving, and organizing events.",
                "Help users find events by attendee, date range, or title.",
                "Provide clear summaries of upcoming schedules and commitments.",
                "When adding events, ensure timestamps are in ISO8601 format.",
            ])
            .with_system(Arc::new(CalendarSystem::new(store))),
    ];

    if let Some(client) = search {
        members.push(
            agent(SEARCH_AGENT_ID, "Search Agent")
                .with_role("Search the web and retrieve page contents")
                .with_instructions([
                    "You are a web search and content retrieval specialist.",
                    "Always provide clear source attribution with URLs.",
                    "Summarize findings in a structured, easy-to-read format.",
                    "Use the 'auto' search type unless the query calls for 'neural' or 'keyword'.",
                ])
                .with_system(Arc::new(SearchSystem::new(client))),
        );
    }

    let leader = agent(TEAM_ID, "Personal Assistant Team").with_instructions([
        "Work together to help users manage their emails and calendar.",
        "Email Agent: Retrieve and summarize emails, extract key information and names.",
        "Calendar Agent: Manage calendar events, show upcoming schedule, and add new events.",
        "Coordinate between agents when tasks involve both emails and calendar (e.g., scheduling meetings based on email requests).",
        "Provide comprehensive, well-structured responses that address the user's complete request.",
    ]);

    Team::new(leader, members)
}
