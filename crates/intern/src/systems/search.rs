use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{optional_str, optional_u32, required_str, System};
use crate::errors::{AgentError, AgentResult};
use crate::exa::{ExaClient, SearchHit};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

const SEARCH_TYPES: [&str; 3] = ["auto", "neural", "keyword"];

/// Web search backed by Exa
pub struct SearchSystem {
    client: Arc<ExaClient>,
    tools: Vec<Tool>,
}

impl SearchSystem {
    pub fn new(client: Arc<ExaClient>) -> Self {
        let web_search = Tool::new(
            "web_search",
            "Search the web and return matching pages with their text.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for."
                    },
                    "num_results": {
                        "type": "integer",
                        "default": null,
                        "description": "How many results to return."
                    },
                    "search_type": {
                        "enum": SEARCH_TYPES,
                        "default": "auto",
                        "description": "'neural' for conceptual searches, 'keyword' for exact terms."
                    }
                }
            }),
        );

        let find_similar = Tool::new(
            "find_similar",
            "Find pages similar to a given URL.",
            json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The page to find similar pages for."
                    },
                    "num_results": {
                        "type": "integer",
                        "default": null,
                        "description": "How many results to return."
                    }
                }
            }),
        );

        Self {
            client,
            tools: vec![web_search, find_similar],
        }
    }

    async fn web_search(&self, params: &Value) -> AgentResult<Vec<SearchHit>> {
        let query = required_str(params, "query")?;
        let num_results = optional_u32(params, "num_results")?;
        let search_type = optional_str(params, "search_type");
        if let Some(kind) = search_type {
            if !SEARCH_TYPES.contains(&kind) {
                return Err(AgentError::InvalidParameters(format!(
                    "Unknown search_type '{}'",
                    kind
                )));
            }
        }

        self.client
            .search(query, num_results, search_type, true)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))
    }

    async fn find_similar(&self, params: &Value) -> AgentResult<Vec<SearchHit>> {
        let url = required_str(params, "url")?;
        let num_results = optional_u32(params, "num_results")?;
        self.client
            .find_similar(url, num_results)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))
    }
}

#[async_trait]
impl System for SearchSystem {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web and retrieve page contents"
    }

    fn instructions(&self) -> &str {
        "Use web_search to find relevant pages and find_similar to explore related pages. \
        Always attribute findings to their source URLs. \
        Summarize results with clear headings and bullet points."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let hits = match tool_call.name.as_str() {
            "web_search" => self.web_search(&tool_call.arguments).await,
            "find_similar" => self.find_similar(&tool_call.arguments).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }?;
        let body = serde_json::to_string(&json!({ "results": hits }))?;
        Ok(vec![Content::text(body)])
    }
}
