//! Client for the Exa web search API.
use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExaConfig {
    pub host: String,
    pub api_key: String,
    pub num_results: u32,
    /// Upper bound on the characters of page text kept per result
    pub text_length_limit: u32,
}

impl ExaConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: "https://api.exa.ai".to_string(),
            api_key: api_key.into(),
            num_results: 5,
            text_length_limit: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default, alias = "publishedDate")]
    pub published_date: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct ExaClient {
    client: Client,
    config: ExaConfig,
}

impl ExaClient {
    pub fn new(config: ExaConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }

    /// Search the web. `search_type` is one of `auto`, `neural` or `keyword`.
    pub async fn search(
        &self,
        query: &str,
        num_results: Option<u32>,
        search_type: Option<&str>,
        include_text: bool,
    ) -> Result<Vec<SearchHit>> {
        let mut payload = json!({
            "query": query,
            "numResults": num_results.unwrap_or(self.config.num_results),
            "type": search_type.unwrap_or("auto"),
        });
        self.add_contents(&mut payload, include_text);
        self.post("search", &payload).await
    }

    /// Pages similar to `url`
    pub async fn find_similar(&self, url: &str, num_results: Option<u32>) -> Result<Vec<SearchHit>> {
        let mut payload = json!({
            "url": url,
            "numResults": num_results.unwrap_or(self.config.num_results),
        });
        self.add_contents(&mut payload, true);
        self.post("findSimilar", &payload).await
    }

    fn add_contents(&self, payload: &mut Value, include_text: bool) {
        if !include_text {
            return;
        }
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "contents".to_string(),
                json!({"text": {"maxCharacters": self.config.text_length_limit}}),
            );
        }
    }

    async fn post(&self, endpoint: &str, payload: &Value) -> Result<Vec<SearchHit>> {
        let url = format!("{}/{}", self.config.host.trim_end_matches('/'), endpoint);
        tracing::debug!(%url, "exa request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: SearchResponse = response.json().await?;
                Ok(body
                    .results
                    .into_iter()
                    .map(|hit| self.truncate(hit))
                    .collect())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Exa request failed: {}\nResponse: {}", status, body))
            }
        }
    }

    fn truncate(&self, mut hit: SearchHit) -> SearchHit {
        let limit = self.config.text_length_limit as usize;
        if let Some(text) = hit.text.as_mut() {
            if let Some((cut, _)) = text.char_indices().nth(limit) {
                text.truncate(cut);
            }
        }
        hit
    }
}
