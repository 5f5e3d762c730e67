use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use intern::exa::SearchHit;
use serde::{Deserialize, Serialize};

const SEARCH_ERROR: &str = "An error occurred while searching the web";
const SEARCH_TYPES: &[&str] = &["auto", "neural", "keyword"];

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: Option<String>,
    num_results: Option<u32>,
    search_type: Option<String>,
    #[serde(default = "default_include_content")]
    include_content: bool,
}

fn default_include_content() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchHit>,
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload?;
    let query = request
        .query
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .ok_or_else(|| ApiError::BadRequest("query is required".to_string()))?;
    if let Some(search_type) = request.search_type.as_deref() {
        if !SEARCH_TYPES.contains(&search_type) {
            return Err(ApiError::BadRequest(format!(
                "search_type must be one of: {}",
                SEARCH_TYPES.join(", ")
            )));
        }
    }
    let client = state.search.as_ref().ok_or_else(|| {
        ApiError::Unavailable(
            "Web search is not configured, set INTERN_SEARCH__API_KEY to enable it".to_string(),
        )
    })?;

    tracing::info!(num_results = ?request.num_results, "POST /api/search - query: '{}'", query);
    let results = client
        .search(
            &query,
            request.num_results,
            request.search_type.as_deref(),
            request.include_content,
        )
        .await
        .map_err(|e| ApiError::internal(SEARCH_ERROR, e))?;

    Ok(Json(SearchResponse { query, results }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{app_state, body_json, FakeCoordinator};
    use axum::{body::Body, http::Request, http::StatusCode};
    use intern::exa::{ExaClient, ExaConfig};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn search_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/search")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn state_with_search(host: &str) -> AppState {
        let mut config = ExaConfig::new("test-exa-key");
        config.host = host.to_string();
        app_state(FakeCoordinator::with_messages(Ok(vec![])))
            .with_search(Arc::new(ExaClient::new(config).unwrap()))
    }

    #[tokio::test]
    async fn test_search_returns_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("x-api-key", "test-exa-key"))
            .and(body_partial_json(json!({"query": "tokio runtime", "numResults": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "title": "Tokio",
                    "url": "https://tokio.rs",
                    "publishedDate": "2024-01-01",
                    "text": "An asynchronous runtime"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = routes(state_with_search(&server.uri()))
            .oneshot(search_request(json!({"query": " tokio runtime ", "num_results": 2})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["query"], "tokio runtime");
        assert_eq!(body["results"][0]["url"], "https://tokio.rs");
        assert_eq!(body["results"][0]["published_date"], "2024-01-01");
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let response = routes(state_with_search("http://localhost:1"))
            .oneshot(search_request(json!({"query": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "query is required");
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_type() {
        let response = routes(state_with_search("http://localhost:1"))
            .oneshot(search_request(json!({"query": "rust", "search_type": "fuzzy"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_disabled_without_key() {
        let state = app_state(FakeCoordinator::with_messages(Ok(vec![])));
        let response = routes(state)
            .oneshot(search_request(json!({"query": "rust"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let detail = body_json(response).await["detail"].to_string();
        assert!(detail.contains("INTERN_SEARCH__API_KEY"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_hidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let response = routes(state_with_search(&server.uri()))
            .oneshot(search_request(json!({"query": "rust"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({"detail": SEARCH_ERROR}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = routes(state_with_search("http://127.0.0.1:9"));

        let response = app
            .clone()
            .oneshot(search_request(json!({"query": "tokio", "num_results": "two"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["detail"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/search")
            .header("content-type", "application/json")
            .body(Body::from("{\"query\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["detail"].is_string());
    }
}
