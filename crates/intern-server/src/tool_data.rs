//! Tool calls as reported to HTTP clients.
use intern::models::run::{RawToolCall, RunMessage};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Suffixes of the tools whose results carry web pages
const SEARCH_TOOLS: &[&str] = &["web_search", "find_similar", "search_exa"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub result: Value,
}

/// Bring a tool call of either shape into one record.
///
/// Missing fields become an empty name, empty arguments or `null`.
pub fn normalize(call: &RawToolCall) -> ToolCallRecord {
    match call {
        RawToolCall::Record(execution) => ToolCallRecord {
            name: execution.name.clone(),
            arguments: arguments(&execution.arguments),
            result: execution.result.clone(),
        },
        RawToolCall::Mapping(mapping) => ToolCallRecord {
            name: field(mapping, &["name", "tool_name"])
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            arguments: field(mapping, &["arguments", "tool_args", "args"])
                .map(arguments)
                .unwrap_or_default(),
            result: field(mapping, &["result"]).cloned().unwrap_or(Value::Null),
        },
    }
}

/// The first of `keys` present in `mapping`
fn field<'a>(mapping: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| mapping.get(*key))
}

fn arguments(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

/// Matches both bare names and names prefixed with their system, like `search__web_search`
pub fn is_search_tool(name: &str) -> bool {
    let tool = name.rsplit("__").next().unwrap_or(name);
    SEARCH_TOOLS.contains(&tool)
}

/// Search tool calls of a run and the distinct page urls they returned
pub fn extract_search_data(messages: &[RunMessage]) -> (Vec<Value>, Vec<String>) {
    let mut search_results = Vec::new();
    let mut sources = HashSet::new();

    for call in messages.iter().flat_map(|message| &message.tool_calls) {
        let record = normalize(call);
        if !is_search_tool(&record.name) {
            continue;
        }

        let result = match &record.result {
            Value::String(text) => {
                serde_json::from_str::<Value>(text).unwrap_or_else(|_| record.result.clone())
            }
            other => other.clone(),
        };
        if let Some(results) = result.get("results").and_then(Value::as_array) {
            sources.extend(
                results
                    .iter()
                    .filter_map(|hit| hit.get("url").and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(str::to_string),
            );
        }

        search_results.push(json!({
            "tool": record.name,
            "arguments": record.arguments,
            "result": result,
        }));
    }

    (search_results, sources.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intern::models::role::Role;
    use intern::models::run::ToolExecution;

    fn search_call(urls: &[&str]) -> RawToolCall {
        let results: Vec<Value> = urls.iter().map(|url| json!({"url": url})).collect();
        RawToolCall::Record(ToolExecution {
            name: "search__web_search".to_string(),
            arguments: json!({"query": "rust"}),
            result: json!({ "results": results }),
        })
    }

    #[test]
    fn test_normalize_record() {
        let record = normalize(&search_call(&["https://a.example"]));
        assert_eq!(record.name, "search__web_search");
        assert_eq!(record.arguments.get("query"), Some(&json!("rust")));
        assert_eq!(record.result["results"][0]["url"], "https://a.example");
    }

    #[test]
    fn test_normalize_mapping_aliases() {
        let mapping = json!({
            "tool_name": "calendar__all_events",
            "tool_args": "{\"days\": 3}",
        });
        let call = RawToolCall::Mapping(mapping.as_object().cloned().unwrap());

        let record = normalize(&call);
        assert_eq!(record.name, "calendar__all_events");
        assert_eq!(record.arguments.get("days"), Some(&json!(3)));
        assert_eq!(record.result, Value::Null);
    }

    #[test]
    fn test_normalize_missing_fields() {
        let call = RawToolCall::Mapping(Map::new());
        let record = normalize(&call);
        assert_eq!(
            record,
            ToolCallRecord {
                name: String::new(),
                arguments: Map::new(),
                result: Value::Null,
            }
        );

        let mapping = json!({"name": "x", "arguments": [1, 2]});
        let record = normalize(&RawToolCall::Mapping(mapping.as_object().cloned().unwrap()));
        assert!(record.arguments.is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let first = normalize(&search_call(&["https://a.example"]));
        let again = normalize(&RawToolCall::Mapping(
            serde_json::to_value(&first)
                .unwrap()
                .as_object()
                .cloned()
                .unwrap(),
        ));
        assert_eq!(first, again);
    }

    #[test]
    fn test_is_search_tool() {
        assert!(is_search_tool("web_search"));
        assert!(is_search_tool("search__find_similar"));
        assert!(is_search_tool("search_exa"));
        assert!(!is_search_tool("email__search_emails"));
        assert!(!is_search_tool("team__transfer_task_to_member"));
    }

    #[test]
    fn test_extract_dedups_sources() {
        let messages = vec![
            RunMessage::new(Role::User, "find rust news"),
            RunMessage::new(Role::Assistant, "")
                .with_tool_call(search_call(&["https://a.example", "https://b.example"]))
                .with_tool_call(search_call(&["https://a.example"])),
            RunMessage::new(Role::Assistant, "").with_tool_call(RawToolCall::Record(
                ToolExecution {
                    name: "email__recent_emails".to_string(),
                    arguments: json!({}),
                    result: json!("No emails found."),
                },
            )),
        ];

        let (search_results, mut sources) = extract_search_data(&messages);
        sources.sort();

        assert_eq!(search_results.len(), 2);
        assert_eq!(search_results[0]["tool"], "search__web_search");
        assert_eq!(search_results[0]["arguments"]["query"], "rust");
        assert_eq!(sources, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_extract_parses_string_results() {
        let mapping = json!({
            "name": "web_search",
            "arguments": {"query": "tokio"},
            "result": "{\"results\": [{\"url\": \"https://tokio.rs\"}]}",
        });
        let messages = vec![RunMessage::new(Role::Assistant, "")
            .with_tool_call(RawToolCall::Mapping(mapping.as_object().cloned().unwrap()))];

        let (search_results, sources) = extract_search_data(&messages);
        assert_eq!(sources, vec!["https://tokio.rs"]);
        assert_eq!(search_results[0]["result"]["results"][0]["url"], "https://tokio.rs");
    }

    #[test]
    fn test_extract_without_search_calls() {
        let messages = vec![RunMessage::new(Role::Assistant, "hello")];
        let (search_results, sources) = extract_search_data(&messages);
        assert!(search_results.is_empty());
        assert!(sources.is_empty());
    }
}
