use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{optional_str, optional_u32, required_str, System};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::store::{format_timestamp, CalendarEvent, Store};

const DEFAULT_UPCOMING_DAYS: u32 = 7;

pub struct CalendarSystem {
    store: Arc<Store>,
    tools: Vec<Tool>,
}

impl CalendarSystem {
    pub fn new(store: Arc<Store>) -> Self {
        let upcoming_events = Tool::new(
            "upcoming_events",
            "Retrieve calendar events starting within the next N days.",
            json!({
                "type": "object",
                "required": [],
                "properties": {
                    "days": {
                        "type": "integer",
                        "default": DEFAULT_UPCOMING_DAYS,
                        "description": "Number of days to look ahead."
                    }
                }
            }),
        );

        let add_event = Tool::new(
            "add_event",
            "Add a new event to the calendar.",
            json!({
                "type": "object",
                "required": ["title", "start_ts", "end_ts"],
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "Event title."
                    },
                    "start_ts": {
                        "type": "string",
                        "description": "Start timestamp in ISO8601 format, e.g. 2025-11-03T14:00:00Z."
                    },
                    "end_ts": {
                        "type": "string",
                        "description": "End timestamp in ISO8601 format."
                    },
                    "attendees": {
                        "type": "string",
                        "default": "",
                        "description": "Comma-separated list of attendees."
                    }
                }
            }),
        );

        let events_by_attendee = Tool::new(
            "events_by_attendee",
            "Retrieve events where a specific person is an attendee.",
            json!({
                "type": "object",
                "required": ["attendee_name"],
                "properties": {
                    "attendee_name": {
                        "type": "string",
                        "description": "Name or email of the attendee."
                    }
                }
            }),
        );

        let all_events = Tool::new(
            "all_events",
            "Retrieve every event in the calendar.",
            json!({
                "type": "object",
                "required": [],
                "properties": {}
            }),
        );

        Self {
            store,
            tools: vec![upcoming_events, add_event, events_by_attendee, all_events],
        }
    }

    fn upcoming_events(&self, params: &Value) -> AgentResult<String> {
        let days = optional_u32(params, "days")?.unwrap_or(DEFAULT_UPCOMING_DAYS);
        let now = Utc::now();
        let events = self
            .store
            .events_between(now, now + Duration::days(i64::from(days)))?;
        Ok(format_events(&events, || {
            format!("No events scheduled for the next {} days.", days)
        }))
    }

    fn add_event(&self, params: &Value) -> AgentResult<String> {
        let title = required_str(params, "title")?;
        let start = parse_timestamp(required_str(params, "start_ts")?)?;
        let end = parse_timestamp(required_str(params, "end_ts")?)?;
        if end < start {
            return Err(AgentError::InvalidParameters(
                "'end_ts' must not be before 'start_ts'".into(),
            ));
        }
        let attendees = optional_str(params, "attendees").unwrap_or("");

        let id = self.store.insert_event(
            title,
            &format_timestamp(start),
            &format_timestamp(end),
            attendees,
        )?;
        tracing::info!(event_id = id, title, "calendar event added");
        Ok(format!("Event '{}' added successfully with ID: {}", title, id))
    }

    fn events_by_attendee(&self, params: &Value) -> AgentResult<String> {
        let attendee = required_str(params, "attendee_name")?;
        let events = self.store.events_by_attendee(attendee)?;
        Ok(format_events(&events, || {
            format!("No events found with attendee '{}'.", attendee)
        }))
    }

    fn all_events(&self) -> AgentResult<String> {
        let events = self.store.all_events()?;
        Ok(format_events(&events, || {
            "No events found in the calendar.".to_string()
        }))
    }
}

/// Stored timestamps must compare as strings, so everything is normalized to UTC
fn parse_timestamp(raw: &str) -> AgentResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            AgentError::InvalidParameters(format!(
                "'{}' is not an ISO8601 timestamp: {}",
                raw, e
            ))
        })
}

fn format_events(events: &[CalendarEvent], empty: impl FnOnce() -> String) -> String {
    if events.is_empty() {
        return empty();
    }
    events
        .iter()
        .map(|event| {
            format!(
                "ID: {}\nTitle: {}\nStart: {}\nEnd: {}\nAttendees: {}\n",
                event.id, event.title, event.start_ts, event.end_ts, event.attendees
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[async_trait]
impl System for CalendarSystem {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Manage calendar events, add new events, and list the upcoming schedule"
    }

    fn instructions(&self) -> &str {
        "Help users find events by attendee, date range, or title. \
        Provide clear summaries of upcoming schedules and commitments. \
        When adding events, timestamps must be in ISO8601 format."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let text = match tool_call.name.as_str() {
            "upcoming_events" => self.upcoming_events(&tool_call.arguments),
            "add_event" => self.add_event(&tool_call.arguments),
            "events_by_attendee" => self.events_by_attendee(&tool_call.arguments),
            "all_events" => self.all_events(),
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }?;
        Ok(vec![Content::text(text)])
    }
}
