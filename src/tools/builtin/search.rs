//! Event search.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::store::{Event, EventQuery, SortOrder, Visibility};
use crate::tools::builtin::{EventSummary, ToolServices, normalize_tags};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

/// Results returned per call.
const PAGE_SIZE: usize = 10;
/// Rows fetched per visibility before in-process keyword filtering.
const CANDIDATE_CAP: usize = 100;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Scope {
    #[default]
    Upcoming,
    Past,
    All,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    keyword: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    scope: Scope,
}

/// Search public events and the caller's own events.
pub struct SearchEventsTool {
    services: ToolServices,
}

impl SearchEventsTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }

    fn query(&self, visibility: Visibility, params: &SearchParams, now: DateTime<Utc>) -> EventQuery {
        let mut from = params.date_from;
        let mut before = params.date_to;
        let mut order = SortOrder::Ascending;
        match params.scope {
            Scope::Upcoming => from = Some(from.map_or(now, |f| f.max(now))),
            Scope::Past => {
                before = Some(before.map_or(now, |b| b.min(now)));
                // Newest past events first so the cap keeps the most recent ones.
                order = SortOrder::Descending;
            }
            Scope::All => {}
        }

        let mut query = EventQuery::new(visibility, CANDIDATE_CAP).ordered(order);
        if let Some(from) = from {
            query = query.starting_from(from);
        }
        if let Some(before) = before {
            query = query.starting_before(before);
        }
        query
    }
}

fn matches(event: &Event, keyword: Option<&str>, tags: &[String]) -> bool {
    if let Some(keyword) = keyword {
        let haystacks = [
            Some(event.title.as_str()),
            event.description.as_deref(),
            event.location.as_deref(),
        ];
        let in_text = haystacks
            .iter()
            .flatten()
            .any(|h| h.to_lowercase().contains(keyword));
        let in_tags = event.tags.iter().any(|t| t.to_lowercase().contains(keyword));
        if !in_text && !in_tags {
            return false;
        }
    }
    tags.is_empty()
        || event
            .tags
            .iter()
            .any(|t| tags.contains(&t.to_lowercase()))
}

#[async_trait]
impl Tool for SearchEventsTool {
    fn name(&self) -> &str {
        "search_events"
    }

    fn description(&self) -> &str {
        "Search events visible to the user (public events and events they own) by keyword, \
         tags and date range. Returns at most 10 events ordered by start time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "maxLength": 100,
                    "description": "Case-insensitive text matched against title, description, location and tags"
                },
                "tags": {
                    "type": "array",
                    "maxItems": 10,
                    "items": {"type": "string"},
                    "description": "Only events carrying at least one of these tags"
                },
                "dateFrom": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Events starting at or after this instant (RFC 3339)"
                },
                "dateTo": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Events starting before this instant (RFC 3339)"
                },
                "scope": {
                    "type": "string",
                    "enum": ["upcoming", "past", "all"],
                    "description": "Time scope, default upcoming"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let params: SearchParams = parse_params(params)?;

        if let (Some(from), Some(to)) = (params.date_from, params.date_to)
            && from >= to
        {
            return Err(ToolError::invalid("dateTo", "must be after dateFrom"));
        }

        let keyword = params
            .keyword
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty());
        let tags = normalize_tags(&params.tags);

        let public_query = self.query(Visibility::Public, &params, ctx.now);
        let owned_query = self.query(
            Visibility::OwnedBy(ctx.subject_id().to_string()),
            &params,
            ctx.now,
        );
        let (public, owned) = tokio::try_join!(
            self.services.store.query_events(&public_query),
            self.services.store.query_events(&owned_query),
        )?;

        let mut candidates: HashMap<uuid::Uuid, Event> = HashMap::new();
        for event in public.into_iter().chain(owned) {
            candidates.entry(event.id).or_insert(event);
        }

        let mut hits: Vec<Event> = candidates
            .into_values()
            .filter(|e| matches(e, keyword.as_deref(), &tags))
            .collect();
        hits.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));

        let total = hits.len();
        let page: Vec<Event> = if params.scope == Scope::Past {
            hits.split_off(total.saturating_sub(PAGE_SIZE))
        } else {
            hits.truncate(PAGE_SIZE);
            hits
        };

        let summaries: Vec<EventSummary> = page
            .iter()
            .map(|e| EventSummary::new(e, ctx.subject_id()))
            .collect();

        let result = serde_json::json!({
            "events": summaries,
            "count": summaries.len(),
            "truncated": total > PAGE_SIZE,
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
