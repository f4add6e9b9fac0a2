//! Built-in scheduling tools.

mod agenda;
mod conflicts;
mod create_event;
mod invite;
mod rsvp;
mod schedule;
mod search;
mod suggest;

pub use agenda::{Agenda, AgendaItem, AgendaRequest, BuildAgendaTool, generate_agenda};
pub use conflicts::CheckConflictsTool;
pub use create_event::CreateEventTool;
pub use invite::InvitePeopleTool;
pub use rsvp::RsvpEventTool;
pub use schedule::GetMyScheduleTool;
pub use search::SearchEventsTool;
pub use suggest::{
    DateRange, MeetingSuggestions, SlotSuggestion, SuggestMeetingTimeTool, SuggestRequest,
    suggest_slots,
};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::calendar::TimeRange;
use crate::error::StoreError;
use crate::llm::StructuredClient;
use crate::notify::Notifier;
use crate::rate_limit::{RateLimiter, Tier};
use crate::store::{Event, MAX_IN_FILTER, RecordStore, RsvpStatus};
use crate::tools::{ToolError, ToolRegistry};

/// Collaborators the built-in tools share.
#[derive(Clone)]
pub struct ToolServices {
    pub store: Arc<dyn RecordStore>,
    pub notifier: Arc<dyn Notifier>,
    pub structured: StructuredClient,
    pub limiter: Arc<RateLimiter>,
    /// Public base URL, used for links in tool output and invitations.
    pub app_base_url: String,
}

impl ToolServices {
    pub fn event_url(&self, id: Uuid) -> String {
        format!("{}/events/{}", self.app_base_url.trim_end_matches('/'), id)
    }

    /// Gate a single-shot generative call on the cheap tier.
    pub(crate) async fn check_single_tier(&self, caller_id: &str) -> Result<(), ToolError> {
        self.limiter
            .check(caller_id, Tier::Single)
            .await
            .into_result()
            .map_err(ToolError::from)
    }
}

/// Register every built-in tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry, services: &ToolServices) {
    registry.register(Arc::new(SearchEventsTool::new(services.clone())));
    registry.register(Arc::new(GetMyScheduleTool::new(services.clone())));
    registry.register(Arc::new(CheckConflictsTool::new(services.clone())));
    registry.register(Arc::new(CreateEventTool::new(services.clone())));
    registry.register(Arc::new(InvitePeopleTool::new(services.clone())));
    registry.register(Arc::new(RsvpEventTool::new(services.clone())));
    registry.register(Arc::new(SuggestMeetingTimeTool::new(services.clone())));
    registry.register(Arc::new(BuildAgendaTool::new(services.clone())));
}

/// Compact event view returned to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: Uuid,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub is_virtual: bool,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub is_owner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RsvpStatus>,
}

impl EventSummary {
    pub fn new(event: &Event, viewer: &str) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            start: event.start,
            end: event.end,
            location: event.location.clone(),
            is_virtual: event.is_virtual,
            is_public: event.is_public,
            tags: event.tags.clone(),
            is_owner: event.is_owned_by(viewer),
            status: None,
        }
    }

    pub fn with_status(mut self, status: RsvpStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// The subject's committed events intersecting `range`, sorted by start.
pub(crate) async fn committed_events(
    store: &dyn RecordStore,
    subject_id: &str,
    range: TimeRange,
) -> Result<Vec<(Event, RsvpStatus)>, StoreError> {
    let responses = store
        .attendance_for_subjects(&[subject_id.to_string()], &RsvpStatus::COMMITTED, range)
        .await?;
    if responses.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = responses.iter().map(|r| r.event_id).collect();
    let batches = try_join_all(ids.chunks(MAX_IN_FILTER).map(|chunk| store.events_by_ids(chunk))).await?;

    let mut events: Vec<(Event, RsvpStatus)> = batches
        .into_iter()
        .flatten()
        .filter_map(|event| {
            responses
                .iter()
                .find(|r| r.event_id == event.id)
                .map(|r| (event, r.status))
        })
        .collect();
    events.sort_by(|(a, _), (b, _)| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
    Ok(events)
}

/// Normalize free-form tags: trimmed, lowercase, deduplicated, order kept.
pub(crate) fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
