//! Event creation.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::calendar::TimeRange;
use crate::error::{FieldError, StoreError};
use crate::store::{AttendanceResponse, Event, RsvpStatus};
use crate::tools::builtin::{ToolServices, normalize_tags};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventParams {
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    is_virtual: bool,
    virtual_link: Option<String>,
    capacity: Option<u32>,
    #[serde(default)]
    is_public: bool,
    #[serde(default)]
    tags: Vec<String>,
}

impl CreateEventParams {
    fn check(&self, now: DateTime<Utc>) -> Result<TimeRange, ToolError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(FieldError::new("title", "must not be empty"));
        }
        let range = TimeRange::new(self.start, self.end);
        if range.is_none() {
            errors.push(FieldError::new("end", "must be after start"));
        }
        if self.start < now {
            errors.push(FieldError::new("start", "must be in the future"));
        }
        if let Some(link) = self.virtual_link.as_deref()
            && !(link.starts_with("https://") || link.starts_with("http://"))
        {
            errors.push(FieldError::new("virtualLink", "must be an http(s) URL"));
        }
        if self.is_virtual && self.virtual_link.is_none() && self.location.is_none() {
            errors.push(FieldError::new(
                "virtualLink",
                "is required for virtual events without a location",
            ));
        }
        match range {
            Some(range) if errors.is_empty() => Ok(range),
            _ => Err(ToolError::Validation(errors)),
        }
    }
}

/// Create an event owned by the caller.
pub struct CreateEventTool {
    services: ToolServices,
}

impl CreateEventTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "create_event"
    }

    fn description(&self) -> &str {
        "Create a new event owned by the user. The user is automatically registered for it. \
         Only call this after the user has explicitly confirmed the details."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "minLength": 1, "maxLength": MAX_TITLE_CHARS},
                "start": {"type": "string", "format": "date-time", "description": "Start (RFC 3339)"},
                "end": {"type": "string", "format": "date-time", "description": "End (RFC 3339)"},
                "description": {"type": "string", "maxLength": 5000},
                "location": {"type": "string", "maxLength": 300},
                "isVirtual": {"type": "boolean"},
                "virtualLink": {"type": "string", "maxLength": 500},
                "capacity": {"type": "integer", "minimum": 1, "maximum": 100000},
                "isPublic": {"type": "boolean", "description": "Default false"},
                "tags": {"type": "array", "maxItems": 10, "items": {"type": "string", "maxLength": 40}}
            },
            "required": ["title", "start", "end"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let params: CreateEventParams = parse_params(params)?;
        let range = params.check(ctx.now)?;
        let store = &self.services.store;
        let owner = ctx.subject_id();
        let title = params.title.trim().to_string();

        // A retried call must not create a second copy.
        if let Some(existing) = store.find_owned_event(owner, &title, range).await? {
            return self.existing(existing, ctx, started).await;
        }

        let event = Event {
            id: Uuid::new_v4(),
            title,
            description: params.description,
            start: range.start,
            end: range.end,
            location: params.location,
            is_virtual: params.is_virtual,
            virtual_link: params.virtual_link,
            capacity: params.capacity,
            is_public: params.is_public,
            owner_id: owner.to_string(),
            tags: normalize_tags(&params.tags),
            created_at: ctx.now,
            updated_at: ctx.now,
        };

        let event = match store.create_event(event).await {
            Ok(event) => event,
            Err(StoreError::Duplicate { entity, key }) => {
                // Lost a race with an identical request.
                let existing = store.find_owned_event(owner, &params.title, range).await?;
                return match existing {
                    Some(existing) => self.existing(existing, ctx, started).await,
                    None => Err(StoreError::Duplicate { entity, key }.into()),
                };
            }
            Err(e) => return Err(e.into()),
        };
        store
            .upsert_attendance(AttendanceResponse::for_event(
                &event,
                owner,
                RsvpStatus::Upcoming,
                ctx.now,
            ))
            .await?;

        tracing::info!(
            event_id = %event.id,
            owner = %event.owner_id,
            "Created event"
        );

        Ok(ToolOutput::success(self.summary(&event, false), started.elapsed())
            .with_affected(event.id))
    }

    fn requires_confirmation(&self) -> bool {
        true
    }
}

impl CreateEventTool {
    /// Report an event the caller already created, making sure they still
    /// have a response row for it.
    async fn existing(
        &self,
        event: Event,
        ctx: &ToolContext,
        started: Instant,
    ) -> Result<ToolOutput, ToolError> {
        let store = &self.services.store;
        if store.get_attendance(event.id, ctx.subject_id()).await?.is_none() {
            store
                .upsert_attendance(AttendanceResponse::for_event(
                    &event,
                    ctx.subject_id(),
                    RsvpStatus::Upcoming,
                    ctx.now,
                ))
                .await?;
        }
        tracing::debug!(event_id = %event.id, "Event already exists, returning it");
        Ok(ToolOutput::success(self.summary(&event, true), started.elapsed())
            .with_affected(event.id))
    }

    fn summary(&self, event: &Event, existing: bool) -> serde_json::Value {
        serde_json::json!({
            "eventId": event.id,
            "title": event.title,
            "start": event.start,
            "end": event.end,
            "isPublic": event.is_public,
            "url": self.services.event_url(event.id),
            "existing": existing,
        })
    }
}
