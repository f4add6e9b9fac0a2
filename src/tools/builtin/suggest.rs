//! Meeting time suggestions.
//!
//! Busy slots are aggregated from the record store, the model ranks
//! candidate start times, and the free/conflicted breakdown for each
//! candidate is recomputed locally so it always matches the calendar.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{BusySlots, TimeRange, aggregate_busy_slots, partition_by_conflict};
use crate::error::FieldError;
use crate::tools::builtin::ToolServices;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

const MAX_ATTENDEES: usize = 20;
const MIN_DURATION: u32 = 15;
const MAX_DURATION: u32 = 480;
const MAX_RANGE_DAYS: i64 = 31;
const SUGGESTION_COUNT: usize = 3;

const INSTRUCTION: &str = "You schedule meetings. You receive a date range, a meeting \
duration in minutes and, per attendee, the intervals they are busy (UTC, half-open). \
Propose the three best start times inside the range, preferring slots where every attendee \
is free and that fall within normal working hours. Return \
{\"suggestions\": [{\"start\": \"<RFC 3339>\", \"confidence\": <0..1>, \"reason\": \"<short>\"}]} \
ordered from best to worst.";

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Input for a suggestion run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub attendee_ids: Vec<String>,
    pub date_range: DateRange,
    pub duration_minutes: u32,
}

impl SuggestRequest {
    pub fn check(&self) -> Result<TimeRange, ToolError> {
        let mut errors = Vec::new();
        if self.attendee_ids.is_empty() || self.attendee_ids.len() > MAX_ATTENDEES {
            errors.push(FieldError::new(
                "attendeeIds",
                format!("must contain between 1 and {} attendees", MAX_ATTENDEES),
            ));
        }
        if !(MIN_DURATION..=MAX_DURATION).contains(&self.duration_minutes) {
            errors.push(FieldError::new(
                "durationMinutes",
                format!("must be between {} and {}", MIN_DURATION, MAX_DURATION),
            ));
        }
        let range = TimeRange::new(self.date_range.start, self.date_range.end);
        match range {
            None => errors.push(FieldError::new("dateRange.end", "must be after dateRange.start")),
            Some(range) => {
                if range.duration() > TimeDelta::days(MAX_RANGE_DAYS) {
                    errors.push(FieldError::new(
                        "dateRange",
                        format!("must span at most {} days", MAX_RANGE_DAYS),
                    ));
                }
                if range.duration() < self.duration() {
                    errors.push(FieldError::new(
                        "dateRange",
                        "is shorter than the meeting duration",
                    ));
                }
            }
        }
        match range {
            Some(range) if errors.is_empty() => Ok(range),
            _ => Err(ToolError::Validation(errors)),
        }
    }

    fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.duration_minutes))
    }
}

/// One ranked candidate slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSuggestion {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub confidence: f32,
    pub reason: String,
    pub free_attendees: Vec<String>,
    pub conflicted_attendees: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSuggestions {
    pub duration_minutes: u32,
    pub attendees: Vec<String>,
    pub suggestions: Vec<SlotSuggestion>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSuggestions {
    suggestions: Vec<GeneratedSlot>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSlot {
    start: DateTime<Utc>,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestPayload<'a> {
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    duration_minutes: u32,
    busy: &'a BusySlots,
}

/// Rank candidate slots for `request`. The organizer is always treated as
/// an attendee.
///
/// Does not touch the rate limiter; callers gate it.
pub async fn suggest_slots(
    services: &ToolServices,
    request: &SuggestRequest,
    organizer_id: &str,
) -> Result<MeetingSuggestions, ToolError> {
    let range = request.check()?;
    let duration = request.duration();

    let mut attendees: Vec<String> = Vec::with_capacity(request.attendee_ids.len() + 1);
    for id in std::iter::once(organizer_id).chain(request.attendee_ids.iter().map(String::as_str)) {
        let id = id.trim();
        if !id.is_empty() && !attendees.iter().any(|a| a == id) {
            attendees.push(id.to_string());
        }
    }

    let busy = aggregate_busy_slots(services.store.as_ref(), &attendees, range).await?;

    let payload = serde_json::to_string(&SuggestPayload {
        range_start: range.start,
        range_end: range.end,
        duration_minutes: request.duration_minutes,
        busy: &busy,
    })
    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

    let params = services.structured.light_params(0.3, 800);
    let generated: GeneratedSuggestions = services
        .structured
        .complete_json(INSTRUCTION, &payload, &params)
        .await?;

    let mut suggestions: Vec<SlotSuggestion> = Vec::with_capacity(SUGGESTION_COUNT);
    for slot in generated.suggestions {
        let Some(candidate) = TimeRange::new(slot.start, slot.start + duration) else {
            continue;
        };
        if !range.contains(&candidate) || suggestions.iter().any(|s| s.start == candidate.start) {
            tracing::debug!(start = %slot.start, "Discarding out-of-range or repeated suggestion");
            continue;
        }
        let (free, conflicted) = partition_by_conflict(&busy, &candidate);
        suggestions.push(SlotSuggestion {
            start: candidate.start,
            end: candidate.end,
            confidence: if slot.confidence.is_finite() {
                slot.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            reason: slot.reason.trim().to_string(),
            free_attendees: free,
            conflicted_attendees: conflicted,
        });
        if suggestions.len() == SUGGESTION_COUNT {
            break;
        }
    }

    if suggestions.is_empty() {
        return Err(ToolError::MalformedResponse(
            "no suggested slot fell inside the requested range".to_string(),
        ));
    }

    Ok(MeetingSuggestions {
        duration_minutes: request.duration_minutes,
        attendees,
        suggestions,
    })
}

pub struct SuggestMeetingTimeTool {
    services: ToolServices,
}

impl SuggestMeetingTimeTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for SuggestMeetingTimeTool {
    fn name(&self) -> &str {
        "suggest_meeting_time"
    }

    fn description(&self) -> &str {
        "Propose the three best meeting times for a group within a date range, with a \
         confidence score and which attendees are free or busy for each slot."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "attendeeIds": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": MAX_ATTENDEES,
                    "items": {"type": "string", "minLength": 1}
                },
                "dateRange": {
                    "type": "object",
                    "properties": {
                        "start": {"type": "string", "format": "date-time"},
                        "end": {"type": "string", "format": "date-time"}
                    },
                    "required": ["start", "end"]
                },
                "durationMinutes": {"type": "integer", "minimum": MIN_DURATION, "maximum": MAX_DURATION}
            },
            "required": ["attendeeIds", "dateRange", "durationMinutes"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let request: SuggestRequest = parse_params(params)?;
        request.check()?;
        self.services.check_single_tier(ctx.subject_id()).await?;

        let suggestions = suggest_slots(&self.services, &request, ctx.subject_id()).await?;
        let result = serde_json::to_value(&suggestions)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolOutput::success(result, started.elapsed()))
    }
}
