//! Agenda drafting.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::llm::StructuredClient;
use crate::tools::builtin::ToolServices;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

const MIN_DURATION: u32 = 15;
const MAX_DURATION: u32 = 480;
const MAX_SPEAKERS: u32 = 20;
/// Agendas longer than this must include at least one break.
const BREAK_THRESHOLD: u32 = 90;

const INSTRUCTION: &str = "You draft event agendas. Split the event into consecutive \
time blocks measured in minutes from the start. The first block starts at 0, each block \
starts exactly where the previous one ends, and the last block ends exactly at \
durationMinutes. Events longer than 90 minutes must include at least one block of kind \
\"break\". Return {\"items\": [{\"title\": \"...\", \"startOffset\": 0, \"endOffset\": 15, \
\"kind\": \"session|talk|discussion|break|other\", \"speaker\": \"optional\", \
\"description\": \"optional\"}]}.";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaRequest {
    pub title: String,
    pub duration_minutes: u32,
    pub event_type: String,
    #[serde(default)]
    pub speaker_count: u32,
}

impl AgendaRequest {
    pub fn check(&self) -> Result<(), ToolError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(FieldError::new("title", "must not be empty"));
        }
        if !(MIN_DURATION..=MAX_DURATION).contains(&self.duration_minutes) {
            errors.push(FieldError::new(
                "durationMinutes",
                format!("must be between {} and {}", MIN_DURATION, MAX_DURATION),
            ));
        }
        if self.speaker_count > MAX_SPEAKERS {
            errors.push(FieldError::new(
                "speakerCount",
                format!("must be at most {}", MAX_SPEAKERS),
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToolError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub title: String,
    pub start_offset: u32,
    pub end_offset: u32,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_kind() -> String {
    "session".to_string()
}

impl AgendaItem {
    pub fn is_break(&self) -> bool {
        self.kind.eq_ignore_ascii_case("break")
    }
}

/// A contiguous agenda covering `[0, duration_minutes)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agenda {
    pub title: String,
    pub duration_minutes: u32,
    pub items: Vec<AgendaItem>,
}

#[derive(Debug, Deserialize)]
struct GeneratedAgenda {
    items: Vec<AgendaItem>,
}

/// Check that `items` tile `[0, duration)` exactly. Sorts by start offset.
pub(crate) fn check_tiling(items: &mut [AgendaItem], duration: u32) -> Result<(), String> {
    if items.is_empty() {
        return Err("agenda has no items".to_string());
    }
    items.sort_by_key(|item| item.start_offset);

    let mut cursor = 0u32;
    for item in items.iter() {
        if item.end_offset <= item.start_offset {
            return Err(format!("'{}' has no duration", item.title));
        }
        if item.start_offset > cursor {
            return Err(format!("gap before '{}' at minute {}", item.title, cursor));
        }
        if item.start_offset < cursor {
            return Err(format!("'{}' overlaps the previous item", item.title));
        }
        cursor = item.end_offset;
    }
    if cursor != duration {
        return Err(format!("agenda ends at minute {} instead of {}", cursor, duration));
    }
    if duration > BREAK_THRESHOLD && !items.iter().any(AgendaItem::is_break) {
        return Err(format!(
            "agendas longer than {} minutes need a break",
            BREAK_THRESHOLD
        ));
    }
    Ok(())
}

/// Draft an agenda for `request`.
///
/// Generated output that does not tile the duration exactly is rejected as
/// malformed rather than patched. Does not touch the rate limiter.
pub async fn generate_agenda(
    structured: &StructuredClient,
    request: &AgendaRequest,
) -> Result<Agenda, ToolError> {
    request.check()?;

    let payload = serde_json::to_string(request).map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
    let params = structured.light_params(0.5, 1200);
    let generated: GeneratedAgenda = structured.complete_json(INSTRUCTION, &payload, &params).await?;

    let mut items = generated.items;
    for item in &mut items {
        item.title = item.title.trim().to_string();
    }
    check_tiling(&mut items, request.duration_minutes).map_err(|reason| {
        tracing::warn!(reason = %reason, "Rejected generated agenda");
        ToolError::MalformedResponse(reason)
    })?;

    Ok(Agenda {
        title: request.title.trim().to_string(),
        duration_minutes: request.duration_minutes,
        items,
    })
}

pub struct BuildAgendaTool {
    services: ToolServices,
}

impl BuildAgendaTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for BuildAgendaTool {
    fn name(&self) -> &str {
        "build_agenda"
    }

    fn description(&self) -> &str {
        "Draft a time-blocked agenda for an event: contiguous items covering the whole \
         duration, with breaks for events longer than 90 minutes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "minLength": 1, "maxLength": 200},
                "durationMinutes": {"type": "integer", "minimum": MIN_DURATION, "maximum": MAX_DURATION},
                "eventType": {
                    "type": "string",
                    "maxLength": 60,
                    "description": "e.g. workshop, meetup, conference, team meeting"
                },
                "speakerCount": {"type": "integer", "minimum": 0, "maximum": MAX_SPEAKERS}
            },
            "required": ["title", "durationMinutes", "eventType"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let request: AgendaRequest = parse_params(params)?;
        request.check()?;
        self.services.check_single_tier(ctx.subject_id()).await?;

        let agenda = generate_agenda(&self.services.structured, &request).await?;
        let result =
            serde_json::to_value(&agenda).map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(ToolOutput::success(result, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tools::builtin::test_support::fixture;

    fn item(title: &str, start: u32, end: u32, kind: &str) -> AgendaItem {
        AgendaItem {
            title: title.to_string(),
            start_offset: start,
            end_offset: end,
            kind: kind.to_string(),
            speaker: None,
            description: None,
        }
    }

    fn request(duration: u32) -> AgendaRequest {
        AgendaRequest {
            title: "Rust meetup".to_string(),
            duration_minutes: duration,
            event_type: "meetup".to_string(),
            speaker_count: 2,
        }
    }

    #[test]
    fn test_tiling_accepts_unsorted_contiguous_items() {
        let mut items = vec![
            item("Talk", 10, 50, "talk"),
            item("Welcome", 0, 10, "session"),
            item("Q&A", 50, 60, "discussion"),
        ];
        check_tiling(&mut items, 60).unwrap();
        let starts: Vec<u32> = items.iter().map(|i| i.start_offset).collect();
        assert_eq!(starts, vec![0, 10, 50]);
    }

    #[test]
    fn test_tiling_rejects_gaps_overlaps_and_short_end() {
        let mut gap = vec![item("A", 0, 10, "session"), item("B", 15, 60, "session")];
        assert!(check_tiling(&mut gap, 60).unwrap_err().contains("gap"));

        let mut overlap = vec![item("A", 0, 30, "session"), item("B", 20, 60, "session")];
        assert!(check_tiling(&mut overlap, 60).unwrap_err().contains("overlaps"));

        let mut short = vec![item("A", 0, 45, "session")];
        assert!(check_tiling(&mut short, 60).unwrap_err().contains("ends at minute 45"));
    }

    #[test]
    fn test_long_agenda_needs_break() {
        let mut items = vec![item("Morning", 0, 60, "session"), item("More", 60, 120, "session")];
        assert!(check_tiling(&mut items, 120).unwrap_err().contains("break"));

        let mut items = vec![
            item("Morning", 0, 55, "session"),
            item("Coffee", 55, 65, "Break"),
            item("More", 65, 120, "session"),
        ];
        check_tiling(&mut items, 120).unwrap();
    }

    #[tokio::test]
    async fn test_generate_agenda_from_fenced_truncated_output() {
        // Truncated after the last complete item: repair closes the array and object.
        let reply = "```json\n{\"items\": [{\"title\": \"Intro\", \"startOffset\": 0, \"endOffset\": 15}, \
                     {\"title\": \"Workshop\", \"startOffset\": 15, \"endOffset\": 45, \"kind\": \"session\"}";
        let f = fixture(&[reply]);
        let agenda = generate_agenda(&f.services.structured, &request(45)).await.unwrap();
        assert_eq!(agenda.items.len(), 2);
        assert_eq!(agenda.items[0].kind, "session");
        assert_eq!(agenda.items.last().unwrap().end_offset, 45);
    }

    #[tokio::test]
    async fn test_generate_agenda_rejects_bad_tiling() {
        let reply = r#"{"items": [{"title": "Only", "startOffset": 0, "endOffset": 30}]}"#;
        let f = fixture(&[reply]);
        let err = generate_agenda(&f.services.structured, &request(60)).await.unwrap_err();
        assert!(matches!(err, ToolError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_skips_generation() {
        let f = fixture(&[]);
        let err = generate_agenda(&f.services.structured, &request(5)).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        assert_eq!(*f.llm.calls.lock().unwrap(), 0);
    }
}
