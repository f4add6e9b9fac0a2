//! Conflict detection against the caller's commitments.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::calendar::{TimeRange, overlaps};
use crate::tools::builtin::{EventSummary, ToolServices, committed_events};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictParams {
    start_date_time: DateTime<Utc>,
    end_date_time: DateTime<Utc>,
}

pub struct CheckConflictsTool {
    services: ToolServices,
}

impl CheckConflictsTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for CheckConflictsTool {
    fn name(&self) -> &str {
        "check_conflicts"
    }

    fn description(&self) -> &str {
        "Check whether a proposed time range overlaps any event the user is attending or \
         registered for. Touching ranges (one ends exactly when the other starts) do not conflict."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "startDateTime": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Proposed start (RFC 3339)"
                },
                "endDateTime": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Proposed end (RFC 3339), after the start"
                }
            },
            "required": ["startDateTime", "endDateTime"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let params: ConflictParams = parse_params(params)?;
        let proposed = TimeRange::new(params.start_date_time, params.end_date_time)
            .ok_or_else(|| ToolError::invalid("endDateTime", "must be after startDateTime"))?;

        let committed =
            committed_events(self.services.store.as_ref(), ctx.subject_id(), proposed).await?;
        let conflicts: Vec<EventSummary> = committed
            .iter()
            .filter(|(event, _)| overlaps(event.start, event.end, proposed.start, proposed.end))
            .map(|(event, status)| EventSummary::new(event, ctx.subject_id()).with_status(*status))
            .collect();

        let result = serde_json::json!({
            "hasConflict": !conflicts.is_empty(),
            "conflicts": conflicts,
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::store::RsvpStatus;
    use crate::tools::builtin::test_support::{ctx, event, fixture, now, seed};

    fn window(from_minutes: i64, to_minutes: i64) -> serde_json::Value {
        json!({
            "startDateTime": (now() + TimeDelta::minutes(from_minutes)).to_rfc3339(),
            "endDateTime": (now() + TimeDelta::minutes(to_minutes)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn test_detects_overlap_but_not_touching() {
        let f = fixture(&[]);
        // Busy 10:00-11:00 (now is 09:00).
        let busy = seed(&f.store, event("u2", "Standup", now() + TimeDelta::hours(1), 60), "u1", RsvpStatus::Attending).await;
        let tool = CheckConflictsTool::new(f.services.clone());

        let out = tool.execute(window(119, 180), &ctx("u1")).await.unwrap();
        assert_eq!(out.result["hasConflict"], json!(true));
        assert_eq!(out.result["conflicts"][0]["id"], json!(busy.id));

        let out = tool.execute(window(120, 180), &ctx("u1")).await.unwrap();
        assert_eq!(out.result, json!({"hasConflict": false, "conflicts": []}));
    }

    #[tokio::test]
    async fn test_ignores_uncommitted_and_other_subjects() {
        let f = fixture(&[]);
        seed(&f.store, event("u2", "Maybe", now() + TimeDelta::hours(1), 60), "u1", RsvpStatus::Maybe).await;
        seed(&f.store, event("u2", "Theirs", now() + TimeDelta::hours(1), 60), "u2", RsvpStatus::Attending).await;
        let tool = CheckConflictsTool::new(f.services.clone());
        let out = tool.execute(window(60, 120), &ctx("u1")).await.unwrap();
        assert_eq!(out.result["hasConflict"], json!(false));
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let f = fixture(&[]);
        let tool = CheckConflictsTool::new(f.services.clone());
        let err = tool.execute(window(60, 60), &ctx("u1")).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(ref fields) if fields[0].field == "endDateTime"));
    }
}
