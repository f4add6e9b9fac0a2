//! The caller's own schedule.

use std::time::Instant;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::Deserialize;

use crate::calendar::TimeRange;
use crate::tools::builtin::{EventSummary, ToolServices, committed_events};
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

const DEFAULT_DAYS_AHEAD: i64 = 30;
const MAX_DAYS_AHEAD: i64 = 90;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleParams {
    days_ahead: Option<i64>,
}

/// Committed (attending/upcoming) events in the next N days.
pub struct GetMyScheduleTool {
    services: ToolServices,
}

impl GetMyScheduleTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for GetMyScheduleTool {
    fn name(&self) -> &str {
        "get_my_schedule"
    }

    fn description(&self) -> &str {
        "List the events the user is attending or registered for within the next N days, \
         sorted by start time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "daysAhead": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_DAYS_AHEAD,
                    "description": "Window size in days (default 30)"
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
        let params: ScheduleParams = parse_params(params)?;
        let days = params.days_ahead.unwrap_or(DEFAULT_DAYS_AHEAD);
        if !(1..=MAX_DAYS_AHEAD).contains(&days) {
            return Err(ToolError::invalid(
                "daysAhead",
                format!("must be between 1 and {}", MAX_DAYS_AHEAD),
            ));
        }

        let window = TimeRange {
            start: ctx.now,
            end: ctx.now + TimeDelta::days(days),
        };
        let events = committed_events(self.services.store.as_ref(), ctx.subject_id(), window).await?;

        let summaries: Vec<EventSummary> = events
            .iter()
            .map(|(event, status)| EventSummary::new(event, ctx.subject_id()).with_status(*status))
            .collect();

        let result = serde_json::json!({
            "daysAhead": days,
            "from": window.start,
            "to": window.end,
            "count": summaries.len(),
            "events": summaries,
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}
