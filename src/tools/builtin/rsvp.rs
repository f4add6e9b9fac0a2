//! RSVP to an event.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{AttendanceResponse, RsvpStatus};
use crate::tools::builtin::ToolServices;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RsvpParams {
    event_id: Uuid,
    status: String,
}

pub struct RsvpEventTool {
    services: ToolServices,
}

impl RsvpEventTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Tool for RsvpEventTool {
    fn name(&self) -> &str {
        "rsvp_event"
    }

    fn description(&self) -> &str {
        "Set the user's response to an event: attending, maybe or declined."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "eventId": {"type": "string", "format": "uuid"},
                "status": {"type": "string", "enum": ["attending", "maybe", "declined"]}
            },
            "required": ["eventId", "status"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let params: RsvpParams = parse_params(params)?;
        let status: RsvpStatus = params
            .status
            .parse()
            .map_err(|e: String| ToolError::invalid("status", e))?;
        let store = &self.services.store;

        let event = store
            .get_event(params.event_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("event {}", params.event_id)))?;

        let subject = ctx.subject_id();
        let previous = store.get_attendance(event.id, subject).await?;

        if !event.is_public && !event.is_owned_by(subject) && previous.is_none() {
            let invited = store
                .find_invitation(event.id, &ctx.identity.email)
                .await?
                .is_some();
            if !invited {
                return Err(ToolError::Forbidden(
                    "this event is private and you have not been invited".to_string(),
                ));
            }
        }

        let response = AttendanceResponse::for_event(&event, subject, status, ctx.now);
        let written = match event.capacity {
            Some(capacity) => store.reserve_attendance(response, capacity).await,
            None => store.upsert_attendance(response).await,
        };
        written.map_err(|e| match e {
            StoreError::CapacityExceeded { taken, capacity, .. } => ToolError::Conflict(format!(
                "'{}' is full ({} of {} places taken)",
                event.title, taken, capacity
            )),
            other => other.into(),
        })?;

        let result = serde_json::json!({
            "eventId": event.id,
            "title": event.title,
            "status": status,
            "previousStatus": previous.map(|p| p.status),
        });
        Ok(ToolOutput::success(result, started.elapsed()).with_affected(event.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::store::{Invitation, InvitationStatus, RecordStore};
    use crate::tools::builtin::test_support::{FaultyStore, ctx, event, fixture, now, seed};

    #[tokio::test]
    async fn test_rsvp_and_change_status() {
        let f = fixture(&[]);
        let e = f
            .store
            .create_event(event("u2", "Meetup", now() + TimeDelta::days(1), 60))
            .await
            .unwrap();
        let tool = RsvpEventTool::new(f.services.clone());

        let out = tool
            .execute(json!({"eventId": e.id, "status": "attending"}), &ctx("u1"))
            .await
            .unwrap();
        assert_eq!(out.result["previousStatus"], json!(null));

        let out = tool
            .execute(json!({"eventId": e.id, "status": "maybe"}), &ctx("u1"))
            .await
            .unwrap();
        assert_eq!(out.result["previousStatus"], json!("attending"));
        assert_eq!(
            f.store.get_attendance(e.id, "u1").await.unwrap().unwrap().status,
            RsvpStatus::Maybe
        );
    }

    #[tokio::test]
    async fn test_full_event_is_conflict() {
        let f = fixture(&[]);
        let mut full = event("u2", "Tiny workshop", now() + TimeDelta::days(1), 60);
        full.capacity = Some(1);
        let full = seed(&f.store, full, "u2", RsvpStatus::Upcoming).await;
        let tool = RsvpEventTool::new(f.services.clone());

        let err = tool
            .execute(json!({"eventId": full.id, "status": "attending"}), &ctx("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Conflict(_)));

        // Declining never needs a seat.
        tool.execute(json!({"eventId": full.id, "status": "declined"}), &ctx("u1"))
            .await
            .unwrap();
        // The owner re-confirming does not count against themselves.
        tool.execute(json!({"eventId": full.id, "status": "attending"}), &ctx("u2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_rsvps_never_overbook() {
        let f = fixture(&[]);
        let mut tiny = event("u9", "One seat", now() + TimeDelta::days(1), 60);
        tiny.capacity = Some(1);
        let tiny = f.store.create_event(tiny).await.unwrap();

        let mut services = f.services.clone();
        services.store =
            Arc::new(FaultyStore::new(f.store.clone()).with_delay(Duration::from_millis(5)));
        let tool = RsvpEventTool::new(services);

        let subjects = ["u1", "u2", "u3", "u4", "u5"];
        let contexts: Vec<ToolContext> = subjects.iter().map(|s| ctx(s)).collect();
        let results = join_all(contexts.iter().map(|c| {
            tool.execute(json!({"eventId": tiny.id, "status": "attending"}), c)
        }))
        .await;

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, ToolError::Conflict(_)))
        );
        let committed = f
            .store
            .attendance_for_event(tiny.id)
            .await
            .into_iter()
            .filter(|r| r.status.is_committed())
            .count();
        assert_eq!(committed, 1);
    }

    #[tokio::test]
    async fn test_private_event_requires_invitation() {
        let f = fixture(&[]);
        let mut private = event("u2", "Board dinner", now() + TimeDelta::days(1), 90);
        private.is_public = false;
        let private = f.store.create_event(private).await.unwrap();
        let tool = RsvpEventTool::new(f.services.clone());
        let params = json!({"eventId": private.id, "status": "attending"});

        let err = tool.execute(params.clone(), &ctx("u1")).await.unwrap_err();
        assert!(matches!(err, ToolError::Forbidden(_)));

        f.store
            .create_invitation(Invitation {
                id: Uuid::new_v4(),
                event_id: private.id,
                inviter_id: "u2".to_string(),
                invitee_email: "u1@example.com".to_string(),
                invitee_id: Some("u1".to_string()),
                status: InvitationStatus::Pending,
                token: "tok".to_string(),
                message: None,
                created_at: now(),
                updated_at: now(),
            })
            .await
            .unwrap();
        tool.execute(params, &ctx("u1")).await.unwrap();
    }
}
