//! Invitations.
//!
//! Idempotent on (event, invitee email): re-inviting the same address is a
//! reported no-op, so a retried turn never duplicates records. Notification
//! failures leave the invitation in place and are reported per email. A store
//! failure for one address is reported as `failed` and the batch carries on.

use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::notify::invitation_notification;
use crate::store::{Event, Invitation, InvitationStatus, normalize_email};
use crate::tools::builtin::ToolServices;
use crate::tools::tool::{Tool, ToolContext, ToolError, ToolOutput, parse_params};

const MAX_EMAILS: usize = 50;
const TOKEN_BYTES: usize = 32;
const TOKEN_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteParams {
    event_id: Uuid,
    emails: Vec<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum InviteStatus {
    Invited,
    Skipped,
    NotificationFailed,
    Failed,
}

#[derive(Debug, Serialize)]
struct InviteResult {
    email: String,
    status: InviteStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Invite people by email to an event the caller owns.
pub struct InvitePeopleTool {
    services: ToolServices,
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl InvitePeopleTool {
    pub fn new(services: ToolServices) -> Self {
        Self { services }
    }

    /// Persist a new invitation, re-minting the token if it collides.
    ///
    /// Returns `None` when an invitation for (event, email) already exists.
    async fn create_invitation(
        &self,
        event: &Event,
        email: &str,
        message: Option<&str>,
        ctx: &ToolContext,
    ) -> Result<Option<Invitation>, ToolError> {
        let invitee_id = self
            .services
            .store
            .find_account_by_email(email)
            .await?
            .map(|account| account.id);

        for _ in 0..TOKEN_ATTEMPTS {
            let invitation = Invitation {
                id: Uuid::new_v4(),
                event_id: event.id,
                inviter_id: ctx.subject_id().to_string(),
                invitee_email: email.to_string(),
                invitee_id: invitee_id.clone(),
                status: InvitationStatus::Pending,
                token: mint_token(),
                message: message.map(str::to_string),
                created_at: ctx.now,
                updated_at: ctx.now,
            };
            match self.services.store.create_invitation(invitation).await {
                Ok(created) => return Ok(Some(created)),
                Err(StoreError::Duplicate { entity, .. }) if entity == "invitation" => {
                    return Ok(None);
                }
                Err(StoreError::Duplicate { .. }) => {
                    tracing::warn!(event_id = %event.id, "Invitation token collision, re-minting");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ToolError::ExecutionFailed(
            "could not mint a unique invitation token".to_string(),
        ))
    }

    async fn invite_one(
        &self,
        event: &Event,
        email: &str,
        message: Option<&str>,
        ctx: &ToolContext,
    ) -> Result<InviteResult, ToolError> {
        let skipped = |detail: &str| InviteResult {
            email: email.to_string(),
            status: InviteStatus::Skipped,
            detail: Some(detail.to_string()),
        };

        if self
            .services
            .store
            .find_invitation(event.id, email)
            .await?
            .is_some()
        {
            return Ok(skipped("already invited"));
        }
        let Some(invitation) = self.create_invitation(event, email, message, ctx).await? else {
            return Ok(skipped("already invited"));
        };

        let accept_url = format!(
            "{}/invitations/{}",
            self.services.app_base_url.trim_end_matches('/'),
            invitation.token
        );
        let notification = invitation_notification(
            email,
            &ctx.identity.display_name,
            &event.title,
            &accept_url,
            message,
        );

        match self.services.notifier.send(&notification).await {
            Ok(()) => Ok(InviteResult {
                email: email.to_string(),
                status: InviteStatus::Invited,
                detail: None,
            }),
            Err(e) => {
                tracing::warn!(
                    event_id = %event.id,
                    invitation_id = %invitation.id,
                    error = %e,
                    "Invitation created but notification failed"
                );
                Ok(InviteResult {
                    email: email.to_string(),
                    status: InviteStatus::NotificationFailed,
                    detail: Some(e.to_string()),
                })
            }
        }
    }
}

#[async_trait]
impl Tool for InvitePeopleTool {
    fn name(&self) -> &str {
        "invite_people"
    }

    fn description(&self) -> &str {
        "Invite people by email to an event the user owns. Addresses that were already \
         invited are skipped. Only call this after the user has explicitly confirmed the list."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "eventId": {"type": "string", "format": "uuid"},
                "emails": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": MAX_EMAILS,
                    "items": {"type": "string", "format": "email"}
                },
                "message": {"type": "string", "maxLength": 1000}
            },
            "required": ["eventId", "emails"],
            "additionalProperties": false
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let params: InviteParams = parse_params(params)?;
        if params.emails.is_empty() || params.emails.len() > MAX_EMAILS {
            return Err(ToolError::invalid(
                "emails",
                format!("must contain between 1 and {} addresses", MAX_EMAILS),
            ));
        }

        let event = self
            .services
            .store
            .get_event(params.event_id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("event {}", params.event_id)))?;
        if !event.is_owned_by(ctx.subject_id()) {
            return Err(ToolError::Forbidden(
                "only the event owner can invite people".to_string(),
            ));
        }

        let message = params
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());

        let mut seen: Vec<String> = Vec::with_capacity(params.emails.len());
        let mut results = Vec::with_capacity(params.emails.len());
        for raw in &params.emails {
            let email = normalize_email(raw);
            if seen.contains(&email) {
                results.push(InviteResult {
                    email,
                    status: InviteStatus::Skipped,
                    detail: Some("listed more than once".to_string()),
                });
                continue;
            }
            seen.push(email.clone());
            match self.invite_one(&event, &email, message, ctx).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "Could not invite one address");
                    results.push(InviteResult {
                        email,
                        status: InviteStatus::Failed,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        let count = |status: InviteStatus| results.iter().filter(|r| r.status == status).count();
        let (invited, skipped, notification_failed, failed) = (
            count(InviteStatus::Invited),
            count(InviteStatus::Skipped),
            count(InviteStatus::NotificationFailed),
            count(InviteStatus::Failed),
        );
        tracing::info!(
            event_id = %event.id,
            invited,
            skipped,
            notification_failed,
            failed,
            "Processed invitations"
        );

        let result = serde_json::json!({
            "eventId": event.id,
            "invited": invited,
            "skipped": skipped,
            "notificationFailed": notification_failed,
            "failed": failed,
            "results": results,
        });
        Ok(ToolOutput::success(result, started.elapsed()).with_affected(event.id))
    }

    fn requires_confirmation(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use std::sync::Arc;

    use super::*;
    use crate::store::{Account, RecordStore};
    use crate::tools::builtin::test_support::{FaultyStore, ctx, event, fixture, now};

    #[tokio::test]
    async fn test_second_invite_is_skipped() {
        let f = fixture(&[]);
        let e = f
            .store
            .create_event(event("u1", "Launch", now() + TimeDelta::days(3), 60))
            .await
            .unwrap();
        let tool = InvitePeopleTool::new(f.services.clone());
        let params = json!({"eventId": e.id, "emails": ["Bo@Example.com"]});

        let first = tool.execute(params.clone(), &ctx("u1")).await.unwrap();
        assert_eq!(first.result["invited"], json!(1));
        let second = tool.execute(params, &ctx("u1")).await.unwrap();
        assert_eq!(second.result["invited"], json!(0));
        assert_eq!(second.result["skipped"], json!(1));
        assert_eq!(second.result["results"][0]["status"], json!("skipped"));

        let invitations = f.store.invitations_for_event(e.id).await;
        assert_eq!(invitations.len(), 1);
        assert_eq!(invitations[0].invitee_email, "bo@example.com");
        assert_eq!(f.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_batch_reports_counts() {
        let f = fixture(&[]);
        f.store
            .insert_account(Account {
                id: "u7".to_string(),
                email: "cy@example.com".to_string(),
                display_name: "Cy".to_string(),
            })
            .await;
        f.notifier
            .fail_for
            .lock()
            .unwrap()
            .push("dee@example.com".to_string());
        let e = f
            .store
            .create_event(event("u1", "Offsite", now() + TimeDelta::days(3), 60))
            .await
            .unwrap();
        let tool = InvitePeopleTool::new(f.services.clone());

        let out = tool
            .execute(
                json!({
                    "eventId": e.id,
                    "emails": ["cy@example.com", "dee@example.com", "CY@example.com"],
                    "message": "See you there"
                }),
                &ctx("u1"),
            )
            .await
            .unwrap();

        assert_eq!(out.result["invited"], json!(1));
        assert_eq!(out.result["notificationFailed"], json!(1));
        assert_eq!(out.result["skipped"], json!(1));

        let invitations = f.store.invitations_for_event(e.id).await;
        assert_eq!(invitations.len(), 2);
        let cy = invitations
            .iter()
            .find(|i| i.invitee_email == "cy@example.com")
            .unwrap();
        assert_eq!(cy.invitee_id.as_deref(), Some("u7"));
        assert_ne!(invitations[0].token, invitations[1].token);
    }

    #[tokio::test]
    async fn test_store_failure_for_one_address_keeps_the_batch() {
        let f = fixture(&[]);
        let e = f
            .store
            .create_event(event("u1", "Hackday", now() + TimeDelta::days(3), 60))
            .await
            .unwrap();
        let mut services = f.services.clone();
        services.store = Arc::new(FaultyStore::new(f.store.clone()).unavailable_for("bad@example.com"));
        let tool = InvitePeopleTool::new(services);

        let out = tool
            .execute(
                json!({"eventId": e.id, "emails": ["ann@example.com", "bad@example.com", "zed@example.com"]}),
                &ctx("u1"),
            )
            .await
            .unwrap();

        assert_eq!(out.result["invited"], json!(2));
        assert_eq!(out.result["failed"], json!(1));
        assert_eq!(out.result["results"][1]["status"], json!("failed"));
        assert_eq!(out.result["results"][2]["status"], json!("invited"));

        let emails: Vec<String> = f
            .store
            .invitations_for_event(e.id)
            .await
            .into_iter()
            .map(|i| i.invitee_email)
            .collect();
        assert!(emails.contains(&"zed@example.com".to_string()));
        assert!(!emails.contains(&"bad@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_only_owner_may_invite() {
        let f = fixture(&[]);
        let e = f
            .store
            .create_event(event("u1", "Launch", now() + TimeDelta::days(3), 60))
            .await
            .unwrap();
        let tool = InvitePeopleTool::new(f.services.clone());
        let err = tool
            .execute(json!({"eventId": e.id, "emails": ["x@example.com"]}), &ctx("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Forbidden(_)));
        assert!(f.store.invitations_for_event(e.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let f = fixture(&[]);
        let tool = InvitePeopleTool::new(f.services.clone());
        let err = tool
            .execute(json!({"eventId": Uuid::new_v4(), "emails": ["x@example.com"]}), &ctx("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn test_tokens_are_url_safe_and_distinct() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
