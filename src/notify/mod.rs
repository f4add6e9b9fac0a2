//! Out-of-band notification delivery.
//!
//! Delivery failures are reported to the caller but never roll back the
//! record that triggered them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::NotifyError;

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts notifications as JSON to a relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    from: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            from: &self.from,
            to: &notification.to,
            subject: &notification.subject,
            html: &notification.html,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        tracing::debug!(to = %notification.to, "Notification delivered");
        Ok(())
    }
}

/// Logs notifications instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Render the invitation email for one invitee.
pub fn invitation_notification(
    to: &str,
    inviter_name: &str,
    event_title: &str,
    accept_url: &str,
    message: Option<&str>,
) -> Notification {
    let note = message
        .map(|m| format!("<blockquote>{}</blockquote>", escape_html(m)))
        .unwrap_or_default();
    Notification {
        to: to.to_string(),
        subject: format!("{} invited you to {}", inviter_name, event_title),
        html: format!(
            "<p>{} invited you to <strong>{}</strong>.</p>{}<p><a href=\"{}\">View and respond</a></p>",
            escape_html(inviter_name),
            escape_html(event_title),
            note,
            escape_html(accept_url),
        ),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
