//! Records the assistant reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::TimeRange;

/// A scheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub is_virtual: bool,
    pub virtual_link: Option<String>,
    pub capacity: Option<u32>,
    pub is_public: bool,
    pub owner_id: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    pub fn is_owned_by(&self, subject_id: &str) -> bool {
        self.owner_id == subject_id
    }
}

/// RSVP state of a subject for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    Upcoming,
    Attending,
    Maybe,
    Declined,
}

impl RsvpStatus {
    /// Statuses that make the subject busy for the event's interval.
    pub const COMMITTED: [RsvpStatus; 2] = [RsvpStatus::Attending, RsvpStatus::Upcoming];

    pub fn is_committed(&self) -> bool {
        Self::COMMITTED.contains(self)
    }
}

impl std::str::FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(RsvpStatus::Upcoming),
            "attending" | "going" | "yes" => Ok(RsvpStatus::Attending),
            "maybe" => Ok(RsvpStatus::Maybe),
            "declined" | "not_going" | "no" => Ok(RsvpStatus::Declined),
            _ => Err(format!(
                "invalid status '{}', expected 'attending', 'maybe', or 'declined'",
                s
            )),
        }
    }
}

/// One subject's response to one event.
///
/// `event_start`/`event_end` duplicate the event's schedule so busy-slot
/// lookups never need a join. The store keeps them in sync on reschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub event_id: Uuid,
    pub subject_id: String,
    pub status: RsvpStatus,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceResponse {
    pub fn for_event(event: &Event, subject_id: impl Into<String>, status: RsvpStatus, now: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id,
            subject_id: subject_id.into(),
            status,
            event_start: event.start,
            event_end: event.end,
            updated_at: now,
        }
    }

    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.event_start,
            end: self.event_end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

/// An invitation to an event, unique per (event, invitee email).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub inviter_id: String,
    pub invitee_email: String,
    pub invitee_id: Option<String>,
    pub status: InvitationStatus,
    pub token: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered account, resolvable by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

/// Normalize an email for keying and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
