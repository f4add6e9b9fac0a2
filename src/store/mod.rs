//! Record store abstraction.
//!
//! The store is an external collaborator: plain CRUD plus equality, range and
//! bounded "value in set" filters, ordered by a single field. There is no
//! full-text search; keyword matching happens in-process over a capped
//! candidate set.

mod memory;
mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use models::{
    Account, AttendanceResponse, Event, Invitation, InvitationStatus, RsvpStatus, normalize_email,
};

use crate::calendar::TimeRange;
use crate::error::StoreError;

/// Largest set accepted by "value in set" filters. Callers chunk above this.
pub const MAX_IN_FILTER: usize = 30;

/// Equality filter on event visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Only public events.
    Public,
    /// Only events owned by this subject.
    OwnedBy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Range query over events, ordered by start time.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub visibility: Visibility,
    /// Inclusive lower bound on `start`.
    pub starts_at_or_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start`.
    pub starts_before: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: usize,
}

impl EventQuery {
    pub fn new(visibility: Visibility, limit: usize) -> Self {
        Self {
            visibility,
            starts_at_or_after: None,
            starts_before: None,
            order: SortOrder::Ascending,
            limit,
        }
    }

    pub fn starting_from(mut self, from: DateTime<Utc>) -> Self {
        self.starts_at_or_after = Some(from);
        self
    }

    pub fn starting_before(mut self, before: DateTime<Utc>) -> Self {
        self.starts_before = Some(before);
        self
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// Record store interface used by tools.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Events ---

    /// Persist a new event. Fails with `Duplicate` if the owner already has an
    /// event with the same trimmed title and schedule.
    async fn create_event(&self, event: Event) -> Result<Event, StoreError>;

    /// The owner's event with this trimmed title and exact schedule, if any.
    async fn find_owned_event(
        &self,
        owner_id: &str,
        title: &str,
        schedule: TimeRange,
    ) -> Result<Option<Event>, StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Fetch events by id. At most [`MAX_IN_FILTER`] ids per call.
    async fn events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>, StoreError>;

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError>;

    /// Move an event and every attendance row that mirrors its schedule.
    async fn update_event_schedule(
        &self,
        id: Uuid,
        schedule: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Event, StoreError>;

    /// Delete an event and cascade its attendance rows.
    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError>;

    // --- Attendance ---

    async fn upsert_attendance(&self, response: AttendanceResponse) -> Result<(), StoreError>;

    /// Upsert a response while holding the event to `capacity` committed
    /// places. The count and the write are one atomic step. A subject whose
    /// previous response was already committed keeps their place. Fails with
    /// `CapacityExceeded` when no place is left.
    async fn reserve_attendance(
        &self,
        response: AttendanceResponse,
        capacity: u32,
    ) -> Result<(), StoreError>;

    async fn get_attendance(
        &self,
        event_id: Uuid,
        subject_id: &str,
    ) -> Result<Option<AttendanceResponse>, StoreError>;

    /// Responses for a set of subjects whose mirrored interval intersects
    /// `range` and whose status is in `statuses`. At most [`MAX_IN_FILTER`]
    /// subjects per call.
    async fn attendance_for_subjects(
        &self,
        subject_ids: &[String],
        statuses: &[RsvpStatus],
        range: TimeRange,
    ) -> Result<Vec<AttendanceResponse>, StoreError>;

    // --- Invitations ---

    async fn find_invitation(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Persist a new invitation. Fails with `Duplicate` if one already exists
    /// for the same (event, email) or the token has been used before.
    async fn create_invitation(&self, invitation: Invitation) -> Result<Invitation, StoreError>;

    // --- Accounts ---

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
}
