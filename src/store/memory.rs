//! In-process record store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::calendar::TimeRange;
use crate::error::StoreError;
use crate::store::{
    Account, AttendanceResponse, Event, EventQuery, Invitation, MAX_IN_FILTER, RecordStore,
    RsvpStatus, SortOrder, Visibility, normalize_email,
};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    attendance: HashMap<(Uuid, String), AttendanceResponse>,
    invitations: HashMap<(Uuid, String), Invitation>,
    /// Every token ever issued, so none is reused.
    issued_tokens: HashSet<String>,
    accounts: HashMap<String, Account>,
}

/// Record store kept entirely in memory. Used by the CLI and tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account so invitations can resolve it by email.
    pub async fn insert_account(&self, account: Account) {
        let key = normalize_email(&account.email);
        self.tables.write().await.accounts.insert(key, account);
    }

    /// All invitations for an event, oldest first.
    pub async fn invitations_for_event(&self, event_id: Uuid) -> Vec<Invitation> {
        let tables = self.tables.read().await;
        let mut found: Vec<Invitation> = tables
            .invitations
            .values()
            .filter(|inv| inv.event_id == event_id)
            .cloned()
            .collect();
        found.sort_by_key(|inv| inv.created_at);
        found
    }

    /// All attendance rows for an event.
    pub async fn attendance_for_event(&self, event_id: Uuid) -> Vec<AttendanceResponse> {
        self.tables
            .read()
            .await
            .attendance
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect()
    }
}

impl Tables {
    fn owned_event(&self, owner_id: &str, title: &str, schedule: TimeRange) -> Option<&Event> {
        let title = title.trim();
        self.events.values().find(|e| {
            e.owner_id == owner_id && e.title.trim() == title && e.range() == schedule
        })
    }

    fn require_event(&self, id: Uuid) -> Result<&Event, StoreError> {
        self.events.get(&id).ok_or(StoreError::NotFound {
            entity: "event",
            id: id.to_string(),
        })
    }
}

fn check_in_filter(len: usize, field: &str) -> Result<(), StoreError> {
    if len > MAX_IN_FILTER {
        return Err(StoreError::InvalidQuery(format!(
            "'{}' in-filter has {} values (max {})",
            field, len, MAX_IN_FILTER
        )));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_event(&self, event: Event) -> Result<Event, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::Duplicate {
                entity: "event",
                key: event.id.to_string(),
            });
        }
        if let Some(existing) = tables.owned_event(&event.owner_id, &event.title, event.range()) {
            return Err(StoreError::Duplicate {
                entity: "event",
                key: format!("{}/{}/{}", existing.owner_id, existing.title.trim(), existing.start),
            });
        }
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_owned_event(
        &self,
        owner_id: &str,
        title: &str,
        schedule: TimeRange,
    ) -> Result<Option<Event>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.owned_event(owner_id, title, schedule).cloned())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn events_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Event>, StoreError> {
        check_in_filter(ids.len(), "id")?;
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.events.get(id).cloned())
            .collect())
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.read().await;
        let mut matched: Vec<Event> = tables
            .events
            .values()
            .filter(|e| match &query.visibility {
                Visibility::Public => e.is_public,
                Visibility::OwnedBy(owner) => &e.owner_id == owner,
            })
            .filter(|e| query.starts_at_or_after.is_none_or(|from| e.start >= from))
            .filter(|e| query.starts_before.is_none_or(|before| e.start < before))
            .cloned()
            .collect();

        matched.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        if query.order == SortOrder::Descending {
            matched.reverse();
        }
        matched.truncate(query.limit);
        Ok(matched)
    }

    async fn update_event_schedule(
        &self,
        id: Uuid,
        schedule: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Event, StoreError> {
        let mut tables = self.tables.write().await;
        let event = tables.events.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "event",
            id: id.to_string(),
        })?;
        event.start = schedule.start;
        event.end = schedule.end;
        event.updated_at = now;
        let updated = event.clone();

        for response in tables.attendance.values_mut().filter(|r| r.event_id == id) {
            response.event_start = schedule.start;
            response.event_end = schedule.end;
            response.updated_at = now;
        }

        Ok(updated)
    }

    async fn delete_event(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.events.remove(&id).is_none() {
            return Err(StoreError::NotFound {
                entity: "event",
                id: id.to_string(),
            });
        }
        tables.attendance.retain(|(event_id, _), _| *event_id != id);
        Ok(())
    }

    async fn upsert_attendance(&self, response: AttendanceResponse) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_event(response.event_id)?;
        let key = (response.event_id, response.subject_id.clone());
        tables.attendance.insert(key, response);
        Ok(())
    }

    async fn reserve_attendance(
        &self,
        response: AttendanceResponse,
        capacity: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.require_event(response.event_id)?;
        let key = (response.event_id, response.subject_id.clone());

        let holds_place = tables
            .attendance
            .get(&key)
            .is_some_and(|r| r.status.is_committed());
        if response.status.is_committed() && !holds_place {
            let taken = tables
                .attendance
                .values()
                .filter(|r| r.event_id == response.event_id && r.status.is_committed())
                .count();
            if taken >= capacity as usize {
                return Err(StoreError::CapacityExceeded {
                    event_id: response.event_id,
                    taken,
                    capacity,
                });
            }
        }

        tables.attendance.insert(key, response);
        Ok(())
    }

    async fn get_attendance(
        &self,
        event_id: Uuid,
        subject_id: &str,
    ) -> Result<Option<AttendanceResponse>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .attendance
            .get(&(event_id, subject_id.to_string()))
            .cloned())
    }

    async fn attendance_for_subjects(
        &self,
        subject_ids: &[String],
        statuses: &[RsvpStatus],
        range: TimeRange,
    ) -> Result<Vec<AttendanceResponse>, StoreError> {
        check_in_filter(subject_ids.len(), "subject_id")?;
        let tables = self.tables.read().await;
        let mut matched: Vec<AttendanceResponse> = tables
            .attendance
            .values()
            .filter(|r| subject_ids.contains(&r.subject_id))
            .filter(|r| statuses.contains(&r.status))
            .filter(|r| r.range().overlaps(&range))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.event_start);
        Ok(matched)
    }

    async fn find_invitation(
        &self,
        event_id: Uuid,
        invitee_email: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        let key = (event_id, normalize_email(invitee_email));
        Ok(self.tables.read().await.invitations.get(&key).cloned())
    }

    async fn create_invitation(&self, invitation: Invitation) -> Result<Invitation, StoreError> {
        let mut tables = self.tables.write().await;
        let key = (invitation.event_id, normalize_email(&invitation.invitee_email));
        if tables.invitations.contains_key(&key) {
            return Err(StoreError::Duplicate {
                entity: "invitation",
                key: format!("{}/{}", key.0, key.1),
            });
        }
        if !tables.issued_tokens.insert(invitation.token.clone()) {
            return Err(StoreError::Duplicate {
                entity: "invitation token",
                key: "<redacted>".to_string(),
            });
        }
        tables.invitations.insert(key, invitation.clone());
        Ok(invitation)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let key = normalize_email(email);
        Ok(self.tables.read().await.accounts.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::store::InvitationStatus;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn event(owner: &str, offset_hours: i64, is_public: bool) -> Event {
        let start = base() + TimeDelta::hours(offset_hours);
        Event {
            id: Uuid::new_v4(),
            title: format!("event +{offset_hours}h"),
            description: None,
            start,
            end: start + TimeDelta::hours(1),
            location: None,
            is_virtual: false,
            virtual_link: None,
            capacity: None,
            is_public,
            owner_id: owner.to_string(),
            tags: vec![],
            created_at: base(),
            updated_at: base(),
        }
    }

    fn invitation(event_id: Uuid, email: &str, token: &str) -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            event_id,
            inviter_id: "owner".to_string(),
            invitee_email: email.to_string(),
            invitee_id: None,
            status: InvitationStatus::Pending,
            token: token.to_string(),
            message: None,
            created_at: base(),
            updated_at: base(),
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_start_and_limits() {
        let store = InMemoryStore::new();
        for offset in [5, 1, 3, 2] {
            store.create_event(event("u1", offset, true)).await.unwrap();
        }
        store.create_event(event("u1", 4, false)).await.unwrap();

        let query = EventQuery::new(Visibility::Public, 3);
        let found = store.query_events(&query).await.unwrap();
        let starts: Vec<_> = found.iter().map(|e| e.start).collect();
        assert_eq!(
            starts,
            vec![
                base() + TimeDelta::hours(1),
                base() + TimeDelta::hours(2),
                base() + TimeDelta::hours(3)
            ]
        );

        let owned = store
            .query_events(&EventQuery::new(Visibility::OwnedBy("u1".into()), 10))
            .await
            .unwrap();
        assert_eq!(owned.len(), 5);
    }

    #[tokio::test]
    async fn test_reschedule_propagates_to_attendance() {
        let store = InMemoryStore::new();
        let ev = store.create_event(event("u1", 0, true)).await.unwrap();
        store
            .upsert_attendance(AttendanceResponse::for_event(&ev, "u2", RsvpStatus::Attending, base()))
            .await
            .unwrap();

        let moved = TimeRange::new(base() + TimeDelta::days(1), base() + TimeDelta::days(1) + TimeDelta::hours(2)).unwrap();
        store.update_event_schedule(ev.id, moved, base()).await.unwrap();

        let row = store.get_attendance(ev.id, "u2").await.unwrap().unwrap();
        assert_eq!(row.range(), moved);
    }

    #[tokio::test]
    async fn test_delete_cascades_attendance() {
        let store = InMemoryStore::new();
        let ev = store.create_event(event("u1", 0, true)).await.unwrap();
        store
            .upsert_attendance(AttendanceResponse::for_event(&ev, "u1", RsvpStatus::Upcoming, base()))
            .await
            .unwrap();
        store.delete_event(ev.id).await.unwrap();
        assert!(store.attendance_for_event(ev.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_invitation_unique_per_event_and_email() {
        let store = InMemoryStore::new();
        let ev = store.create_event(event("owner", 0, true)).await.unwrap();
        store
            .create_invitation(invitation(ev.id, "Guest@Example.com", "t1"))
            .await
            .unwrap();

        let dup = store
            .create_invitation(invitation(ev.id, "guest@example.com ", "t2"))
            .await;
        assert!(matches!(dup, Err(StoreError::Duplicate { .. })));
        assert!(
            store
                .find_invitation(ev.id, "GUEST@example.com")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_tokens_never_reused() {
        let store = InMemoryStore::new();
        let ev = store.create_event(event("owner", 0, true)).await.unwrap();
        store
            .create_invitation(invitation(ev.id, "a@example.com", "same"))
            .await
            .unwrap();
        let reused = store
            .create_invitation(invitation(ev.id, "b@example.com", "same"))
            .await;
        assert!(matches!(reused, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_same_owner_title_and_schedule_is_duplicate() {
        let store = InMemoryStore::new();
        let first = store.create_event(event("u1", 0, true)).await.unwrap();

        let mut retry = event("u1", 0, true);
        retry.title = format!("  {}  ", first.title);
        let dup = store.create_event(retry).await;
        assert!(matches!(dup, Err(StoreError::Duplicate { .. })));

        // Another owner may use the same title and slot.
        store.create_event(event("u2", 0, true)).await.unwrap();

        let found = store
            .find_owned_event("u1", &format!("{} ", first.title), first.range())
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some(first.id));
        assert!(
            store
                .find_owned_event("u1", &first.title, event("u1", 1, true).range())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_reserve_attendance_holds_capacity() {
        let store = InMemoryStore::new();
        let ev = store.create_event(event("owner", 0, true)).await.unwrap();
        async fn reserve(
            store: &InMemoryStore,
            ev: &Event,
            subject: &str,
            status: RsvpStatus,
        ) -> Result<(), StoreError> {
            let response = AttendanceResponse::for_event(ev, subject, status, base());
            store.reserve_attendance(response, 1).await
        }

        reserve(&store, &ev, "u1", RsvpStatus::Attending).await.unwrap();
        let full = reserve(&store, &ev, "u2", RsvpStatus::Attending).await;
        assert!(matches!(
            full,
            Err(StoreError::CapacityExceeded { taken: 1, capacity: 1, .. })
        ));

        // Maybe takes no place; switching between committed statuses keeps one.
        reserve(&store, &ev, "u2", RsvpStatus::Maybe).await.unwrap();
        reserve(&store, &ev, "u1", RsvpStatus::Upcoming).await.unwrap();

        reserve(&store, &ev, "u1", RsvpStatus::Declined).await.unwrap();
        reserve(&store, &ev, "u2", RsvpStatus::Attending).await.unwrap();
        assert_eq!(
            store.get_attendance(ev.id, "u2").await.unwrap().map(|r| r.status),
            Some(RsvpStatus::Attending)
        );
    }

    #[tokio::test]
    async fn test_in_filter_is_bounded() {
        let store = InMemoryStore::new();
        let ids: Vec<Uuid> = (0..MAX_IN_FILTER + 1).map(|_| Uuid::new_v4()).collect();
        let result = store.events_by_ids(&ids).await;
        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    }
}
