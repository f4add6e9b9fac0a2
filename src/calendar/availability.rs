//! Busy-slot aggregation across many subjects.

use std::collections::BTreeMap;

use futures::future::try_join_all;

use crate::calendar::TimeRange;
use crate::error::StoreError;
use crate::store::{MAX_IN_FILTER, RecordStore, RsvpStatus};

/// Committed intervals per subject. Every requested subject has an entry;
/// an empty list means "known free", not "unknown".
pub type BusySlots = BTreeMap<String, Vec<TimeRange>>;

/// Look up each subject's committed intervals intersecting `range`.
///
/// Subjects are queried in chunks of [`MAX_IN_FILTER`]; the chunks run
/// concurrently and are joined before returning.
pub async fn aggregate_busy_slots(
    store: &dyn RecordStore,
    subjects: &[String],
    range: TimeRange,
) -> Result<BusySlots, StoreError> {
    let mut busy: BusySlots = subjects
        .iter()
        .map(|s| (s.clone(), Vec::new()))
        .collect();

    let unique: Vec<String> = busy.keys().cloned().collect();
    let lookups = unique
        .chunks(MAX_IN_FILTER)
        .map(|chunk| store.attendance_for_subjects(chunk, &RsvpStatus::COMMITTED, range));
    let results = try_join_all(lookups).await?;

    for response in results.into_iter().flatten() {
        if let Some(slots) = busy.get_mut(&response.subject_id) {
            slots.push(response.range());
        }
    }
    for slots in busy.values_mut() {
        slots.sort();
        slots.dedup();
    }

    tracing::debug!(
        subjects = busy.len(),
        busy_subjects = busy.values().filter(|s| !s.is_empty()).count(),
        "Aggregated busy slots"
    );
    Ok(busy)
}

/// Split subjects into (free, conflicted) for a candidate slot.
pub fn partition_by_conflict(busy: &BusySlots, candidate: &TimeRange) -> (Vec<String>, Vec<String>) {
    let mut free = Vec::new();
    let mut conflicted = Vec::new();
    for (subject, slots) in busy {
        if slots.iter().any(|slot| slot.overlaps(candidate)) {
            conflicted.push(subject.clone());
        } else {
            free.push(subject.clone());
        }
    }
    (free, conflicted)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::store::{AttendanceResponse, Event, InMemoryStore};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    async fn seed_event(store: &InMemoryStore, offset_hours: i64, subject: &str, status: RsvpStatus) {
        let start = base() + TimeDelta::hours(offset_hours);
        let event = Event {
            id: Uuid::new_v4(),
            title: "busy".to_string(),
            description: None,
            start,
            end: start + TimeDelta::hours(1),
            location: None,
            is_virtual: false,
            virtual_link: None,
            capacity: None,
            is_public: false,
            owner_id: subject.to_string(),
            tags: vec![],
            created_at: base(),
            updated_at: base(),
        };
        let event = store.create_event(event).await.unwrap();
        store
            .upsert_attendance(AttendanceResponse::for_event(&event, subject, status, base()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_every_subject_has_an_entry() {
        let store = InMemoryStore::new();
        seed_event(&store, 1, "alice", RsvpStatus::Attending).await;
        seed_event(&store, 2, "bob", RsvpStatus::Declined).await;

        let range = TimeRange::new(base(), base() + TimeDelta::days(1)).unwrap();
        let subjects = vec!["alice".to_string(), "bob".to_string(), "carol".to_string()];
        let busy = aggregate_busy_slots(&store, &subjects, range).await.unwrap();

        assert_eq!(busy.len(), 3);
        assert_eq!(busy["alice"].len(), 1);
        assert!(busy["bob"].is_empty());
        assert!(busy["carol"].is_empty());
    }

    #[tokio::test]
    async fn test_chunks_large_subject_sets() {
        let store = InMemoryStore::new();
        let subjects: Vec<String> = (0..(MAX_IN_FILTER * 2 + 5)).map(|i| format!("s{i}")).collect();
        seed_event(&store, 3, "s64", RsvpStatus::Upcoming).await;

        let range = TimeRange::new(base(), base() + TimeDelta::days(1)).unwrap();
        let busy = aggregate_busy_slots(&store, &subjects, range).await.unwrap();
        assert_eq!(busy.len(), subjects.len());
        assert_eq!(busy["s64"].len(), 1);
    }

    #[tokio::test]
    async fn test_outside_range_is_ignored() {
        let store = InMemoryStore::new();
        seed_event(&store, 30, "alice", RsvpStatus::Attending).await;
        let range = TimeRange::new(base(), base() + TimeDelta::days(1)).unwrap();
        let busy = aggregate_busy_slots(&store, &["alice".to_string()], range)
            .await
            .unwrap();
        assert!(busy["alice"].is_empty());
    }

    #[test]
    fn test_partition_by_conflict() {
        let slot = TimeRange::new(base(), base() + TimeDelta::hours(1)).unwrap();
        let mut busy = BusySlots::new();
        busy.insert("alice".into(), vec![slot]);
        busy.insert("bob".into(), vec![]);

        let touching = TimeRange::new(base() + TimeDelta::hours(1), base() + TimeDelta::hours(2)).unwrap();
        let (free, conflicted) = partition_by_conflict(&busy, &touching);
        assert_eq!(free, vec!["alice".to_string(), "bob".to_string()]);
        assert!(conflicted.is_empty());

        let (free, conflicted) = partition_by_conflict(&busy, &slot);
        assert_eq!(free, vec!["bob".to_string()]);
        assert_eq!(conflicted, vec!["alice".to_string()]);
    }
}
