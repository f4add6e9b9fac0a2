//! Time-range overlap and availability.
//!
//! Pure interval logic lives in `overlap`; `availability` batches busy-slot
//! lookups against the record store.

mod availability;
mod overlap;

pub use availability::{BusySlots, aggregate_busy_slots, partition_by_conflict};
pub use overlap::{TimeRange, overlaps};
