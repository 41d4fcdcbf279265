// ABOUTME: Merge engine combining incoming canonical records with the stored state
// ABOUTME: Recency-guarded null-coalescing for summaries and per-session events, plus event sort/cap
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # HealthSync Reconcile
//!
//! Pure functions deciding what the canonical record for one
//! (user, device, category) becomes after an incoming fragment arrives.
//!
//! Webhooks are delivered at least once and in any order, so every merge here
//! is idempotent (`merge(merge(s, x), x) == merge(s, x)`) and never moves a
//! record backwards in time:
//!
//! - **Summaries**: if both sides carry `last_updated` and the incoming one is
//!   strictly older, the stored record is returned unchanged. Otherwise each
//!   field takes the incoming value when present, else keeps the stored one.
//! - **Activity events**: union of both lists keyed by `start_time`. Two
//!   reports of the same session merge like summaries (recency guard, then
//!   field-level coalescing). Newest first, capped at
//!   [`MAX_ACTIVITY_EVENTS`](healthsync_core::constants::limits::MAX_ACTIVITY_EVENTS).

use healthsync_core::constants::limits::MAX_ACTIVITY_EVENTS;
use healthsync_core::models::{ActivityEvent, CanonicalRecord, SummaryRecord};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Merge an incoming summary into the stored one
#[must_use]
pub fn merge_summary<T: SummaryRecord>(existing: Option<&T>, incoming: T) -> T {
    let Some(existing) = existing else {
        return incoming;
    };

    if let (Some(stored_at), Some(incoming_at)) = (existing.last_updated(), incoming.last_updated())
    {
        if incoming_at < stored_at {
            debug!(
                stored_at = %stored_at,
                incoming_at = %incoming_at,
                "Ignoring stale summary"
            );
            return existing.clone();
        }
    }

    incoming.coalesce(existing)
}

/// Merge incoming activity events into the stored list
#[must_use]
pub fn merge_activity_events(
    existing: &[ActivityEvent],
    incoming: Vec<ActivityEvent>,
) -> Vec<ActivityEvent> {
    let mut by_start: BTreeMap<_, ActivityEvent> = existing
        .iter()
        .map(|event| (event.start_time, event.clone()))
        .collect();

    for event in incoming {
        match by_start.entry(event.start_time) {
            Entry::Vacant(slot) => {
                slot.insert(event);
            }
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                if let (Some(stored_at), Some(incoming_at)) =
                    (stored.last_updated, event.last_updated)
                {
                    if incoming_at < stored_at {
                        debug!(
                            start_time = %event.start_time,
                            stored_at = %stored_at,
                            incoming_at = %incoming_at,
                            "Ignoring stale activity event"
                        );
                        continue;
                    }
                }
                *stored = event.coalesce(stored);
            }
        }
    }

    by_start
        .into_values()
        .rev()
        .take(MAX_ACTIVITY_EVENTS)
        .collect()
}

/// Merge an incoming canonical record with the stored record of the same category
///
/// A stored record of a different category is never produced by the store
/// and is replaced by the incoming record.
#[must_use]
pub fn merge(existing: Option<CanonicalRecord>, incoming: CanonicalRecord) -> CanonicalRecord {
    match (existing, incoming) {
        (None, CanonicalRecord::ActivityEvents(events)) => {
            CanonicalRecord::ActivityEvents(merge_activity_events(&[], events))
        }
        (None, incoming) => incoming,
        (Some(CanonicalRecord::Sleep(stored)), CanonicalRecord::Sleep(fresh)) => {
            CanonicalRecord::Sleep(merge_summary(Some(&stored), fresh))
        }
        (Some(CanonicalRecord::Physical(stored)), CanonicalRecord::Physical(fresh)) => {
            CanonicalRecord::Physical(merge_summary(Some(&stored), fresh))
        }
        (Some(CanonicalRecord::Body(stored)), CanonicalRecord::Body(fresh)) => {
            CanonicalRecord::Body(merge_summary(Some(&stored), fresh))
        }
        (Some(CanonicalRecord::ActivityEvents(stored)), CanonicalRecord::ActivityEvents(fresh)) => {
            CanonicalRecord::ActivityEvents(merge_activity_events(&stored, fresh))
        }
        (Some(stored), incoming) => {
            warn!(
                stored = %stored.category(),
                incoming = %incoming.category(),
                "Category mismatch during merge, keeping incoming record"
            );
            merge(None, incoming)
        }
    }
}
