//! Deterministic ordering of concurrently live calls
//!
//! The policy is a pure function of the [`LiveCallSet`]. It decides which
//! call the UI foregrounds as primary, which one is shown as the secondary
//! (usually held) call, and which ringing call is surfaced as incoming.
//!
//! Comparator, applied to every ongoing (non-ringing) call:
//!
//! 1. state rank: Active, then Holding, then Dialing
//! 2. connected calls before never-connected ones, earlier connect time first
//! 3. insertion sequence in the live set (first added wins)
//!
//! The last key is unique per live call, so the ordering is total and
//! repeated invocations on an unchanged set always agree.
//!
//! ```rust
//! use dialer_core::call::{AccountId, CallHandle, CallRecord, CallState};
//! use dialer_core::live_set::LiveCallSet;
//! use dialer_core::ordering::CallOrderingPolicy;
//!
//! let mut set = LiveCallSet::new();
//! set.upsert(CallRecord::new(CallHandle(1), CallState::Active, "1", AccountId::new("x")).with_connect_time(1000));
//! set.upsert(CallRecord::new(CallHandle(2), CallState::Holding, "2", AccountId::new("x")).with_connect_time(500));
//!
//! let pair = CallOrderingPolicy::primary_pair(&CallOrderingPolicy::ongoing(&set));
//! assert_eq!(pair.primary.map(|c| c.handle), Some(CallHandle(1)));
//! assert_eq!(pair.secondary.map(|c| c.handle), Some(CallHandle(2)));
//! ```

use std::cmp::Ordering;

use serde::Serialize;

use crate::call::{CallRecord, CallState};
use crate::live_set::{LiveCallSet, LiveEntry};

/// The calls the UI foregrounds as the active conversation pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallPair {
    pub primary: Option<CallRecord>,
    pub secondary: Option<CallRecord>,
}

/// Result of picking the incoming call among ringing calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingSelection {
    /// The ringing call to surface, if any
    pub call: Option<CallRecord>,
    /// How many calls were ringing; more than one is an anomaly
    pub ringing_count: usize,
}

impl IncomingSelection {
    pub fn is_ambiguous(&self) -> bool {
        self.ringing_count > 1
    }
}

/// Pure ordering rules over a live call set
pub struct CallOrderingPolicy;

impl CallOrderingPolicy {
    /// Ongoing calls in presentation order
    ///
    /// Ringing calls are excluded, and so are conference legs whose
    /// aggregate is itself live (the aggregate stands in for them).
    pub fn ongoing(set: &LiveCallSet) -> Vec<CallRecord> {
        let mut entries: Vec<&LiveEntry> = set
            .entries()
            .filter(|entry| entry.record.state.is_ongoing())
            .filter(|entry| match entry.record.parent {
                Some(parent) => !set.contains(parent),
                None => true,
            })
            .collect();
        entries.sort_by(|a, b| Self::compare(a, b));
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }

    /// The ringing call to surface as incoming
    ///
    /// When more than one call rings, the most recently added one wins.
    pub fn incoming(set: &LiveCallSet) -> IncomingSelection {
        let ringing: Vec<&LiveEntry> = set
            .entries()
            .filter(|entry| entry.record.state == CallState::Ringing)
            .collect();
        let call = ringing
            .iter()
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.record.clone());
        IncomingSelection {
            call,
            ringing_count: ringing.len(),
        }
    }

    /// First and second elements of an ordered ongoing list
    pub fn primary_pair(ordered: &[CallRecord]) -> CallPair {
        CallPair {
            primary: ordered.first().cloned(),
            secondary: ordered.get(1).cloned(),
        }
    }

    fn compare(a: &LiveEntry, b: &LiveEntry) -> Ordering {
        state_rank(a.record.state)
            .cmp(&state_rank(b.record.state))
            .then_with(|| connect_key(&a.record).cmp(&connect_key(&b.record)))
            .then_with(|| a.seq.cmp(&b.seq))
    }
}

fn state_rank(state: CallState) -> u8 {
    match state {
        CallState::Active => 0,
        CallState::Holding => 1,
        CallState::Dialing => 2,
        // Not part of the ongoing list; ranked last for completeness
        CallState::Ringing => 3,
        CallState::Disconnected => 4,
    }
}

/// Connected calls first (by connect time), unconnected ones after
fn connect_key(record: &CallRecord) -> (bool, u64) {
    (!record.is_connected(), record.connect_time_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{AccountId, CallHandle};
    use proptest::prelude::*;

    fn call(handle: u64, state: CallState, connect: u64) -> CallRecord {
        CallRecord::new(CallHandle(handle), state, format!("555{handle}"), AccountId::new("x"))
            .with_connect_time(connect)
    }

    fn set_of(records: Vec<CallRecord>) -> LiveCallSet {
        let mut set = LiveCallSet::new();
        for record in records {
            set.upsert(record);
        }
        set
    }

    fn handles(records: &[CallRecord]) -> Vec<u64> {
        records.iter().map(|r| r.handle.0).collect()
    }

    #[test]
    fn test_state_rank_dominates_connect_time() {
        let set = set_of(vec![
            call(1, CallState::Dialing, 0),
            call(2, CallState::Holding, 100),
            call(3, CallState::Active, 900),
        ]);
        assert_eq!(handles(&CallOrderingPolicy::ongoing(&set)), vec![3, 2, 1]);
    }

    #[test]
    fn test_connected_before_unconnected_then_earliest() {
        let set = set_of(vec![
            call(1, CallState::Active, 0),
            call(2, CallState::Active, 700),
            call(3, CallState::Active, 300),
        ]);
        assert_eq!(handles(&CallOrderingPolicy::ongoing(&set)), vec![3, 2, 1]);
    }

    #[test]
    fn test_insertion_sequence_breaks_full_ties() {
        let set = set_of(vec![
            call(9, CallState::Holding, 500),
            call(4, CallState::Holding, 500),
        ]);
        assert_eq!(handles(&CallOrderingPolicy::ongoing(&set)), vec![9, 4]);
    }

    #[test]
    fn test_ringing_is_never_ongoing() {
        let set = set_of(vec![
            call(1, CallState::Active, 1000),
            call(2, CallState::Ringing, 0),
        ]);
        let ongoing = CallOrderingPolicy::ongoing(&set);
        assert_eq!(handles(&ongoing), vec![1]);
        let pair = CallOrderingPolicy::primary_pair(&ongoing);
        assert_eq!(pair.primary.map(|c| c.handle), Some(CallHandle(1)));
        assert_eq!(pair.secondary, None);

        let incoming = CallOrderingPolicy::incoming(&set);
        assert_eq!(incoming.call.as_ref().map(|c| c.handle), Some(CallHandle(2)));
        assert!(!incoming.is_ambiguous());
    }

    #[test]
    fn test_most_recent_ringing_call_wins() {
        let set = set_of(vec![
            call(5, CallState::Ringing, 0),
            call(2, CallState::Ringing, 0),
        ]);
        let incoming = CallOrderingPolicy::incoming(&set);
        assert_eq!(incoming.call.as_ref().map(|c| c.handle), Some(CallHandle(2)));
        assert_eq!(incoming.ringing_count, 2);
        assert!(incoming.is_ambiguous());
    }

    #[test]
    fn test_conference_legs_hidden_behind_live_aggregate() {
        let conference = call(10, CallState::Active, 100).conference();
        let leg_a = call(11, CallState::Active, 50).with_parent(Some(CallHandle(10)));
        let orphan = call(12, CallState::Holding, 80).with_parent(Some(CallHandle(99)));
        let set = set_of(vec![leg_a, conference, orphan]);
        assert_eq!(handles(&CallOrderingPolicy::ongoing(&set)), vec![10, 12]);
    }

    fn arb_state() -> impl Strategy<Value = CallState> {
        prop_oneof![
            Just(CallState::Dialing),
            Just(CallState::Ringing),
            Just(CallState::Active),
            Just(CallState::Holding),
        ]
    }

    fn arb_set() -> impl Strategy<Value = LiveCallSet> {
        prop::collection::vec((arb_state(), prop_oneof![Just(0u64), 1u64..5_000]), 0..8).prop_map(
            |calls| {
                set_of(
                    calls
                        .into_iter()
                        .enumerate()
                        .map(|(i, (state, connect))| call(i as u64 + 1, state, connect))
                        .collect(),
                )
            },
        )
    }

    proptest! {
        #[test]
        fn prop_ordering_is_idempotent(set in arb_set()) {
            let first = CallOrderingPolicy::ongoing(&set);
            let second = CallOrderingPolicy::ongoing(&set);
            prop_assert_eq!(
                CallOrderingPolicy::primary_pair(&first),
                CallOrderingPolicy::primary_pair(&second)
            );
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_active_call_beats_holding_call(set in arb_set()) {
            let has_active = set.records().any(|r| r.state == CallState::Active);
            let has_holding = set.records().any(|r| r.state == CallState::Holding);
            prop_assume!(has_active && has_holding);

            let pair = CallOrderingPolicy::primary_pair(&CallOrderingPolicy::ongoing(&set));
            prop_assert_eq!(pair.primary.map(|c| c.state), Some(CallState::Active));
        }

        #[test]
        fn prop_ringing_never_primary_or_secondary(set in arb_set()) {
            let pair = CallOrderingPolicy::primary_pair(&CallOrderingPolicy::ongoing(&set));
            for chosen in [pair.primary, pair.secondary].into_iter().flatten() {
                prop_assert_ne!(chosen.state, CallState::Ringing);
            }
        }
    }
}
