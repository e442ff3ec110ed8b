//! Authoritative mapping from call handle to the current call record
//!
//! Iteration follows insertion order. Replacing the record for a handle keeps
//! its original position and insertion sequence, which the ordering policy
//! uses as its final tie-break.

use indexmap::IndexMap;

use crate::call::{CallHandle, CallRecord};

/// A record together with the sequence number it was first inserted with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEntry {
    pub record: CallRecord,
    pub seq: u64,
}

/// The set of calls the telephony stack currently reports as live
#[derive(Debug, Default, Clone)]
pub struct LiveCallSet {
    entries: IndexMap<CallHandle, LiveEntry>,
    next_seq: u64,
}

impl LiveCallSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the previous snapshot if any
    pub fn upsert(&mut self, record: CallRecord) -> Option<CallRecord> {
        if let Some(entry) = self.entries.get_mut(&record.handle) {
            return Some(std::mem::replace(&mut entry.record, record));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(record.handle, LiveEntry { record, seq });
        None
    }

    /// Remove a call, preserving the relative order of the others
    pub fn remove(&mut self, handle: CallHandle) -> Option<CallRecord> {
        self.entries.shift_remove(&handle).map(|entry| entry.record)
    }

    pub fn get(&self, handle: CallHandle) -> Option<&CallRecord> {
        self.entries.get(&handle).map(|entry| &entry.record)
    }

    pub fn contains(&self, handle: CallHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in insertion order
    pub fn records(&self) -> impl Iterator<Item = &CallRecord> + '_ {
        self.entries.values().map(|entry| &entry.record)
    }

    /// Entries (record plus insertion sequence) in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &LiveEntry> + '_ {
        self.entries.values()
    }

    /// Handles whose `parent` points at `conference`
    pub fn children_of(&self, conference: CallHandle) -> Vec<CallHandle> {
        self.records()
            .filter(|record| record.parent == Some(conference))
            .map(|record| record.handle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{AccountId, CallState};

    fn record(handle: u64, state: CallState) -> CallRecord {
        CallRecord::new(CallHandle(handle), state, "555", AccountId::new("a"))
    }

    #[test]
    fn test_replace_keeps_position_and_seq() {
        let mut set = LiveCallSet::new();
        set.upsert(record(1, CallState::Dialing));
        set.upsert(record(2, CallState::Ringing));

        let previous = set.upsert(record(1, CallState::Active));
        assert_eq!(previous.map(|r| r.state), Some(CallState::Dialing));

        let order: Vec<_> = set.entries().map(|e| (e.record.handle.0, e.seq)).collect();
        assert_eq!(order, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_remove_preserves_order_of_remaining() {
        let mut set = LiveCallSet::new();
        for handle in 1..=3 {
            set.upsert(record(handle, CallState::Active));
        }
        assert!(set.remove(CallHandle(2)).is_some());
        assert!(set.remove(CallHandle(2)).is_none());

        let handles: Vec<_> = set.records().map(|r| r.handle.0).collect();
        assert_eq!(handles, vec![1, 3]);

        // Re-adding a removed handle gets a fresh sequence number
        set.upsert(record(2, CallState::Active));
        let last = set.entries().last().unwrap();
        assert_eq!((last.record.handle.0, last.seq), (2, 3));
    }
}
