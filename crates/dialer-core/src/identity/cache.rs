//! Bounded identity cache keyed by subject

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::trace;

use super::{CallerIdentity, Subject};

#[derive(Debug, Clone)]
struct CacheEntry {
    identity: CallerIdentity,
    inserted: u64,
}

/// Resolved identities, oldest entry evicted once `capacity` is reached
#[derive(Debug)]
pub struct IdentityCache {
    entries: DashMap<Subject, CacheEntry>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl IdentityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn get(&self, subject: &Subject) -> Option<CallerIdentity> {
        self.entries.get(subject).map(|entry| entry.identity.clone())
    }

    pub fn insert(&self, subject: Subject, identity: CallerIdentity) {
        if !self.entries.contains_key(&subject) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let inserted = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(subject, CacheEntry { identity, inserted });
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().inserted)
            .map(|entry| entry.key().clone());
        if let Some(subject) = oldest {
            trace!("Evicting cached identity for {}", subject.address);
            self.entries.remove(&subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::AccountId;

    fn subject(address: &str) -> Subject {
        Subject::new(address, AccountId::new("sim1"))
    }

    fn identity(name: &str) -> CallerIdentity {
        CallerIdentity {
            display_name: name.to_string(),
            initials: name[..1].to_string(),
            avatar_ref: None,
        }
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let cache = IdentityCache::new(2);
        cache.insert(subject("1"), identity("Ann"));
        cache.insert(subject("2"), identity("Bob"));
        cache.insert(subject("3"), identity("Cy"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&subject("1")).is_none());
        assert_eq!(cache.get(&subject("3")).unwrap().display_name, "Cy");
    }

    #[test]
    fn test_replacing_does_not_evict() {
        let cache = IdentityCache::new(2);
        cache.insert(subject("1"), identity("Ann"));
        cache.insert(subject("2"), identity("Bob"));
        cache.insert(subject("2"), identity("Bo"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&subject("1")).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }
}
