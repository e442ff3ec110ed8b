//! Caller identity resolution
//!
//! [`CallerIdentityResolver`] turns the `(address, account)` of a displayed
//! call into a [`CallerIdentity`]. Each consumer (the incoming-call banner,
//! the primary and secondary call cards) holds its own subscription, and
//! every subscription follows one subject at a time.
//!
//! # Resolution
//!
//! 1. The in-memory cache and the directory's local store are consulted
//!    synchronously. A hit is published immediately.
//! 2. Otherwise a fallback identity built from the raw address is published
//!    right away and an asynchronous directory lookup is started on the
//!    tokio runtime, bounded by `identity.lookup_timeout_ms`.
//!
//! When a subscription moves to a different subject, its in-flight lookup is
//! cancelled first, so a subscription never has more than one lookup
//! running. Lookup results are not applied by the worker task. They are sent
//! back over a channel as a [`LookupCompletion`] and applied on the control
//! loop by [`apply_completion`](CallerIdentityResolver::apply_completion),
//! which drops any completion whose subject is no longer current.
//!
//! ```text
//!  resolve(sub, S3) ──► cancel lookup(S2) ──► spawn lookup(S3)
//!                                                   │
//!  control loop ◄── LookupCompletion(S3, gen) ◄─────┘
//!       │
//!       └─► generation/subject still current? ──► publish identity
//!                                       no ──► drop (stale)
//! ```
//!
//! Lookup failures, timeouts and unknown numbers never surface as errors:
//! the subscriber keeps the address-derived fallback identity.

pub mod cache;
pub mod directory;
pub mod format;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::call::AccountId;
use crate::config::IdentityConfig;
use crate::coordinator::ViewPublisher;

use cache::IdentityCache;
use directory::{ContactDirectory, ContactInfo};

/// The `(address, account)` pair an identity is resolved for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub address: String,
    pub account_id: AccountId,
}

impl Subject {
    pub fn new(address: impl Into<String>, account_id: AccountId) -> Self {
        Self {
            address: address.into(),
            account_id,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.account_id)
    }
}

/// Resolved display data for a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub display_name: String,
    pub initials: String,
    pub avatar_ref: Option<String>,
}

/// Identifies one identity subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber#{}", self.0)
    }
}

/// Lookup activity counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub started: u64,
    pub cancelled: u64,
    pub delivered: u64,
    pub stale_dropped: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Clone)]
enum LookupOutcome {
    Found(ContactInfo),
    NotFound,
    Failed(String),
    TimedOut,
}

/// Result of a directory lookup, waiting to be applied on the control loop
#[derive(Debug, Clone)]
pub struct LookupCompletion {
    subscriber: SubscriberId,
    generation: u64,
    subject: Subject,
    outcome: LookupOutcome,
}

impl LookupCompletion {
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}

struct Subscription {
    subject: Option<Subject>,
    /// Bumped on every subject change; completions carry the value they started with
    generation: u64,
    in_flight: Option<CancellationToken>,
    identity: ViewPublisher<Option<CallerIdentity>>,
}

impl Subscription {
    fn cancel_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Resolves caller identities for a set of subscriptions
pub struct CallerIdentityResolver {
    directory: Arc<dyn ContactDirectory>,
    config: IdentityConfig,
    cache: IdentityCache,
    subscriptions: HashMap<SubscriberId, Subscription>,
    next_subscriber: u64,
    completion_tx: mpsc::UnboundedSender<LookupCompletion>,
    completion_rx: Option<mpsc::UnboundedReceiver<LookupCompletion>>,
    stats: LookupStats,
}

impl CallerIdentityResolver {
    pub fn new(directory: Arc<dyn ContactDirectory>, config: IdentityConfig) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            directory,
            cache: IdentityCache::new(config.cache_capacity),
            config,
            subscriptions: HashMap::new(),
            next_subscriber: 0,
            completion_tx,
            completion_rx: Some(completion_rx),
            stats: LookupStats::default(),
        }
    }

    /// Create a subscription with no subject
    pub fn subscribe(&mut self) -> (SubscriberId, watch::Receiver<Option<CallerIdentity>>) {
        self.next_subscriber += 1;
        let id = SubscriberId(self.next_subscriber);
        let identity = ViewPublisher::new(None);
        let rx = identity.subscribe();
        self.subscriptions.insert(
            id,
            Subscription {
                subject: None,
                generation: 0,
                in_flight: None,
                identity,
            },
        );
        (id, rx)
    }

    /// Drop a subscription, cancelling its lookup
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        if let Some(mut subscription) = self.subscriptions.remove(&id) {
            if subscription.cancel_in_flight() {
                self.stats.cancelled += 1;
            }
        }
    }

    /// Point a subscription at a subject and return the best identity known now
    ///
    /// Never blocks. Resolving the subject the subscription already follows
    /// returns the current identity without starting another lookup.
    pub fn resolve(&mut self, id: SubscriberId, address: &str, account_id: &AccountId) -> CallerIdentity {
        let subject = Subject::new(address, account_id.clone());
        let fallback = format::fallback_identity(address, &self.config.fallback_initials);

        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            warn!("Identity requested for unknown {}", id);
            return fallback;
        };

        if subscription.subject.as_ref() == Some(&subject) {
            return subscription.identity.current().unwrap_or(fallback);
        }

        if subscription.cancel_in_flight() {
            self.stats.cancelled += 1;
            debug!("Cancelled superseded lookup for {}", id);
        }
        subscription.generation += 1;
        subscription.subject = Some(subject.clone());

        let local = self.cache.get(&subject).or_else(|| {
            self.directory.cached(&subject).map(|contact| {
                let identity = format::identity_from_contact(&contact);
                self.cache.insert(subject.clone(), identity.clone());
                identity
            })
        });
        if let Some(identity) = local {
            self.stats.cache_hits += 1;
            subscription.identity.publish(Some(identity.clone()));
            return identity;
        }

        subscription.identity.publish(Some(fallback.clone()));
        let generation = subscription.generation;
        let token = self.spawn_lookup(id, generation, subject);
        if let Some(subscription) = self.subscriptions.get_mut(&id) {
            subscription.in_flight = token;
        }
        fallback
    }

    /// Stop following a subject; the subscription publishes `None`
    pub fn clear(&mut self, id: SubscriberId) {
        let Some(subscription) = self.subscriptions.get_mut(&id) else {
            return;
        };
        if subscription.subject.is_none() {
            return;
        }
        if subscription.cancel_in_flight() {
            self.stats.cancelled += 1;
        }
        subscription.generation += 1;
        subscription.subject = None;
        subscription.identity.publish(None);
    }

    /// Apply a lookup result; stale results are dropped
    pub fn apply_completion(&mut self, completion: LookupCompletion) {
        let current = self.subscriptions.get_mut(&completion.subscriber).filter(|subscription| {
            subscription.generation == completion.generation
                && subscription.subject.as_ref() == Some(&completion.subject)
        });
        let Some(subscription) = current else {
            self.stats.stale_dropped += 1;
            debug!("Dropping stale lookup result for {}", completion.subject);
            return;
        };
        subscription.in_flight = None;

        let identity = match completion.outcome {
            LookupOutcome::Found(contact) => {
                let identity = format::identity_from_contact(&contact);
                self.cache.insert(completion.subject.clone(), identity.clone());
                identity
            }
            LookupOutcome::NotFound => {
                debug!("No directory entry for {}", completion.subject);
                format::fallback_identity(&completion.subject.address, &self.config.fallback_initials)
            }
            LookupOutcome::Failed(message) => {
                self.stats.failed += 1;
                warn!("Directory lookup for {} failed: {}", completion.subject, message);
                format::fallback_identity(&completion.subject.address, &self.config.fallback_initials)
            }
            LookupOutcome::TimedOut => {
                self.stats.timed_out += 1;
                warn!(
                    "Directory lookup for {} timed out after {} ms",
                    completion.subject, self.config.lookup_timeout_ms
                );
                format::fallback_identity(&completion.subject.address, &self.config.fallback_initials)
            }
        };
        self.stats.delivered += 1;
        subscription.identity.publish(Some(identity));
    }

    /// Hand the completion receiver to an external control loop
    pub fn take_completion_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<LookupCompletion>> {
        self.completion_rx.take()
    }

    /// Give a receiver taken with `take_completion_receiver` back
    pub fn restore_completion_receiver(&mut self, rx: mpsc::UnboundedReceiver<LookupCompletion>) {
        self.completion_rx = Some(rx);
    }

    /// Wait for the next lookup completion
    ///
    /// Returns `None` when the receiver has been taken.
    pub async fn next_completion(&mut self) -> Option<LookupCompletion> {
        match self.completion_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Number of subscriptions with a lookup running
    pub fn lookups_in_flight(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|subscription| subscription.in_flight.is_some())
            .count()
    }

    /// Current identity published for a subscription
    pub fn identity(&self, id: SubscriberId) -> Option<CallerIdentity> {
        self.subscriptions
            .get(&id)
            .and_then(|subscription| subscription.identity.current())
    }

    /// Subject a subscription currently follows
    pub fn subject(&self, id: SubscriberId) -> Option<Subject> {
        self.subscriptions
            .get(&id)
            .and_then(|subscription| subscription.subject.clone())
    }

    pub fn clear_cache(&mut self) {
        info!("Clearing {} cached identities", self.cache.len());
        self.cache.clear();
    }

    pub fn stats(&self) -> LookupStats {
        self.stats.clone()
    }

    fn spawn_lookup(&mut self, id: SubscriberId, generation: u64, subject: Subject) -> Option<CancellationToken> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime; keeping fallback identity for {}", subject);
                return None;
            }
        };

        let token = CancellationToken::new();
        let cancel = token.clone();
        let directory = self.directory.clone();
        let tx = self.completion_tx.clone();
        let timeout = self.config.lookup_timeout();
        self.stats.started += 1;
        debug!("Starting directory lookup for {} ({})", subject, id);

        let span_subject = subject.to_string();
        runtime.spawn(async move {
            let query = subject.clone();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(timeout, directory.lookup(&query, cancel.clone())) => {
                    match result {
                        Ok(Ok(Some(contact))) => LookupOutcome::Found(contact),
                        Ok(Ok(None)) => LookupOutcome::NotFound,
                        Ok(Err(e)) => LookupOutcome::Failed(e.to_string()),
                        Err(_) => LookupOutcome::TimedOut,
                    }
                }
            };
            // The resolver may be gone by now
            let _ = tx.send(LookupCompletion {
                subscriber: id,
                generation,
                subject,
                outcome,
            });
        }
        .instrument(debug_span!("identity_lookup", subscriber = id.0, generation, subject = %span_subject)));
        Some(token)
    }
}

impl Drop for CallerIdentityResolver {
    fn drop(&mut self) {
        for subscription in self.subscriptions.values_mut() {
            subscription.cancel_in_flight();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use directory::StaticDirectory;
    use std::time::Duration;

    fn resolver(directory: StaticDirectory) -> CallerIdentityResolver {
        CallerIdentityResolver::new(Arc::new(directory), IdentityConfig::default())
    }

    #[test]
    fn test_local_store_hit_without_runtime() {
        let directory = StaticDirectory::new().with_local_contact("5551000", ContactInfo::new("Ada Lovelace"));
        let mut resolver = resolver(directory);
        let (id, rx) = resolver.subscribe();

        let identity = resolver.resolve(id, "5551000", &AccountId::new("sim1"));
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(identity.initials, "AL");
        assert_eq!(rx.borrow().as_ref(), Some(&identity));
        assert_eq!(resolver.stats().started, 0);
        assert_eq!(resolver.stats().cache_hits, 1);
    }

    #[test]
    fn test_miss_without_runtime_keeps_fallback() {
        let mut resolver = resolver(StaticDirectory::new());
        let (id, _rx) = resolver.subscribe();

        let identity = resolver.resolve(id, "6505551234", &AccountId::new("sim1"));
        assert_eq!(identity.display_name, "(650) 555-1234");
        assert_eq!(resolver.lookups_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_found_contact_is_cached() {
        let directory = StaticDirectory::new().with_contact("5551000", ContactInfo::new("Grace Hopper"));
        let mut resolver = resolver(directory);
        let (id, rx) = resolver.subscribe();
        let account = AccountId::new("sim1");

        resolver.resolve(id, "5551000", &account);
        let completion = resolver.next_completion().await.unwrap();
        resolver.apply_completion(completion);
        assert_eq!(rx.borrow().as_ref().unwrap().display_name, "Grace Hopper");

        let (other, _rx) = resolver.subscribe();
        let identity = resolver.resolve(other, "5551000", &account);
        assert_eq!(identity.display_name, "Grace Hopper");
        assert_eq!(resolver.stats().started, 1);
    }

    #[tokio::test]
    async fn test_same_subject_does_not_restart_lookup() {
        let directory = StaticDirectory::new().with_latency(Duration::from_millis(20));
        let mut resolver = resolver(directory);
        let (id, _rx) = resolver.subscribe();
        let account = AccountId::new("sim1");

        resolver.resolve(id, "5551000", &account);
        resolver.resolve(id, "5551000", &account);
        assert_eq!(resolver.stats().started, 1);
        assert_eq!(resolver.stats().cancelled, 0);
    }

    #[tokio::test]
    async fn test_lookup_timeout_keeps_fallback() {
        let directory = StaticDirectory::new()
            .with_contact("5551000", ContactInfo::new("Slow Sam"))
            .with_latency(Duration::from_secs(5));
        let config = IdentityConfig {
            lookup_timeout_ms: 20,
            ..Default::default()
        };
        let mut resolver = CallerIdentityResolver::new(Arc::new(directory), config);
        let (id, _rx) = resolver.subscribe();

        resolver.resolve(id, "5551000", &AccountId::new("sim1"));
        let completion = resolver.next_completion().await.unwrap();
        resolver.apply_completion(completion);

        assert_eq!(resolver.stats().timed_out, 1);
        assert_eq!(resolver.identity(id).unwrap().initials, "#");
        assert_eq!(resolver.lookups_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_clear_publishes_none() {
        let directory = StaticDirectory::new().with_latency(Duration::from_secs(5));
        let mut resolver = resolver(directory);
        let (id, rx) = resolver.subscribe();

        resolver.resolve(id, "5551000", &AccountId::new("sim1"));
        resolver.clear(id);
        assert_eq!(*rx.borrow(), None);
        assert_eq!(resolver.stats().cancelled, 1);
        assert_eq!(resolver.lookups_in_flight(), 0);
    }
}
