//! Contact directory collaborator
//!
//! The directory has two faces: a synchronous local store that is consulted
//! before anything else, and a slow asynchronous lookup that runs off the
//! control loop and can be cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Subject;
use crate::error::{DialerError, DialerResult};

/// What the directory knows about a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

impl ContactInfo {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

/// Source of caller identities
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Synchronous local lookup; must not block
    fn cached(&self, _subject: &Subject) -> Option<ContactInfo> {
        None
    }

    /// Slow lookup; implementations should stop early once `cancel` fires
    ///
    /// `Ok(None)` means the directory has no entry for the subject.
    async fn lookup(&self, subject: &Subject, cancel: CancellationToken) -> DialerResult<Option<ContactInfo>>;
}

/// In-memory directory with an artificial lookup latency
///
/// Entries are keyed by address. Entries added with
/// [`with_local_contact`](Self::with_local_contact) are also visible to the
/// synchronous [`cached`](ContactDirectory::cached) lookup.
///
/// ```rust
/// use dialer_core::call::AccountId;
/// use dialer_core::identity::Subject;
/// use dialer_core::identity::directory::{ContactDirectory, ContactInfo, StaticDirectory};
/// use tokio_util::sync::CancellationToken;
///
/// let directory = StaticDirectory::new()
///     .with_contact("5551000", ContactInfo::new("Ada Lovelace"));
/// let subject = Subject::new("5551000", AccountId::new("sim1"));
///
/// assert!(directory.cached(&subject).is_none());
/// # tokio_test::block_on(async {
/// let found = directory.lookup(&subject, CancellationToken::new()).await.unwrap();
/// assert_eq!(found.unwrap().display_name, "Ada Lovelace");
/// # });
/// ```
#[derive(Debug, Default)]
pub struct StaticDirectory {
    contacts: HashMap<String, ContactInfo>,
    local: HashMap<String, ContactInfo>,
    latency: Duration,
    lookups: AtomicU64,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry only reachable through the asynchronous lookup
    pub fn with_contact(mut self, address: impl Into<String>, contact: ContactInfo) -> Self {
        self.contacts.insert(address.into(), contact);
        self
    }

    /// Add an entry held in the local store
    pub fn with_local_contact(mut self, address: impl Into<String>, contact: ContactInfo) -> Self {
        let address = address.into();
        self.local.insert(address.clone(), contact.clone());
        self.contacts.insert(address, contact);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of asynchronous lookups started so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContactDirectory for StaticDirectory {
    fn cached(&self, subject: &Subject) -> Option<ContactInfo> {
        self.local.get(&subject.address).cloned()
    }

    async fn lookup(&self, subject: &Subject, cancel: CancellationToken) -> DialerResult<Option<ContactInfo>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        trace!("Directory lookup for {}", subject.address);
        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DialerError::lookup("cancelled")),
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        Ok(self.contacts.get(&subject.address).cloned())
    }
}
