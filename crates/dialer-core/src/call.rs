//! Call records and their support types
//!
//! A [`CallRecord`] is an immutable snapshot of everything the telephony
//! stack reports about one call. Records are never edited in place: every
//! lifecycle event produces a new record that replaces the previous one in
//! the live call set, so readers holding an older snapshot always see a
//! self-consistent value.
//!
//! # Examples
//!
//! ```rust
//! use dialer_core::call::{AccountId, CallCapability, CallHandle, CallRecord, CallState};
//!
//! let call = CallRecord::new(CallHandle(7), CallState::Dialing, "+16505551234", AccountId::new("sim1"))
//!     .with_capability(CallCapability::Hold);
//!
//! let connected = call.with_state(CallState::Active).with_connect_time(1_000);
//! assert_eq!(call.state, CallState::Dialing);
//! assert_eq!(connected.state, CallState::Active);
//! assert!(connected.can_hold());
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of one call, stable for the call's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallHandle(pub u64);

impl fmt::Display for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Telephony account (SIM, paired phone line, third-party calling app)
/// that originated a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create a new account identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Account used for records synthesized from events about unknown handles
    pub fn unknown() -> Self {
        Self(String::new())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a call
///
/// Transitions are monotonic (Dialing/Ringing → Active → Disconnected),
/// except that Active and Holding may alternate any number of times.
/// `Disconnected` is terminal and removes the call from the live set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Outgoing call placed, remote party not yet answered
    Dialing,
    /// Incoming call waiting for the user to answer or decline
    Ringing,
    /// Call connected and carrying audio
    Active,
    /// Call connected but on hold
    Holding,
    /// Call ended
    Disconnected,
}

impl CallState {
    /// Whether a call in this state participates in the ongoing ordering
    pub fn is_ongoing(&self) -> bool {
        matches!(self, CallState::Dialing | CallState::Active | CallState::Holding)
    }

    /// Whether moving from `self` to `next` respects the lifecycle rules
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        match (*self, next) {
            (a, b) if a == b => true,
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (Dialing | Ringing, Active | Holding) => true,
            (Active, Holding) | (Holding, Active) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Dialing => "DIALING",
            CallState::Ringing => "RINGING",
            CallState::Active => "ACTIVE",
            CallState::Holding => "HOLDING",
            CallState::Disconnected => "DISCONNECTED",
        };
        f.write_str(name)
    }
}

/// An operation the telephony stack allows on a particular call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCapability {
    /// Call can be placed on hold and resumed
    Hold,
    /// Call can be merged with another call into a conference
    Merge,
    /// Conference legs can be swapped
    SwapConference,
    /// Microphone can be muted for this call
    Mute,
    /// Individual conference legs can be managed
    ManageConference,
}

/// Set of capabilities reported for a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallCapabilities(BTreeSet<CallCapability>);

impl CallCapabilities {
    /// Empty capability set
    pub fn none() -> Self {
        Self::default()
    }

    /// Check whether a capability is present
    pub fn contains(&self, capability: CallCapability) -> bool {
        self.0.contains(&capability)
    }

    /// Return a copy with one more capability
    pub fn with(mut self, capability: CallCapability) -> Self {
        self.0.insert(capability);
        self
    }

    /// Iterate over the capabilities in a stable order
    pub fn iter(&self) -> impl Iterator<Item = CallCapability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<CallCapability> for CallCapabilities {
    fn from_iter<I: IntoIterator<Item = CallCapability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Immutable snapshot of one call's externally visible attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Stable identity of the call
    pub handle: CallHandle,
    /// Current lifecycle state
    pub state: CallState,
    /// Phone number, or an opaque id for self-managed calls
    pub address: String,
    /// Account/transport that owns the call
    pub account_id: AccountId,
    /// Whether this record is a conference aggregate
    #[serde(default)]
    pub is_conference: bool,
    /// Whether a third-party calling app owns the call
    #[serde(default)]
    pub is_self_managed: bool,
    /// Wall-clock millis when the call became active, 0 if never connected
    #[serde(default)]
    pub connect_time_millis: u64,
    /// Operations the telephony stack supports for this call
    #[serde(default)]
    pub capabilities: CallCapabilities,
    /// Conference aggregate this call is a leg of
    #[serde(default)]
    pub parent: Option<CallHandle>,
}

impl CallRecord {
    /// Create a record with no capabilities and no connect time
    pub fn new(
        handle: CallHandle,
        state: CallState,
        address: impl Into<String>,
        account_id: AccountId,
    ) -> Self {
        Self {
            handle,
            state,
            address: address.into(),
            account_id,
            is_conference: false,
            is_self_managed: false,
            connect_time_millis: 0,
            capabilities: CallCapabilities::none(),
            parent: None,
        }
    }

    /// Minimal record for a handle the coordinator has never seen
    pub fn placeholder(handle: CallHandle, state: CallState) -> Self {
        Self::new(handle, state, String::new(), AccountId::unknown())
    }

    pub fn with_state(&self, state: CallState) -> Self {
        Self { state, ..self.clone() }
    }

    pub fn with_connect_time(mut self, connect_time_millis: u64) -> Self {
        self.connect_time_millis = connect_time_millis;
        self
    }

    pub fn with_capability(mut self, capability: CallCapability) -> Self {
        self.capabilities = self.capabilities.with(capability);
        self
    }

    pub fn with_capabilities(mut self, capabilities: CallCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_parent(&self, parent: Option<CallHandle>) -> Self {
        Self { parent, ..self.clone() }
    }

    pub fn conference(mut self) -> Self {
        self.is_conference = true;
        self
    }

    pub fn self_managed(mut self) -> Self {
        self.is_self_managed = true;
        self
    }

    /// Whether the call has connected at least once
    pub fn is_connected(&self) -> bool {
        self.connect_time_millis > 0
    }

    /// Whether the telephony stack allows holding this call
    pub fn can_hold(&self) -> bool {
        self.capabilities.contains(CallCapability::Hold)
    }

    /// Whether both calls belong to the same account
    pub fn same_account(&self, other: &CallRecord) -> bool {
        self.account_id == other.account_id
    }
}
