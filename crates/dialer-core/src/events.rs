//! Inbound telephony events and outbound view updates
//!
//! [`TelephonyEvent`] is the feed the telephony stack produces. The
//! coordination layer consumes it strictly in arrival order.
//!
//! [`ViewUpdate`] is what the coordination layer publishes. For a single
//! inbound event the updates are emitted in a fixed order (all calls,
//! ongoing calls, incoming call, primary/secondary pair), and only for the
//! views whose value actually changed.
//!
//! # Examples
//!
//! ```rust
//! use dialer_core::events::TelephonyEvent;
//! use dialer_core::call::{CallHandle, CallState};
//!
//! let json = r#"{"event":"call_state_changed","handle":4,"state":"active"}"#;
//! let event: TelephonyEvent = serde_json::from_str(json).unwrap();
//! assert_eq!(event, TelephonyEvent::CallStateChanged { handle: CallHandle(4), state: CallState::Active });
//! ```

use serde::{Deserialize, Serialize};

use crate::audio_route::{AudioLink, CallAudioState};
use crate::call::{CallHandle, CallRecord, CallState};
use crate::ordering::CallPair;

/// Events reported by the telephony stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyEvent {
    /// A new call appeared
    CallAdded { record: CallRecord },
    /// A call went away
    CallRemoved { handle: CallHandle },
    /// A call changed state
    CallStateChanged { handle: CallHandle, state: CallState },
    /// A call's details changed; the record replaces the previous one wholesale
    CallUpdated { record: CallRecord },
    /// The legs of a conference changed
    ConferenceMembershipChanged {
        conference: CallHandle,
        children: Vec<CallHandle>,
    },
    /// The stack reported the current audio route and mute state
    AudioStateChanged { audio: CallAudioState },
    /// A headset or bluetooth link connected or disconnected
    LinkConnectivityChanged { link: AudioLink, connected: bool },
}

impl TelephonyEvent {
    /// The call this event concerns, if it concerns exactly one
    pub fn handle(&self) -> Option<CallHandle> {
        match self {
            TelephonyEvent::CallAdded { record } | TelephonyEvent::CallUpdated { record } => {
                Some(record.handle)
            }
            TelephonyEvent::CallRemoved { handle }
            | TelephonyEvent::CallStateChanged { handle, .. } => Some(*handle),
            TelephonyEvent::ConferenceMembershipChanged { conference, .. } => Some(*conference),
            _ => None,
        }
    }
}

/// A derived view that changed as a consequence of one inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewUpdate {
    /// Every live call, insertion order
    AllCalls { calls: Vec<CallRecord> },
    /// Ongoing calls in presentation order
    OngoingCalls { calls: Vec<CallRecord> },
    /// The call currently ringing, if any
    IncomingCall { call: Option<CallRecord> },
    /// The primary/secondary pair
    CallPair { pair: CallPair },
}

impl ViewUpdate {
    /// Short view name used in logs
    pub fn view_name(&self) -> &'static str {
        match self {
            ViewUpdate::AllCalls { .. } => "all_calls",
            ViewUpdate::OngoingCalls { .. } => "ongoing_calls",
            ViewUpdate::IncomingCall { .. } => "incoming_call",
            ViewUpdate::CallPair { .. } => "call_pair",
        }
    }
}
