//! # Dialer Core - Multi-call State Coordination
//!
//! This crate holds the call coordination logic of an in-vehicle dialer. It
//! ingests the call lifecycle events reported by a telephony stack and
//! derives a consistent model the UI can render:
//!
//! - **Call set**: all calls, ongoing calls in presentation order, the
//!   incoming call, and the primary/secondary pair
//! - **Hold/swap/merge**: user actions on the primary/secondary pair
//! - **Caller identity**: cached or asynchronously looked-up display data,
//!   with at most one lookup in flight per displayed call
//! - **Audio routing**: active and selectable audio routes
//!
//! The telephony stack and the contact directory are collaborators behind
//! the [`CallControl`](collaborator::CallControl) and
//! [`ContactDirectory`](identity::directory::ContactDirectory) traits.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dialer_core::prelude::*;
//!
//! let control = Arc::new(RecordingCallControl::new());
//! let mut engine = DialerEngine::new(
//!     DialerConfig::default(),
//!     control.clone(),
//!     Arc::new(StaticDirectory::new()),
//! );
//!
//! let call = CallRecord::new(CallHandle(1), CallState::Ringing, "6505551234", AccountId::new("sim1"));
//! engine.handle_event(&TelephonyEvent::CallAdded { record: call });
//! assert_eq!(engine.views().incoming_call.unwrap().handle, CallHandle(1));
//!
//! engine.handle_event(&TelephonyEvent::CallStateChanged {
//!     handle: CallHandle(1),
//!     state: CallState::Active,
//! });
//! let views = engine.views();
//! assert!(views.incoming_call.is_none());
//! assert_eq!(views.pair.primary.unwrap().handle, CallHandle(1));
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  telephony stack                                   UI
//!  ───────────────                                   ──
//!  TelephonyEvent ──► DialerEngine::run ──► CallSetCoordinator ──► call views
//!        ▲                 │    │                                (watch + broadcast)
//!        │                 │    └─────────► AudioRouteCoordinator ──► audio state
//!        │                 └──────────────► CallerIdentityResolver ──► identities
//!        │                                        │
//!   CallControl ◄── HoldSwapController     ContactDirectory (worker tasks)
//! ```
//!
//! Everything except directory lookups runs on one task. Lookup results
//! are marshalled back to that task before they touch any state.

pub mod audio_route;
pub mod call;
pub mod collaborator;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod hold_swap;
pub mod identity;
pub mod live_set;
pub mod logging;
pub mod ordering;

// Re-export main types
pub use audio_route::{AudioLink, AudioRoute, AudioRouteCoordinator, AudioRouteState, CallAudioState};
pub use call::{AccountId, CallCapabilities, CallCapability, CallHandle, CallRecord, CallState};
pub use collaborator::{CallCommand, CallControl, CommandChannel, RecordingCallControl};
pub use config::DialerConfig;
pub use coordinator::{CallSetCoordinator, CallViews, CoordinatorStats};
pub use engine::{DialerEngine, DisplayedIdentities, IdentitySlot};
pub use error::{DialerError, DialerResult};
pub use events::{TelephonyEvent, ViewUpdate};
pub use hold_swap::HoldSwapController;
pub use identity::{CallerIdentity, CallerIdentityResolver, LookupStats, Subject};
pub use ordering::{CallOrderingPolicy, CallPair};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commonly used types
pub mod prelude {
    pub use crate::audio_route::{AudioLink, AudioRoute, CallAudioState};
    pub use crate::call::{AccountId, CallCapability, CallHandle, CallRecord, CallState};
    pub use crate::collaborator::{CallCommand, CallControl, RecordingCallControl};
    pub use crate::config::DialerConfig;
    pub use crate::engine::DialerEngine;
    pub use crate::error::{DialerError, DialerResult};
    pub use crate::events::{TelephonyEvent, ViewUpdate};
    pub use crate::identity::directory::{ContactDirectory, ContactInfo, StaticDirectory};
}
