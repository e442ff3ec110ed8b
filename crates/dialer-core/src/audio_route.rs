//! Audio route coordination
//!
//! Derives the displayed audio route from two inputs: the audio state the
//! telephony stack reports for the primary call, and headset/bluetooth link
//! connectivity. Route and mute changes are commands; the displayed state
//! only follows the telephony stack's confirmation, never the request.
//!
//! # Usage Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dialer_core::audio_route::{AudioLink, AudioRoute, AudioRouteCoordinator, CallAudioState};
//! use dialer_core::call::CallHandle;
//! use dialer_core::collaborator::RecordingCallControl;
//! use dialer_core::config::AudioConfig;
//!
//! let control = Arc::new(RecordingCallControl::new());
//! let mut audio = AudioRouteCoordinator::new(control.clone(), AudioConfig::default());
//!
//! audio.on_link_changed(AudioLink::Bluetooth, true);
//! audio.on_primary_call_changed(Some(CallHandle(1)));
//! audio.on_audio_state_changed(CallAudioState { route: AudioRoute::Bluetooth, muted: false });
//! assert_eq!(audio.state().active_route, Some(AudioRoute::Bluetooth));
//!
//! audio.set_route(AudioRoute::Speaker).unwrap();
//! // Still bluetooth until the stack confirms
//! assert_eq!(audio.state().active_route, Some(AudioRoute::Bluetooth));
//! assert_eq!(audio.state().pending_route, Some(AudioRoute::Speaker));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::call::CallHandle;
use crate::collaborator::CallControl;
use crate::config::AudioConfig;
use crate::coordinator::ViewPublisher;
use crate::error::{DialerError, DialerResult};
use crate::events::TelephonyEvent;

/// Where call audio is played and captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    /// Handset earpiece
    Earpiece,
    /// Built-in loudspeaker (the car's speakers on a head unit)
    Speaker,
    /// Wired headset
    WiredHeadset,
    /// Bluetooth hands-free link
    Bluetooth,
}

impl AudioRoute {
    /// Routes that exist without any external link
    pub fn is_built_in(&self) -> bool {
        matches!(self, AudioRoute::Earpiece | AudioRoute::Speaker)
    }
}

impl fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioRoute::Earpiece => "earpiece",
            AudioRoute::Speaker => "speaker",
            AudioRoute::WiredHeadset => "wired_headset",
            AudioRoute::Bluetooth => "bluetooth",
        };
        f.write_str(name)
    }
}

/// External audio links whose connectivity changes the available routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioLink {
    WiredHeadset,
    Bluetooth,
}

/// Audio state as reported by the telephony stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAudioState {
    /// Route the stack is actually using
    pub route: AudioRoute,
    /// Whether the microphone is muted
    #[serde(default)]
    pub muted: bool,
}

/// Derived audio state for the UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioRouteState {
    /// Route in use for the primary call; `None` without a primary call
    pub active_route: Option<AudioRoute>,
    /// Routes the user can pick right now
    pub supported_routes: Vec<AudioRoute>,
    /// Whether the microphone is muted
    pub muted: bool,
    /// Route requested by the user and not yet confirmed
    pub pending_route: Option<AudioRoute>,
}

/// Tracks the active and supported audio routes
pub struct AudioRouteCoordinator {
    control: Arc<dyn CallControl>,
    config: AudioConfig,
    primary: Option<CallHandle>,
    reported: Option<CallAudioState>,
    links: BTreeSet<AudioLink>,
    pending_route: Option<AudioRoute>,
    state: ViewPublisher<AudioRouteState>,
}

impl AudioRouteCoordinator {
    pub fn new(control: Arc<dyn CallControl>, config: AudioConfig) -> Self {
        let mut coordinator = Self {
            control,
            config,
            primary: None,
            reported: None,
            links: BTreeSet::new(),
            pending_route: None,
            state: ViewPublisher::new(AudioRouteState::default()),
        };
        coordinator.recompute();
        coordinator
    }

    /// Apply an audio-related telephony event; returns `false` for others
    pub fn handle_event(&mut self, event: &TelephonyEvent) -> bool {
        match event {
            TelephonyEvent::AudioStateChanged { audio } => self.on_audio_state_changed(*audio),
            TelephonyEvent::LinkConnectivityChanged { link, connected } => {
                self.on_link_changed(*link, *connected)
            }
            _ => return false,
        }
        true
    }

    /// The primary call changed (or went away)
    ///
    /// The previous call's reported state and any pending request are
    /// dropped; the new call shows no route until the stack reports one.
    pub fn on_primary_call_changed(&mut self, primary: Option<CallHandle>) {
        if self.primary == primary {
            return;
        }
        debug!("Audio routing follows primary call {:?}", primary);
        self.primary = primary;
        self.reported = None;
        self.pending_route = None;
        self.recompute();
    }

    /// The telephony stack reported its actual audio state
    pub fn on_audio_state_changed(&mut self, audio: CallAudioState) {
        if let Some(pending) = self.pending_route.take() {
            if pending != audio.route {
                info!("Requested route {} not applied; stack reports {}", pending, audio.route);
            }
        }
        self.reported = Some(audio);
        self.recompute();
    }

    /// A headset or bluetooth link connected or disconnected
    pub fn on_link_changed(&mut self, link: AudioLink, connected: bool) {
        let changed = if connected {
            self.links.insert(link)
        } else {
            self.links.remove(&link)
        };
        if !changed {
            return;
        }
        info!("Audio link {:?} {}", link, if connected { "connected" } else { "disconnected" });
        self.recompute();
    }

    /// Ask the telephony stack to switch routes
    ///
    /// The displayed route does not change until the stack confirms.
    pub fn set_route(&mut self, route: AudioRoute) -> DialerResult<()> {
        if !self.supported_routes().contains(&route) {
            warn!("Refusing to request unavailable audio route {}", route);
            return Err(DialerError::UnsupportedRoute { route: route.to_string() });
        }
        self.control.set_audio_route(route)?;
        self.pending_route = Some(route);
        self.recompute();
        Ok(())
    }

    /// Ask the telephony stack to mute or unmute the microphone
    pub fn set_muted(&mut self, muted: bool) -> DialerResult<()> {
        self.control.set_muted(muted)
    }

    pub fn state(&self) -> AudioRouteState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<AudioRouteState> {
        self.state.subscribe()
    }

    fn supported_routes(&self) -> Vec<AudioRoute> {
        let mut routes = Vec::new();
        if self.links.contains(&AudioLink::Bluetooth) {
            routes.push(AudioRoute::Bluetooth);
        }
        if self.links.contains(&AudioLink::WiredHeadset) {
            routes.push(AudioRoute::WiredHeadset);
        } else if self.config.has_earpiece {
            routes.push(AudioRoute::Earpiece);
        }
        if !routes.contains(&self.config.built_in_route) {
            routes.push(self.config.built_in_route);
        }
        if !routes.contains(&AudioRoute::Speaker) {
            routes.push(AudioRoute::Speaker);
        }
        routes
    }

    fn recompute(&mut self) {
        let supported_routes = self.supported_routes();
        let active_route = self.primary.and(self.reported.map(|audio| audio.route));

        if let Some(route) = active_route {
            if !supported_routes.contains(&route) {
                // Keep showing what the stack reported; its next report corrects it
                debug!("Reported route {} is no longer available; awaiting the stack's next report", route);
            }
        }

        let state = AudioRouteState {
            active_route,
            supported_routes,
            muted: self.reported.map(|audio| audio.muted).unwrap_or(false),
            pending_route: self.pending_route,
        };
        if self.state.publish(state) {
            debug!("Audio route state updated");
        }
    }
}
