//! Composition root and control loop
//!
//! [`DialerEngine`] owns one instance of every coordinator and wires them
//! together. It is the only place that knows how the pieces relate:
//!
//! - every [`TelephonyEvent`] goes to the call set coordinator or the audio
//!   route coordinator;
//! - after each event the audio coordinator learns the current primary call,
//!   and the three identity subscriptions (incoming, primary, secondary)
//!   are pointed at the calls now shown in those slots;
//! - user actions are applied to the current primary/secondary pair.
//!
//! [`run`](DialerEngine::run) drives all of this from a single task, so no
//! component needs locking.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_core::collaborator::CommandChannel;
//! use dialer_core::config::DialerConfig;
//! use dialer_core::engine::DialerEngine;
//! use dialer_core::identity::directory::StaticDirectory;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> dialer_core::error::DialerResult<()> {
//! let (control, _commands) = CommandChannel::new();
//! let mut engine = DialerEngine::new(
//!     DialerConfig::default(),
//!     Arc::new(control),
//!     Arc::new(StaticDirectory::new()),
//! );
//!
//! let (_event_tx, event_rx) = mpsc::channel(64);
//! let shutdown = CancellationToken::new();
//! engine.run(event_rx, shutdown).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio_route::{AudioRoute, AudioRouteCoordinator, AudioRouteState};
use crate::call::CallRecord;
use crate::collaborator::CallControl;
use crate::config::DialerConfig;
use crate::coordinator::{CallSetCoordinator, CallViews};
use crate::error::{DialerError, DialerResult};
use crate::events::TelephonyEvent;
use crate::hold_swap::HoldSwapController;
use crate::identity::directory::ContactDirectory;
use crate::identity::{CallerIdentity, CallerIdentityResolver, LookupCompletion, SubscriberId};

/// Which displayed call an identity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySlot {
    Incoming,
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy)]
struct IdentitySubscriptions {
    incoming: SubscriberId,
    primary: SubscriberId,
    secondary: SubscriberId,
}

impl IdentitySubscriptions {
    fn get(&self, slot: IdentitySlot) -> SubscriberId {
        match slot {
            IdentitySlot::Incoming => self.incoming,
            IdentitySlot::Primary => self.primary,
            IdentitySlot::Secondary => self.secondary,
        }
    }
}

/// Identities currently shown for the incoming, primary and secondary calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayedIdentities {
    pub incoming: Option<CallerIdentity>,
    pub primary: Option<CallerIdentity>,
    pub secondary: Option<CallerIdentity>,
}

/// Owns and wires the dialer's coordinators
pub struct DialerEngine {
    calls: CallSetCoordinator,
    hold_swap: HoldSwapController,
    identity: CallerIdentityResolver,
    audio: AudioRouteCoordinator,
    subscriptions: IdentitySubscriptions,
    identity_watches: [watch::Receiver<Option<CallerIdentity>>; 3],
}

impl DialerEngine {
    pub fn new(
        config: DialerConfig,
        control: Arc<dyn CallControl>,
        directory: Arc<dyn ContactDirectory>,
    ) -> Self {
        let mut identity = CallerIdentityResolver::new(directory, config.identity.clone());
        let (incoming, incoming_rx) = identity.subscribe();
        let (primary, primary_rx) = identity.subscribe();
        let (secondary, secondary_rx) = identity.subscribe();

        Self {
            calls: CallSetCoordinator::new(control.clone(), config.coordination.clone()),
            hold_swap: HoldSwapController::new(control.clone()),
            identity,
            audio: AudioRouteCoordinator::new(control, config.audio.clone()),
            subscriptions: IdentitySubscriptions { incoming, primary, secondary },
            identity_watches: [incoming_rx, primary_rx, secondary_rx],
        }
    }

    /// Run the control loop until `shutdown` fires or the event feed closes
    ///
    /// The live call set is first rebuilt from the telephony stack's
    /// snapshot. Lookup completions are applied on this task, interleaved
    /// with telephony events in arrival order.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<TelephonyEvent>,
        shutdown: CancellationToken,
    ) -> DialerResult<()> {
        let mut completions = self
            .identity
            .take_completion_receiver()
            .ok_or_else(|| DialerError::internal("engine control loop is already running"))?;

        info!("Dialer engine started");
        self.sync_from_collaborator();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        info!("Telephony event feed closed");
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.apply_identity_completion(completion),
            }
        }

        self.identity.restore_completion_receiver(completions);
        info!("Dialer engine stopped");
        Ok(())
    }

    /// Apply one telephony event and refresh everything that depends on it
    pub fn handle_event(&mut self, event: &TelephonyEvent) {
        debug!("Telephony event {:?}", event);
        if !self.calls.handle_event(event) {
            self.audio.handle_event(event);
        }
        self.refresh_dependents();
    }

    /// Rebuild the call set from the telephony stack's snapshot
    pub fn sync_from_collaborator(&mut self) {
        self.calls.sync_from_collaborator();
        self.refresh_dependents();
    }

    pub fn apply_identity_completion(&mut self, completion: LookupCompletion) {
        self.identity.apply_completion(completion);
    }

    /// Wait until no identity lookup is running, applying each completion
    ///
    /// Used when driving the engine step by step instead of through `run`.
    pub async fn settle_identity_lookups(&mut self) {
        while self.identity.lookups_in_flight() > 0 {
            match self.identity.next_completion().await {
                Some(completion) => self.identity.apply_completion(completion),
                None => break,
            }
        }
    }

    /// Swap the primary and secondary calls; `false` when there is no pair
    pub fn swap(&mut self) -> DialerResult<bool> {
        let Some((primary, secondary)) = self.current_pair() else {
            debug!("Swap ignored: fewer than two ongoing calls");
            return Ok(false);
        };
        if !self.hold_swap.can_swap(&primary, &secondary) {
            debug!("Swap ignored: {} cannot be held", primary.handle);
            return Ok(false);
        }
        self.hold_swap.swap(&primary, &secondary)?;
        Ok(true)
    }

    /// Merge the primary and secondary calls; `false` when there is no pair
    pub fn merge(&mut self) -> DialerResult<bool> {
        let Some((primary, secondary)) = self.current_pair() else {
            debug!("Merge ignored: fewer than two ongoing calls");
            return Ok(false);
        };
        self.hold_swap.merge(&primary, &secondary)?;
        Ok(true)
    }

    /// Hold or resume the primary call
    pub fn toggle_hold(&mut self) -> DialerResult<bool> {
        match self.calls.primary_pair().primary {
            Some(primary) => self.hold_swap.toggle_hold(&primary).map(|_| true),
            None => Ok(false),
        }
    }

    /// Hang up the primary call
    pub fn end_primary(&mut self) -> DialerResult<bool> {
        match self.calls.primary_pair().primary {
            Some(primary) => self.hold_swap.end_call(&primary).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn set_audio_route(&mut self, route: AudioRoute) -> DialerResult<()> {
        self.audio.set_route(route)
    }

    pub fn set_muted(&mut self, muted: bool) -> DialerResult<()> {
        self.audio.set_muted(muted)
    }

    pub fn calls(&self) -> &CallSetCoordinator {
        &self.calls
    }

    pub fn audio(&self) -> &AudioRouteCoordinator {
        &self.audio
    }

    pub fn identity(&self) -> &CallerIdentityResolver {
        &self.identity
    }

    pub fn views(&self) -> CallViews {
        self.calls.snapshot()
    }

    pub fn audio_state(&self) -> AudioRouteState {
        self.audio.state()
    }

    pub fn identities(&self) -> DisplayedIdentities {
        DisplayedIdentities {
            incoming: self.identity.identity(self.subscriptions.incoming),
            primary: self.identity.identity(self.subscriptions.primary),
            secondary: self.identity.identity(self.subscriptions.secondary),
        }
    }

    pub fn subscribe_identity(&self, slot: IdentitySlot) -> watch::Receiver<Option<CallerIdentity>> {
        let index = match slot {
            IdentitySlot::Incoming => 0,
            IdentitySlot::Primary => 1,
            IdentitySlot::Secondary => 2,
        };
        self.identity_watches[index].clone()
    }

    fn current_pair(&self) -> Option<(CallRecord, CallRecord)> {
        let pair = self.calls.primary_pair();
        pair.primary.zip(pair.secondary)
    }

    fn refresh_dependents(&mut self) {
        let views = self.calls.snapshot();
        self.audio
            .on_primary_call_changed(views.pair.primary.as_ref().map(|call| call.handle));

        let shown = [
            (IdentitySlot::Incoming, views.incoming_call.as_ref()),
            (IdentitySlot::Primary, views.pair.primary.as_ref()),
            (IdentitySlot::Secondary, views.pair.secondary.as_ref()),
        ];
        for (slot, call) in shown {
            let subscriber = self.subscriptions.get(slot);
            match call {
                Some(call) => {
                    self.identity.resolve(subscriber, &call.address, &call.account_id);
                }
                None => self.identity.clear(subscriber),
            }
        }
    }
}
