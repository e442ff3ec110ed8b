//! Call set coordination
//!
//! [`CallSetCoordinator`] owns the authoritative [`LiveCallSet`] and turns
//! the telephony event feed into the derived views the UI consumes.
//!
//! # Guarantees
//!
//! - Views are recomputed and published synchronously inside the event
//!   handler that caused the change. When `on_call_added` returns, every
//!   subscriber can already observe the new call in all affected views.
//! - Events are processed in arrival order and updates are emitted in that
//!   same order; only value-identical publications are suppressed.
//! - No entry point panics or returns an error. Malformed input (events for
//!   unknown handles, several ringing calls, rejected commands) is logged,
//!   counted in [`CoordinatorStats`] and absorbed.
//!
//! # Cross-account focus
//!
//! When a call becomes Active or Dialing, ongoing calls owned by a
//! *different* account are put on hold, or disconnected when they cannot be
//! held. The telephony stack already does this for calls on the same
//! account, but not across heterogeneous call sources (for example a SIM
//! call and a self-managed VoIP call).
//!
//! ```text
//!  TelephonyEvent ──► CallSetCoordinator ──► LiveCallSet
//!                           │                    │
//!                           │            CallOrderingPolicy
//!                           │                    │
//!                           ▼                    ▼
//!                      CallControl      watch views + ViewUpdate stream
//! ```

mod views;


pub use views::{CallViews, ViewPublisher};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::call::{CallHandle, CallRecord, CallState};
use crate::collaborator::CallControl;
use crate::config::CoordinationConfig;
use crate::events::{TelephonyEvent, ViewUpdate};
use crate::live_set::LiveCallSet;
use crate::ordering::{CallOrderingPolicy, CallPair};

use views::CallViewPublishers;

/// Anomaly and activity counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Call events applied to the live set
    pub events_applied: u64,
    /// Events that referenced a handle not in the live set
    pub unknown_handle_events: u64,
    /// Times a call started ringing while another was already ringing
    pub ambiguous_incoming: u64,
    /// Hold/disconnect commands issued by the cross-account rule
    pub cross_account_commands: u64,
    /// Commands the telephony stack refused to accept
    pub commands_failed: u64,
}

/// Owner of the live call set and publisher of the derived call views
pub struct CallSetCoordinator {
    live: LiveCallSet,
    control: Arc<dyn CallControl>,
    config: CoordinationConfig,
    views: CallViewPublishers,
    /// Ringing calls waiting for their one-shot answer/decline transition
    ringing_watch: HashSet<CallHandle>,
    /// Ringing calls behind the last reported ambiguity
    ambiguous_ringing: HashSet<CallHandle>,
    stats: CoordinatorStats,
}

impl CallSetCoordinator {
    pub fn new(control: Arc<dyn CallControl>, config: CoordinationConfig) -> Self {
        let views = CallViewPublishers::new(config.update_channel_capacity);
        Self {
            live: LiveCallSet::new(),
            control,
            config,
            views,
            ringing_watch: HashSet::new(),
            ambiguous_ringing: HashSet::new(),
            stats: CoordinatorStats::default(),
        }
    }

    /// Apply a call-related telephony event
    ///
    /// Returns `false` for events that are not about calls (audio and link
    /// events), which the coordinator ignores.
    pub fn handle_event(&mut self, event: &TelephonyEvent) -> bool {
        match event {
            TelephonyEvent::CallAdded { record } => self.on_call_added(record.clone()),
            TelephonyEvent::CallRemoved { handle } => self.on_call_removed(*handle),
            TelephonyEvent::CallStateChanged { handle, state } => {
                self.on_call_state_changed(*handle, *state)
            }
            TelephonyEvent::CallUpdated { record } => self.on_call_updated(record.clone()),
            TelephonyEvent::ConferenceMembershipChanged { conference, children } => {
                self.on_conference_membership_changed(*conference, children)
            }
            TelephonyEvent::AudioStateChanged { .. }
            | TelephonyEvent::LinkConnectivityChanged { .. } => return false,
        }
        true
    }

    /// A call appeared
    pub fn on_call_added(&mut self, record: CallRecord) {
        self.stats.events_applied += 1;
        let handle = record.handle;

        if record.state == CallState::Disconnected {
            debug!("Ignoring add of already disconnected {}", handle);
            if self.live.contains(handle) {
                self.remove_and_publish(handle);
            }
            return;
        }

        if self.live.upsert(record.clone()).is_some() {
            warn!("{} added twice; replacing the previous record", handle);
        } else {
            info!("Call added: {} ({}) on account '{}'", handle, record.state, record.account_id);
        }

        if record.state == CallState::Ringing {
            self.ringing_watch.insert(handle);
        } else {
            self.ringing_watch.remove(&handle);
        }

        self.recompute();
        self.enforce_cross_account_focus(&record);
    }

    /// A call went away
    pub fn on_call_removed(&mut self, handle: CallHandle) {
        self.stats.events_applied += 1;
        if !self.live.contains(handle) {
            debug!("Removal of unknown {} ignored", handle);
            return;
        }
        info!("Call removed: {}", handle);
        self.remove_and_publish(handle);
    }

    /// A call changed state
    ///
    /// Events for handles that were never added are tolerated: the record is
    /// taken from the telephony snapshot (or synthesized) and added.
    pub fn on_call_state_changed(&mut self, handle: CallHandle, state: CallState) {
        let Some(previous) = self.live.get(handle).cloned() else {
            self.stats.unknown_handle_events += 1;
            if state == CallState::Disconnected {
                debug!("Disconnect for unknown {} ignored", handle);
                return;
            }
            warn!("State {} reported for unknown {}; treating as an add", state, handle);
            let record = self
                .control
                .current_calls()
                .into_iter()
                .find(|record| record.handle == handle)
                .map(|record| record.with_state(state))
                .unwrap_or_else(|| CallRecord::placeholder(handle, state));
            self.on_call_added(record);
            return;
        };

        if previous.state == state {
            return;
        }
        let updated = previous.with_state(state);
        self.replace_record(previous, updated);
    }

    /// A call's record was replaced wholesale
    pub fn on_call_updated(&mut self, record: CallRecord) {
        let Some(previous) = self.live.get(record.handle).cloned() else {
            self.stats.unknown_handle_events += 1;
            warn!("Update for unknown {}; treating as an add", record.handle);
            self.on_call_added(record);
            return;
        };
        if previous == record {
            return;
        }
        self.replace_record(previous, record);
    }

    fn replace_record(&mut self, previous: CallRecord, updated: CallRecord) {
        self.stats.events_applied += 1;
        let handle = updated.handle;
        let state_changed = previous.state != updated.state;

        if state_changed && !previous.state.can_transition_to(updated.state) {
            warn!(
                "Unexpected transition {} -> {} for {}; applying it anyway",
                previous.state, updated.state, handle
            );
        }

        if updated.state == CallState::Disconnected {
            info!("Call disconnected: {}", handle);
            self.remove_and_publish(handle);
            return;
        }

        self.live.upsert(updated.clone());

        if previous.state == CallState::Ringing
            && updated.state != CallState::Ringing
            && self.ringing_watch.remove(&handle)
        {
            info!("Incoming {} left ringing state: now {}", handle, updated.state);
        }
        if updated.state == CallState::Ringing {
            self.ringing_watch.insert(handle);
        }

        if state_changed {
            debug!("{}: {} -> {}", handle, previous.state, updated.state);
        }
        self.recompute();
        if state_changed {
            self.enforce_cross_account_focus(&updated);
        }
    }

    /// The set of legs belonging to a conference changed
    pub fn on_conference_membership_changed(&mut self, conference: CallHandle, children: &[CallHandle]) {
        self.stats.events_applied += 1;
        if !self.live.contains(conference) {
            self.stats.unknown_handle_events += 1;
            warn!("Membership change for unknown conference {}", conference);
        }

        let wanted: HashSet<CallHandle> = children.iter().copied().collect();
        let mut changed = Vec::new();
        for record in self.live.records() {
            let is_member = wanted.contains(&record.handle);
            let was_member = record.parent == Some(conference);
            if is_member && !was_member {
                changed.push(record.with_parent(Some(conference)));
            } else if was_member && !is_member {
                changed.push(record.with_parent(None));
            }
        }
        for handle in &wanted {
            if !self.live.contains(*handle) {
                debug!("Conference {} lists unknown leg {}", conference, handle);
            }
        }

        debug!("Conference {} now has {} legs ({} changed)", conference, wanted.len(), changed.len());
        for record in changed {
            self.live.upsert(record);
        }
        self.recompute();
    }

    /// Rebuild the live set from the telephony stack's snapshot
    ///
    /// Used at start-up and after the telephony connection is re-established.
    /// Known handles keep their insertion order; no cross-account commands are
    /// issued because the snapshot reflects a state the stack already settled.
    pub fn sync_from_collaborator(&mut self) {
        let snapshot: Vec<CallRecord> = self
            .control
            .current_calls()
            .into_iter()
            .filter(|record| record.state != CallState::Disconnected)
            .collect();
        let present: HashSet<CallHandle> = snapshot.iter().map(|record| record.handle).collect();

        let stale: Vec<CallHandle> = self
            .live
            .records()
            .map(|record| record.handle)
            .filter(|handle| !present.contains(handle))
            .collect();
        for handle in stale {
            self.live.remove(handle);
        }

        self.ringing_watch.clear();
        for record in snapshot {
            if record.state == CallState::Ringing {
                self.ringing_watch.insert(record.handle);
            }
            self.live.upsert(record);
        }

        info!("Synchronized {} calls from the telephony stack", self.live.len());
        self.recompute();
    }

    fn remove_and_publish(&mut self, handle: CallHandle) {
        self.live.remove(handle);
        self.ringing_watch.remove(&handle);
        self.recompute();
    }

    fn recompute(&mut self) {
        let ongoing = CallOrderingPolicy::ongoing(&self.live);
        let incoming = CallOrderingPolicy::incoming(&self.live);
        if incoming.is_ambiguous() {
            let ringing: HashSet<CallHandle> = self
                .live
                .records()
                .filter(|record| record.state == CallState::Ringing)
                .map(|record| record.handle)
                .collect();
            if !ringing.is_subset(&self.ambiguous_ringing) {
                self.stats.ambiguous_incoming += 1;
                warn!(
                    "{} calls ringing at once; surfacing the most recent ({})",
                    incoming.ringing_count,
                    incoming.call.as_ref().map(|c| c.handle.to_string()).unwrap_or_default()
                );
            }
            self.ambiguous_ringing = ringing;
        } else {
            self.ambiguous_ringing.clear();
        }
        let pair = CallOrderingPolicy::primary_pair(&ongoing);

        let views = CallViews {
            all_calls: self.live.records().cloned().collect(),
            ongoing_calls: ongoing,
            incoming_call: incoming.call,
            pair,
        };
        let emitted = self.views.publish(views);
        debug!("Recomputed call views: {} changed", emitted.len());
    }

    fn enforce_cross_account_focus(&mut self, trigger: &CallRecord) {
        if !self.config.cross_account_hold {
            return;
        }
        if !matches!(trigger.state, CallState::Active | CallState::Dialing) {
            return;
        }
        if trigger.account_id.as_str().is_empty() {
            debug!("Skipping cross-account check for {}: account unknown", trigger.handle);
            return;
        }

        let others: Vec<CallRecord> = CallOrderingPolicy::ongoing(&self.live)
            .into_iter()
            .filter(|other| other.handle != trigger.handle)
            .filter(|other| other.state != CallState::Holding)
            .filter(|other| other.parent != Some(trigger.handle))
            .filter(|other| !other.account_id.as_str().is_empty())
            .filter(|other| other.account_id != trigger.account_id)
            .collect();

        for other in others {
            self.stats.cross_account_commands += 1;
            let result = if other.can_hold() {
                info!(
                    "Holding {} on account '{}' because {} is now {}",
                    other.handle, other.account_id, trigger.handle, trigger.state
                );
                self.control.hold(other.handle)
            } else {
                info!(
                    "Disconnecting unholdable {} on account '{}' because {} is now {}",
                    other.handle, other.account_id, trigger.handle, trigger.state
                );
                self.control.disconnect(other.handle)
            };
            if let Err(e) = result {
                self.stats.commands_failed += 1;
                warn!("Cross-account command for {} failed: {}", other.handle, e);
            }
        }
    }

    /// Current record for a handle
    pub fn get(&self, handle: CallHandle) -> Option<&CallRecord> {
        self.live.get(handle)
    }

    pub fn live_set(&self) -> &LiveCallSet {
        &self.live
    }

    /// Handles of the legs attached to a conference aggregate
    pub fn conference_children(&self, conference: CallHandle) -> Vec<CallHandle> {
        self.live.children_of(conference)
    }

    /// Whether a ringing call is still waiting for its answer/decline transition
    pub fn is_awaiting_answer(&self, handle: CallHandle) -> bool {
        self.ringing_watch.contains(&handle)
    }

    /// All derived views as last published
    pub fn snapshot(&self) -> CallViews {
        self.views.current()
    }

    pub fn primary_pair(&self) -> CallPair {
        self.views.pair.current()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.clone()
    }

    pub fn subscribe_all_calls(&self) -> watch::Receiver<Vec<CallRecord>> {
        self.views.all_calls.subscribe()
    }

    pub fn subscribe_ongoing_calls(&self) -> watch::Receiver<Vec<CallRecord>> {
        self.views.ongoing_calls.subscribe()
    }

    pub fn subscribe_incoming_call(&self) -> watch::Receiver<Option<CallRecord>> {
        self.views.incoming_call.subscribe()
    }

    pub fn subscribe_call_pair(&self) -> watch::Receiver<CallPair> {
        self.views.pair.subscribe()
    }

    pub fn subscribe_primary_call(&self) -> watch::Receiver<Option<CallRecord>> {
        self.views.primary_call.subscribe()
    }

    pub fn subscribe_secondary_call(&self) -> watch::Receiver<Option<CallRecord>> {
        self.views.secondary_call.subscribe()
    }

    /// Ordered stream of every view change
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ViewUpdate> {
        self.views.subscribe_updates()
    }
}
