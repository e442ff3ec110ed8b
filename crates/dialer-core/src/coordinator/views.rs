//! Per-view publication
//!
//! Each derived view is held in a `watch` channel so late subscribers always
//! start from the current value. Publishing an unchanged value is a no-op,
//! which keeps identical recomputations from reaching the UI. Every actual
//! change is also pushed onto a broadcast channel, giving observers that
//! need the full history an ordered stream of [`ViewUpdate`]s.

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::call::CallRecord;
use crate::events::ViewUpdate;
use crate::ordering::CallPair;

/// A single observable value with equality-based suppression
#[derive(Debug)]
pub struct ViewPublisher<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + PartialEq> ViewPublisher<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Store `value`; returns `false` when it equals the current value
    pub fn publish(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Every derived view at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallViews {
    /// All live calls, insertion order
    pub all_calls: Vec<CallRecord>,
    /// Ongoing calls, presentation order
    pub ongoing_calls: Vec<CallRecord>,
    /// The ringing call surfaced as incoming
    pub incoming_call: Option<CallRecord>,
    /// Primary and secondary calls
    pub pair: CallPair,
}

/// The publishers for all call views plus the ordered update stream
#[derive(Debug)]
pub(crate) struct CallViewPublishers {
    pub all_calls: ViewPublisher<Vec<CallRecord>>,
    pub ongoing_calls: ViewPublisher<Vec<CallRecord>>,
    pub incoming_call: ViewPublisher<Option<CallRecord>>,
    pub pair: ViewPublisher<CallPair>,
    pub primary_call: ViewPublisher<Option<CallRecord>>,
    pub secondary_call: ViewPublisher<Option<CallRecord>>,
    updates: broadcast::Sender<ViewUpdate>,
}

impl CallViewPublishers {
    pub fn new(update_capacity: usize) -> Self {
        let (updates, _rx) = broadcast::channel(update_capacity.max(1));
        Self {
            all_calls: ViewPublisher::new(Vec::new()),
            ongoing_calls: ViewPublisher::new(Vec::new()),
            incoming_call: ViewPublisher::new(None),
            pair: ViewPublisher::new(CallPair::default()),
            primary_call: ViewPublisher::new(None),
            secondary_call: ViewPublisher::new(None),
            updates,
        }
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Publish a freshly computed set of views, in fixed view order
    ///
    /// Returns the updates that were emitted.
    pub fn publish(&self, views: CallViews) -> Vec<ViewUpdate> {
        let mut emitted = Vec::new();

        if self.all_calls.publish(views.all_calls.clone()) {
            emitted.push(ViewUpdate::AllCalls { calls: views.all_calls });
        }
        if self.ongoing_calls.publish(views.ongoing_calls.clone()) {
            emitted.push(ViewUpdate::OngoingCalls { calls: views.ongoing_calls });
        }
        if self.incoming_call.publish(views.incoming_call.clone()) {
            emitted.push(ViewUpdate::IncomingCall { call: views.incoming_call });
        }
        self.primary_call.publish(views.pair.primary.clone());
        self.secondary_call.publish(views.pair.secondary.clone());
        if self.pair.publish(views.pair.clone()) {
            emitted.push(ViewUpdate::CallPair { pair: views.pair });
        }

        for update in &emitted {
            trace!("Publishing {} update", update.view_name());
            // No subscribers is fine; the watch channels still hold the value
            let _ = self.updates.send(update.clone());
        }
        emitted
    }

    pub fn current(&self) -> CallViews {
        CallViews {
            all_calls: self.all_calls.current(),
            ongoing_calls: self.ongoing_calls.current(),
            incoming_call: self.incoming_call.current(),
            pair: self.pair.current(),
        }
    }
}
