//! Hold, swap and merge on the primary/secondary pair
//!
//! [`HoldSwapController`] turns user actions into telephony commands. It
//! never touches call records: the state changes that follow a command reach
//! the [`CallSetCoordinator`](crate::coordinator::CallSetCoordinator) through
//! the regular event feed, like any other state change.

use std::sync::Arc;

use tracing::{debug, info};

use crate::call::{CallRecord, CallState};
use crate::collaborator::CallControl;
use crate::error::{DialerError, DialerResult};

/// Issues hold/unhold/merge/disconnect commands for user actions
pub struct HoldSwapController {
    control: Arc<dyn CallControl>,
}

impl HoldSwapController {
    pub fn new(control: Arc<dyn CallControl>) -> Self {
        Self { control }
    }

    /// Whether the two calls may be merged into a conference
    pub fn can_merge(&self, primary: &CallRecord, secondary: &CallRecord) -> bool {
        merge_refusal(primary, secondary).is_none()
    }

    /// Ask the telephony stack to merge `secondary` into `primary`
    ///
    /// Refused locally, without any command, when [`can_merge`](Self::can_merge)
    /// is false.
    pub fn merge(&self, primary: &CallRecord, secondary: &CallRecord) -> DialerResult<()> {
        if let Some(reason) = merge_refusal(primary, secondary) {
            debug!("Merge of {} and {} refused: {}", primary.handle, secondary.handle, reason);
            return Err(DialerError::MergeNotAllowed {
                primary: primary.handle,
                secondary: secondary.handle,
                reason: reason.to_string(),
            });
        }
        info!("Merging {} with {}", primary.handle, secondary.handle);
        self.control.merge(primary.handle, secondary.handle)
    }

    /// Whether swapping the pair would do anything
    pub fn can_swap(&self, primary: &CallRecord, secondary: &CallRecord) -> bool {
        primary.handle != secondary.handle
            && (secondary.state == CallState::Holding || primary.can_hold())
    }

    /// Put the primary call on hold and bring the secondary forward
    ///
    /// Within one account the telephony stack activates the other call by
    /// itself; across accounts the secondary is unheld explicitly.
    pub fn swap(&self, primary: &CallRecord, secondary: &CallRecord) -> DialerResult<()> {
        info!("Swapping {} and {}", primary.handle, secondary.handle);
        if primary.state != CallState::Holding {
            self.control.hold(primary.handle)?;
        }
        if !primary.same_account(secondary) {
            self.control.unhold(secondary.handle)?;
        }
        Ok(())
    }

    /// Hold an active call or resume a held one
    pub fn toggle_hold(&self, call: &CallRecord) -> DialerResult<()> {
        match call.state {
            CallState::Active if call.can_hold() => self.control.hold(call.handle),
            CallState::Holding => self.control.unhold(call.handle),
            state => {
                debug!("Ignoring hold toggle for {} in state {}", call.handle, state);
                Ok(())
            }
        }
    }

    /// Hang up a call
    pub fn end_call(&self, call: &CallRecord) -> DialerResult<()> {
        info!("Ending {}", call.handle);
        self.control.disconnect(call.handle)
    }
}

fn merge_refusal(primary: &CallRecord, secondary: &CallRecord) -> Option<&'static str> {
    if primary.handle == secondary.handle {
        Some("a call cannot be merged with itself")
    } else if primary.is_conference || secondary.is_conference {
        Some("one of the calls is already a conference")
    } else if !primary.same_account(secondary) {
        Some("the calls belong to different accounts")
    } else {
        None
    }
}
