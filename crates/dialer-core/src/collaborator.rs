//! Capability interface toward the telephony stack
//!
//! The coordinators never reach into a concrete telephony service. They see
//! only [`CallControl`]: a snapshot query plus fire-and-forget commands.
//! Command outcomes are never awaited; the telephony stack reports the
//! resulting state through its regular event feed, which is the only source
//! of truth for local state.
//!
//! # Implementations
//!
//! - [`CommandChannel`] forwards every command over a tokio mpsc channel to
//!   whatever task talks to the real telephony stack.
//! - [`RecordingCallControl`] keeps commands in memory; used by the replay
//!   tool and tests.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::audio_route::AudioRoute;
use crate::call::{CallHandle, CallRecord};
use crate::error::{DialerError, DialerResult};

/// A command issued back to the telephony stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CallCommand {
    Hold { handle: CallHandle },
    Unhold { handle: CallHandle },
    Disconnect { handle: CallHandle },
    Merge { primary: CallHandle, secondary: CallHandle },
    SetAudioRoute { route: AudioRoute },
    SetMuted { muted: bool },
}

impl CallCommand {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            CallCommand::Hold { .. } => "hold",
            CallCommand::Unhold { .. } => "unhold",
            CallCommand::Disconnect { .. } => "disconnect",
            CallCommand::Merge { .. } => "merge",
            CallCommand::SetAudioRoute { .. } => "set_audio_route",
            CallCommand::SetMuted { .. } => "set_muted",
        }
    }
}

impl fmt::Display for CallCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallCommand::Hold { handle }
            | CallCommand::Unhold { handle }
            | CallCommand::Disconnect { handle } => write!(f, "{}({})", self.name(), handle),
            CallCommand::Merge { primary, secondary } => {
                write!(f, "merge({}, {})", primary, secondary)
            }
            CallCommand::SetAudioRoute { route } => write!(f, "set_audio_route({})", route),
            CallCommand::SetMuted { muted } => write!(f, "set_muted({})", muted),
        }
    }
}

/// Operations the coordination layer needs from the telephony stack
pub trait CallControl: Send + Sync {
    /// Synchronous snapshot of the calls the stack currently knows about
    fn current_calls(&self) -> Vec<CallRecord>;

    /// Hand a command to the stack; `Ok` only means it was accepted for delivery
    fn issue(&self, command: CallCommand) -> DialerResult<()>;

    fn hold(&self, handle: CallHandle) -> DialerResult<()> {
        self.issue(CallCommand::Hold { handle })
    }

    fn unhold(&self, handle: CallHandle) -> DialerResult<()> {
        self.issue(CallCommand::Unhold { handle })
    }

    fn disconnect(&self, handle: CallHandle) -> DialerResult<()> {
        self.issue(CallCommand::Disconnect { handle })
    }

    fn merge(&self, primary: CallHandle, secondary: CallHandle) -> DialerResult<()> {
        self.issue(CallCommand::Merge { primary, secondary })
    }

    fn set_audio_route(&self, route: AudioRoute) -> DialerResult<()> {
        self.issue(CallCommand::SetAudioRoute { route })
    }

    fn set_muted(&self, muted: bool) -> DialerResult<()> {
        self.issue(CallCommand::SetMuted { muted })
    }
}

/// Forwards commands over a channel to the task owning the real stack
pub struct CommandChannel {
    tx: mpsc::UnboundedSender<CallCommand>,
    snapshot: Arc<Mutex<Vec<CallRecord>>>,
}

impl CommandChannel {
    /// Create the channel; the receiver goes to the telephony bridge task
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CallCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                snapshot: Arc::new(Mutex::new(Vec::new())),
            },
            rx,
        )
    }

    /// Shared slot the bridge task refreshes with the stack's current calls
    pub fn snapshot_slot(&self) -> Arc<Mutex<Vec<CallRecord>>> {
        self.snapshot.clone()
    }
}

impl CallControl for CommandChannel {
    fn current_calls(&self) -> Vec<CallRecord> {
        self.snapshot.lock().clone()
    }

    fn issue(&self, command: CallCommand) -> DialerResult<()> {
        debug!("Forwarding telephony command {}", command);
        self.tx
            .send(command)
            .map_err(|e| DialerError::collaborator(e.0.name(), "telephony bridge is gone"))
    }
}

/// In-memory call control that records every command it receives
#[derive(Debug, Default)]
pub struct RecordingCallControl {
    commands: Mutex<Vec<CallCommand>>,
    calls: Mutex<Vec<CallRecord>>,
    reject: Mutex<Option<String>>,
}

impl RecordingCallControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the calls returned by `current_calls`
    pub fn set_current_calls(&self, calls: Vec<CallRecord>) {
        *self.calls.lock() = calls;
    }

    /// Make every subsequent command fail with the given message
    pub fn reject_commands(&self, message: impl Into<String>) {
        *self.reject.lock() = Some(message.into());
    }

    /// All commands received so far, oldest first
    pub fn commands(&self) -> Vec<CallCommand> {
        self.commands.lock().clone()
    }

    /// Remove and return the commands received so far
    pub fn take_commands(&self) -> Vec<CallCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl CallControl for RecordingCallControl {
    fn current_calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    fn issue(&self, command: CallCommand) -> DialerResult<()> {
        if let Some(message) = self.reject.lock().as_ref() {
            return Err(DialerError::collaborator(command.name(), message.clone()));
        }
        self.commands.lock().push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_channel_delivers_in_order() {
        let (control, mut rx) = CommandChannel::new();
        control.hold(CallHandle(1)).unwrap();
        control.merge(CallHandle(1), CallHandle(2)).unwrap();

        assert_eq!(rx.recv().await, Some(CallCommand::Hold { handle: CallHandle(1) }));
        assert_eq!(
            rx.recv().await,
            Some(CallCommand::Merge { primary: CallHandle(1), secondary: CallHandle(2) })
        );
    }

    #[test]
    fn test_command_channel_reports_closed_bridge() {
        let (control, rx) = CommandChannel::new();
        drop(rx);
        let err = control.disconnect(CallHandle(3)).unwrap_err();
        assert!(matches!(err, DialerError::Collaborator { ref command, .. } if command == "disconnect"));
    }

    #[test]
    fn test_recording_control_rejection() {
        let control = RecordingCallControl::new();
        control.unhold(CallHandle(1)).unwrap();
        control.reject_commands("transport refused");
        assert!(control.hold(CallHandle(1)).is_err());
        assert_eq!(control.commands(), vec![CallCommand::Unhold { handle: CallHandle(1) }]);
    }
}
