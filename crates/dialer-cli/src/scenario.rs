//! Scenario files and their replay through the engine
//!
//! A scenario is a JSON document with a contact directory and a list of
//! steps. Each step is either a telephony event, in the same shape the
//! telephony bridge produces, or a user action:
//!
//! ```json
//! {
//!   "contacts": [{ "address": "5550001", "display_name": "Ada Lovelace" }],
//!   "steps": [
//!     { "event": "call_added", "record": { "handle": 1, "state": "ringing", "address": "5550001", "account_id": "sim1" } },
//!     { "event": "call_state_changed", "handle": 1, "state": "active" },
//!     { "action": "toggle_hold" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, Instrument};

use dialer_core::audio_route::{AudioRoute, AudioRouteState};
use dialer_core::call::CallRecord;
use dialer_core::collaborator::{CallCommand, RecordingCallControl};
use dialer_core::config::DialerConfig;
use dialer_core::engine::{DialerEngine, DisplayedIdentities};
use dialer_core::events::TelephonyEvent;
use dialer_core::identity::directory::{ContactInfo, StaticDirectory};

/// One directory entry
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioContact {
    pub address: String,
    #[serde(flatten)]
    pub info: ContactInfo,
    /// Held in the local store and resolved without a lookup
    #[serde(default)]
    pub local: bool,
}

/// Something the user does on the in-call screen
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    Swap,
    Merge,
    ToggleHold,
    EndPrimary,
    SetAudioRoute { route: AudioRoute },
    SetMuted { muted: bool },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Event(TelephonyEvent),
    Action(UserAction),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub contacts: Vec<ScenarioContact>,
    /// Calls the telephony stack already has when the engine starts
    #[serde(default)]
    pub initial_calls: Vec<CallRecord>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read scenario {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid scenario {}", path.display()))
    }

    fn directory(&self) -> StaticDirectory {
        self.contacts.iter().fold(StaticDirectory::new(), |directory, contact| {
            if contact.local {
                directory.with_local_contact(contact.address.clone(), contact.info.clone())
            } else {
                directory.with_contact(contact.address.clone(), contact.info.clone())
            }
        })
    }
}

/// Compact call line for reports
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallSummary {
    pub handle: u64,
    pub state: String,
    pub account: String,
}

impl From<&CallRecord> for CallSummary {
    fn from(call: &CallRecord) -> Self {
        Self {
            handle: call.handle.0,
            state: call.state.to_string(),
            account: call.account_id.to_string(),
        }
    }
}

/// Engine state after one step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub ongoing: Vec<CallSummary>,
    pub incoming: Option<u64>,
    pub primary: Option<u64>,
    pub secondary: Option<u64>,
    pub identities: DisplayedIdentities,
    pub audio: AudioRouteState,
    pub commands: Vec<CallCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Feed every step through a fresh engine and report the state after each
pub async fn replay(scenario: &Scenario, config: DialerConfig) -> anyhow::Result<Vec<StepReport>> {
    let control = Arc::new(RecordingCallControl::new());
    control.set_current_calls(scenario.initial_calls.clone());
    let mut engine = DialerEngine::new(config, control.clone(), Arc::new(scenario.directory()));

    engine.sync_from_collaborator();
    engine.settle_identity_lookups().await;
    control.take_commands();

    let mut reports = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let step_number = index + 1;
        let span = debug_span!("replay_step", step = step_number);

        let error = span.in_scope(|| {
            debug!("Replaying {:?}", step);
            match step {
                Step::Event(event) => {
                    engine.handle_event(event);
                    None
                }
                Step::Action(action) => apply_action(&mut engine, action).err(),
            }
        });
        engine.settle_identity_lookups().instrument(span).await;

        reports.push(report(step_number, &engine, control.take_commands(), error));
    }

    info!("Replayed {} steps", reports.len());
    Ok(reports)
}

fn apply_action(engine: &mut DialerEngine, action: &UserAction) -> Result<(), String> {
    let outcome = match action {
        UserAction::Swap => engine.swap(),
        UserAction::Merge => engine.merge(),
        UserAction::ToggleHold => engine.toggle_hold(),
        UserAction::EndPrimary => engine.end_primary(),
        UserAction::SetAudioRoute { route } => engine.set_audio_route(*route).map(|_| true),
        UserAction::SetMuted { muted } => engine.set_muted(*muted).map(|_| true),
    };
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(format!("{:?} had no call to act on", action)),
        Err(e) => Err(e.to_string()),
    }
}

fn report(step: usize, engine: &DialerEngine, commands: Vec<CallCommand>, error: Option<String>) -> StepReport {
    let views = engine.views();
    StepReport {
        step,
        ongoing: views.ongoing_calls.iter().map(CallSummary::from).collect(),
        incoming: views.incoming_call.as_ref().map(|call| call.handle.0),
        primary: views.pair.primary.as_ref().map(|call| call.handle.0),
        secondary: views.pair.secondary.as_ref().map(|call| call.handle.0),
        identities: engine.identities(),
        audio: engine.audio_state(),
        commands,
        error,
    }
}
