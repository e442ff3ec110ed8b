//! End-to-end scenarios through the dialer engine

use std::sync::Arc;
use std::time::Duration;

use dialer_core::engine::IdentitySlot;
use dialer_core::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn call(handle: u64, state: CallState, account: &str, connect: u64) -> CallRecord {
    CallRecord::new(
        CallHandle(handle),
        state,
        format!("55500{:02}", handle),
        AccountId::new(account),
    )
    .with_connect_time(connect)
    .with_capability(CallCapability::Hold)
    .with_capability(CallCapability::Merge)
}

fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_contact("5550001", ContactInfo::new("Ada Lovelace"))
        .with_contact("5550002", ContactInfo::new("Grace Hopper"))
        .with_contact("5550003", ContactInfo::new("Alan Turing"))
        .with_latency(Duration::from_millis(5))
}

fn engine() -> (DialerEngine, Arc<RecordingCallControl>) {
    let control = Arc::new(RecordingCallControl::new());
    let engine = DialerEngine::new(DialerConfig::default(), control.clone(), Arc::new(directory()));
    (engine, control)
}

fn handles(calls: &[CallRecord]) -> Vec<u64> {
    calls.iter().map(|call| call.handle.0).collect()
}

#[tokio::test]
async fn test_control_loop_answers_incoming_call() {
    let (mut engine, control) = engine();
    let mut pair = engine.calls().subscribe_call_pair();
    let mut incoming_identity = engine.subscribe_identity(IdentitySlot::Incoming);

    let (events, event_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let loop_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        engine.run(event_rx, loop_shutdown).await.unwrap();
        engine
    });

    events
        .send(TelephonyEvent::CallAdded { record: call(1, CallState::Active, "X", 1000) })
        .await
        .unwrap();
    events
        .send(TelephonyEvent::CallAdded { record: call(2, CallState::Holding, "X", 500) })
        .await
        .unwrap();
    events
        .send(TelephonyEvent::CallAdded { record: call(3, CallState::Ringing, "X", 0) })
        .await
        .unwrap();

    let identity = tokio::time::timeout(
        Duration::from_secs(2),
        incoming_identity.wait_for(|identity| {
            identity.as_ref().map(|i| i.display_name == "Alan Turing").unwrap_or(false)
        }),
    )
    .await
    .expect("incoming identity resolved")
    .unwrap()
    .clone();
    assert_eq!(identity.unwrap().initials, "AT");

    events
        .send(TelephonyEvent::CallStateChanged { handle: CallHandle(3), state: CallState::Active })
        .await
        .unwrap();
    tokio::time::timeout(
        Duration::from_secs(2),
        pair.wait_for(|pair| {
            pair.secondary.as_ref().map(|call| call.handle) == Some(CallHandle(3))
        }),
    )
    .await
    .expect("pair updated")
    .unwrap();

    shutdown.cancel();
    let engine = task.await.unwrap();

    let views = engine.views();
    assert_eq!(handles(&views.ongoing_calls), vec![1, 3, 2]);
    assert!(views.incoming_call.is_none());
    assert_eq!(engine.identities().incoming, None);
    assert!(control.commands().is_empty());
}

#[tokio::test]
async fn test_identity_follows_the_call_between_slots() {
    let (mut engine, _control) = engine();

    engine.handle_event(&TelephonyEvent::CallAdded { record: call(1, CallState::Ringing, "X", 0) });
    engine.settle_identity_lookups().await;
    assert_eq!(engine.identities().incoming.unwrap().display_name, "Ada Lovelace");

    engine.handle_event(&TelephonyEvent::CallStateChanged {
        handle: CallHandle(1),
        state: CallState::Active,
    });
    let identities = engine.identities();
    assert_eq!(identities.incoming, None);
    assert_eq!(identities.primary.unwrap().display_name, "Ada Lovelace");
    assert_eq!(identities.secondary, None);

    // The answered call is served from the cache
    let stats = engine.identity().stats();
    assert_eq!(stats.started, 1);
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn test_cross_account_call_then_swap() {
    let (mut engine, control) = engine();

    engine.handle_event(&TelephonyEvent::CallAdded { record: call(1, CallState::Active, "X", 1000) });
    engine.handle_event(&TelephonyEvent::CallAdded { record: call(2, CallState::Active, "Y", 2000) });
    assert_eq!(control.take_commands(), vec![CallCommand::Hold { handle: CallHandle(1) }]);

    engine.handle_event(&TelephonyEvent::CallStateChanged {
        handle: CallHandle(1),
        state: CallState::Holding,
    });
    let pair = engine.views().pair;
    assert_eq!(pair.primary.unwrap().handle, CallHandle(2));
    assert_eq!(pair.secondary.unwrap().handle, CallHandle(1));

    let err = engine.merge().unwrap_err();
    assert!(matches!(err, DialerError::MergeNotAllowed { .. }));
    assert!(control.commands().is_empty());

    assert!(engine.swap().unwrap());
    assert_eq!(
        control.take_commands(),
        vec![
            CallCommand::Hold { handle: CallHandle(2) },
            CallCommand::Unhold { handle: CallHandle(1) },
        ]
    );
    engine.settle_identity_lookups().await;
}

#[tokio::test]
async fn test_merge_same_account_pair() {
    let (mut engine, control) = engine();
    assert!(!engine.merge().unwrap());

    engine.handle_event(&TelephonyEvent::CallAdded { record: call(1, CallState::Active, "X", 1000) });
    engine.handle_event(&TelephonyEvent::CallAdded { record: call(2, CallState::Holding, "X", 500) });
    assert!(engine.merge().unwrap());
    assert_eq!(
        control.commands(),
        vec![CallCommand::Merge { primary: CallHandle(1), secondary: CallHandle(2) }]
    );
    engine.settle_identity_lookups().await;
}

#[tokio::test]
async fn test_audio_route_follows_primary_call() {
    let (mut engine, control) = engine();

    engine.handle_event(&TelephonyEvent::LinkConnectivityChanged {
        link: AudioLink::Bluetooth,
        connected: true,
    });
    engine.handle_event(&TelephonyEvent::AudioStateChanged {
        audio: CallAudioState { route: AudioRoute::Bluetooth, muted: true },
    });
    assert_eq!(engine.audio_state().active_route, None);

    // A report made before the call existed does not carry over to it
    engine.handle_event(&TelephonyEvent::CallAdded { record: call(1, CallState::Active, "X", 1000) });
    assert_eq!(engine.audio_state().active_route, None);
    assert!(!engine.audio_state().muted);

    engine.handle_event(&TelephonyEvent::AudioStateChanged {
        audio: CallAudioState { route: AudioRoute::Bluetooth, muted: false },
    });
    assert_eq!(engine.audio_state().active_route, Some(AudioRoute::Bluetooth));

    engine.set_audio_route(AudioRoute::Speaker).unwrap();
    assert!(engine.set_audio_route(AudioRoute::WiredHeadset).is_err());
    engine.set_muted(true).unwrap();
    assert_eq!(
        control.commands(),
        vec![
            CallCommand::SetAudioRoute { route: AudioRoute::Speaker },
            CallCommand::SetMuted { muted: true },
        ]
    );

    engine.handle_event(&TelephonyEvent::CallRemoved { handle: CallHandle(1) });
    let audio = engine.audio_state();
    assert_eq!(audio.active_route, None);
    assert_eq!(audio.pending_route, None);
    engine.settle_identity_lookups().await;
}

#[tokio::test]
async fn test_run_starts_from_collaborator_snapshot() {
    let (mut engine, control) = engine();
    control.set_current_calls(vec![
        call(2, CallState::Holding, "X", 500),
        call(1, CallState::Active, "X", 1000),
    ]);

    let (events, event_rx) = mpsc::channel(1);
    drop(events);
    engine.run(event_rx, CancellationToken::new()).await.unwrap();

    assert_eq!(handles(&engine.views().ongoing_calls), vec![1, 2]);
    assert_eq!(engine.identity().lookups_in_flight(), 2);
    engine.settle_identity_lookups().await;
    assert_eq!(engine.identities().secondary.unwrap().display_name, "Grace Hopper");
}
