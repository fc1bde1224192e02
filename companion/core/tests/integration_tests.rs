//! Integration tests for the companion core
//!
//! These tests verify that the components work together in realistic usage
//! scenarios:
//! - TOML configuration driving the conversation machine
//! - Exchanges animated by a frame-driven simulated avatar
//! - IPC events flowing through a subscription into the machine
//! - The avatar being unloaded while an exchange is waiting on motions

use std::io::Write;

use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use companion_core::backend::{ChatEvent, ScriptedBackend};
use companion_core::config::{load_config_from_path, ConfigSource};
use companion_core::motion::{MotionOutcome, MotionPair, MotionScheduler, SimulatedRuntime};
use companion_core::{
    CompanionMessage, ConversationConfig, ConversationMachine, ConversationState, IpcEvent,
    ListenerRegistry, SubmitOutcome,
};

/// Tick the scheduler every time the runtime lets us
fn spawn_frame_driver(scheduler: MotionScheduler) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            scheduler.tick();
            tokio::task::yield_now().await;
        }
    })
}

fn collect(rx: &mut mpsc::Receiver<CompanionMessage>) -> Vec<CompanionMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}

// =============================================================================
// Test 1: Configuration Drives the Machine
// =============================================================================

/// A config file changes the tags, the reset sentinel and the reactions.
#[tokio::test]
async fn test_config_file_drives_conversation() {
    let toml_content = r#"
[decoder]
start_tag = "<say>"
end_tag = "</say>"

[conversation]
reset_sentinel = "/clear"

[animation]
frame_rate = 30

[motions]
thinking = ["hmm-body", "hmm-face"]
acknowledged = ["ok-body", "ok-face"]
satisfied = ["yay-body", "yay-face"]
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
    assert!(matches!(
        config.source(),
        ConfigSource::File | ConfigSource::Env
    ));

    let runtime = SimulatedRuntime::new(2);
    let scheduler = MotionScheduler::with_runtime(runtime.clone());
    let (tx, _rx) = mpsc::channel(256);
    let machine = ConversationMachine::new(
        ScriptedBackend::echo("<say>", "</say>"),
        scheduler.clone(),
        config.conversation.clone(),
        tx,
    );
    let driver = spawn_frame_driver(scheduler);

    assert_eq!(machine.submit("good morning").await, SubmitOutcome::Completed);
    assert_eq!(machine.visible_response(), "good morning");

    let played: Vec<String> = runtime.history().into_iter().map(|r| r.group).collect();
    assert_eq!(
        played,
        vec!["hmm-body", "hmm-face", "ok-body", "ok-face", "yay-body", "yay-face"]
    );

    assert_eq!(machine.submit("/clear").await, SubmitOutcome::Reset);
    assert!(machine.history().responses().is_empty());
    assert_eq!(runtime.history().len(), 6, "reset plays no motion");

    driver.abort();
}

// =============================================================================
// Test 2: Streamed Replies Never Show Tags
// =============================================================================

/// Every visible-response update of an exchange is free of tag fragments,
/// even when the backend splits tags across chunks.
#[tokio::test]
async fn test_visible_updates_never_leak_tags() {
    let backend = ScriptedBackend::new(vec![
        ChatEvent::Started,
        ChatEvent::response("thinking... <resp"),
        ChatEvent::response("onse>Hi"),
        ChatEvent::response(" there</"),
        ChatEvent::response("response> (aside)"),
        ChatEvent::Finished,
    ]);

    let scheduler = MotionScheduler::with_runtime(SimulatedRuntime::new(1));
    let (tx, mut rx) = mpsc::channel(256);
    let machine = ConversationMachine::new(
        backend,
        scheduler.clone(),
        ConversationConfig::default(),
        tx,
    );
    let driver = spawn_frame_driver(scheduler);

    assert_eq!(machine.submit("hello").await, SubmitOutcome::Completed);
    driver.abort();

    let views: Vec<String> = collect(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            CompanionMessage::Response { text, .. } => Some(text),
            _ => None,
        })
        .collect();

    assert_eq!(views, vec!["", "", "Hi", "Hi there", "Hi there"]);
    assert_eq!(
        machine.history().responses(),
        ["thinking... <response>Hi there</response> (aside)".to_string()]
    );
}

// =============================================================================
// Test 3: IPC Events Reach the Machine
// =============================================================================

/// Prompts published through the registry run as exchanges; dropping the
/// registry ends the serve loop.
#[tokio::test]
async fn test_ipc_chat_events_are_served() {
    let backend = ScriptedBackend::echo("<response>", "</response>");
    let (tx, _rx) = mpsc::channel(256);
    let machine = ConversationMachine::new(
        backend.clone(),
        MotionScheduler::new(),
        ConversationConfig::default(),
        tx,
    );

    let registry = ListenerRegistry::new();
    let subscription = registry.subscribe().unwrap();
    assert!(registry.subscribe().is_err());

    let server = tokio::spawn({
        let machine = machine.clone();
        async move { machine.serve(subscription).await }
    });

    registry
        .publish(IpcEvent::Chat {
            message: "ping".into(),
        })
        .unwrap();

    for _ in 0..100 {
        if machine.history().prompts().len() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }

    drop(registry);
    server.await.unwrap();

    assert_eq!(backend.request_count(), 1);
    assert_eq!(machine.visible_response(), "ping");
    assert_eq!(machine.state(), ConversationState::Idle);
}

// =============================================================================
// Test 4: Avatar Unloaded Mid-Exchange
// =============================================================================

/// Unloading the avatar releases the pending motion waiters so the exchange
/// still completes, with later motions skipped.
#[tokio::test]
async fn test_detach_releases_waiting_exchange() {
    let runtime = SimulatedRuntime::new(1_000);
    let scheduler = MotionScheduler::with_runtime(runtime);
    let (tx, _rx) = mpsc::channel(256);
    let machine = ConversationMachine::new(
        ScriptedBackend::reply("still here", "<response>", "</response>"),
        scheduler.clone(),
        ConversationConfig::default(),
        tx,
    );

    let exchange = tokio::spawn({
        let machine = machine.clone();
        async move { machine.submit("hello?").await }
    });

    for _ in 0..100 {
        if scheduler.pending_count() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(scheduler.pending_count(), 2, "thinking pair in flight");

    scheduler.detach();
    assert_eq!(exchange.await.unwrap(), SubmitOutcome::Completed);
    assert_eq!(machine.visible_response(), "still here");
}

// =============================================================================
// Test 5: Clicks Pre-empt Each Other
// =============================================================================

/// A second reaction forced onto the same lanes supersedes the first one
/// instead of leaving it hanging.
#[tokio::test]
async fn test_second_reaction_supersedes_first() {
    let runtime = SimulatedRuntime::new(50);
    let scheduler = MotionScheduler::with_runtime(runtime.clone());

    let first = scheduler.do_motion_pair(&MotionPair::new("w-adult-blushed04", "face_smile_09"));
    let second = scheduler.do_motion_pair(&MotionPair::new("w-cool-glad01", "face_smile_04"));

    assert_eq!(
        first.await,
        (MotionOutcome::Superseded, MotionOutcome::Superseded)
    );
    assert_eq!(runtime.playing(0).as_deref(), Some("w-cool-glad01"));

    let driver = spawn_frame_driver(scheduler.clone());
    assert_eq!(
        second.await,
        (MotionOutcome::Finished, MotionOutcome::Finished)
    );
    driver.abort();
    assert_eq!(scheduler.pending_count(), 0);
}
