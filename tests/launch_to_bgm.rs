//! Closes the control loop end-to-end on unix: a fake game process writes
//! lines, the runner streams them through the bus, and the BGM engine
//! reacts with a trigger match and a playback state change.

#![allow(clippy::unwrap_used, clippy::expect_used)]
#![cfg(unix)]

use neko_launcher::bgm::{BgmConfig, BgmEngine, BgmTrigger, NullOutput};
use neko_launcher::launch::process::{LaunchCommand, ProcessRunner};
use neko_launcher::types::{BgmState, EventKind, EventPayload};
use neko_launcher::EventBus;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn process_output_drives_music() {
    let bus = EventBus::new();
    let loop_handle = bus.spawn_loop();

    let engine = BgmEngine::new(bus.clone(), NullOutput::factory());
    engine
        .initialize(BgmConfig {
            triggers: vec![BgmTrigger {
                name: "world".into(),
                pattern: r"loaded\s+world".into(),
                music_path: "world.ogg".into(),
                fade_in_ms: 1,
                fade_out_ms: 50,
                ..Default::default()
            }],
            ..Default::default()
        })
        .unwrap();
    engine.subscribe_to_events();

    let matched = Arc::new(Mutex::new(Vec::new()));
    let matched_c = matched.clone();
    bus.subscribe(EventKind::BgmTriggerMatched, move |event| {
        if let EventPayload::BgmTriggerMatched { name, line, .. } = &event.payload {
            matched_c.lock().unwrap().push((name.clone(), line.clone()));
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let command = LaunchCommand {
        program: PathBuf::from("sh"),
        args: vec![
            "-c".into(),
            "echo '[Client] loaded world'; sleep 0.2".into(),
        ],
        working_dir: dir.path().to_path_buf(),
        access_token: String::new(),
        natives_dir: None,
    };

    let runner = ProcessRunner::new(bus.clone());
    let process = runner.spawn(command).unwrap();

    // The trigger fires off the process output and the player starts.
    let mut playing = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if engine.state() == BgmState::Playing {
            playing = true;
            break;
        }
    }
    assert!(playing, "music never started");
    assert_eq!(matched.lock().unwrap()[0].0, "world");

    let code = tokio::time::timeout(Duration::from_secs(5), process.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, Some(0));

    // Process exit fades the music out (one-second envelope).
    let mut stopped = false;
    for _ in 0..80 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if engine.state() == BgmState::Stopped {
            stopped = true;
            break;
        }
    }
    assert!(stopped, "music never stopped after process exit");

    bus.stop();
    let _ = loop_handle.await;
}
