//! End-to-end transmission through the public API

use std::sync::{Arc, Mutex};
use std::time::Duration;

use frame_conductor::transmitters::MemoryTransmitter;
use frame_conductor::{Conductor, ConductorConfig, Engine, ProgressStatus, TransmissionStatus};
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ten_frames_at_ten_fps() {
    let transmitter = MemoryTransmitter::new();
    let engine = Engine::new(999, 512, transmitter.clone());

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    engine.set_frame_observer(move |frame| sink.lock().unwrap().push(frame));

    assert!(engine.start_sending(10, 10).await);
    sleep(Duration::from_millis(1100)).await;

    let current = engine.current_frame();
    assert!((10..=11).contains(&current), "current frame {}", current);

    let observed = observed.lock().unwrap().clone();
    assert!(observed.len() >= 10, "observed {:?}", observed);
    assert_eq!(observed[0], 0);
    assert!(observed.windows(2).all(|w| w[1] == w[0] + 1), "observed {:?}", observed);

    for payload in transmitter.sent() {
        assert_eq!(payload.universe, 999);
        assert_eq!(payload.data.len(), 512);
        assert!(payload.data[2..].iter().all(|&b| b == 0));
    }

    engine.stop_sending().await;
    assert_eq!(engine.status(), TransmissionStatus::Stopped);
    assert_eq!(engine.current_frame(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conductor_runs_to_target_and_idles() {
    let transmitter = MemoryTransmitter::new();
    let config = ConductorConfig { total_frames: 5, frame_rate: 50, universe: 1, frame_length: 24 };
    let conductor = Conductor::new(config, transmitter.clone());

    conductor.start().await.unwrap();
    sleep(Duration::from_millis(400)).await;

    assert_eq!(transmitter.frames(), vec![0, 1, 2, 3, 4, 5]);
    let progress = conductor.progress();
    assert_eq!(progress.frame, 5);
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.status, ProgressStatus::Sending);
    assert_eq!(conductor.state().state, TransmissionStatus::Running);

    conductor.shutdown().await;
    assert!(!transmitter.is_initialized());
}
