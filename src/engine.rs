//! Transmission engine: owns the frame counter and the pacing task
//!
//! The engine spawns one pacing task per run. Each tick encodes the current
//! frame into a payload, hands it to the [`Transmitter`], notifies the frame
//! observer and advances the counter. Control calls (`start_sending`, `pause`,
//! `resume`, `stop_sending`, live setters) only touch shared atomics; the task
//! picks changes up on its next tick.
//!
//! ```text
//!  control surface ──► Shared { running, paused, current_frame, target_frame,
//!                               frame_rate, universe, payload_length }
//!                                   │ read per tick
//!                                   ▼
//!                        pacing task ──► Transmitter::send
//!                                   ├──► frame observer (sync callback)
//!                                   └──► watch channel (frame_updates)
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, trace, warn};

use crate::transmitter::Transmitter;
use crate::types::{FRAME_BYTES, TransmissionStatus, write_frame};
use crate::{ConductorError, Result};

/// Poll interval while paused or after reaching the target frame.
pub const IDLE_TICK: Duration = Duration::from_millis(100);

/// How long `stop_sending` waits for the pacing task to exit.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked on the pacing task with every transmitted frame.
///
/// Runs synchronously between ticks and must not block.
pub type FrameObserver = Arc<dyn Fn(u16) + Send + Sync>;

/// Transmitter plus whether it currently holds its output resource
struct Output {
    transmitter: Box<dyn Transmitter>,
    initialized: bool,
}

/// State read by the pacing task and written by control calls
struct Shared {
    running: AtomicBool,
    paused: AtomicBool,
    /// Wide enough to hold `target_frame + 1` once the target is reached
    current_frame: AtomicU32,
    target_frame: AtomicU16,
    frame_rate: AtomicU32,
    universe: AtomicU16,
    payload_length: AtomicUsize,
    observer: Mutex<Option<FrameObserver>>,
    output: AsyncMutex<Output>,
    frames: watch::Sender<u16>,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn observer(&self) -> Option<FrameObserver> {
        self.observer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Publish a transmitted frame to the observer and the watch channel
    fn notify(&self, frame: u16) {
        if let Some(observer) = self.observer() {
            if catch_unwind(AssertUnwindSafe(|| observer(frame))).is_err() {
                error!("Frame observer panicked on frame {}", frame);
            }
        }
        self.frames.send_replace(frame);
    }
}

/// Rate-paced frame counter transmitter
///
/// Created stopped. One pacing task exists at most while running; calling
/// [`start_sending`](Engine::start_sending) on a live run retargets it without
/// resetting the counter.
pub struct Engine {
    shared: Arc<Shared>,
    /// Cached [`Transmitter::is_available`]
    available: bool,
    /// Serializes start/stop and holds the live pacing task
    pacer: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create a stopped engine for `universe` with `payload_length` byte payloads
    pub fn new<T>(universe: u16, payload_length: usize, transmitter: T) -> Self
    where
        T: Transmitter,
    {
        let available = transmitter.is_available();
        if !available {
            warn!("Transmitter library not available - transmission cannot start");
        }

        let (frames, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            current_frame: AtomicU32::new(0),
            target_frame: AtomicU16::new(0),
            frame_rate: AtomicU32::new(30),
            universe: AtomicU16::new(universe),
            payload_length: AtomicUsize::new(payload_length),
            observer: Mutex::new(None),
            output: AsyncMutex::new(Output { transmitter: Box::new(transmitter), initialized: false }),
            frames,
        });

        Self { shared, available, pacer: AsyncMutex::new(None) }
    }

    /// Start (or retarget) transmission, reporting failure as `false`
    ///
    /// See [`try_start_sending`](Engine::try_start_sending).
    pub async fn start_sending(&self, target_frame: u16, frame_rate: u32) -> bool {
        match self.try_start_sending(target_frame, frame_rate).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to start transmission: {}", e);
                false
            }
        }
    }

    /// Start (or retarget) transmission
    ///
    /// Initializes the transmitter if needed, then sets the target and rate and
    /// marks the engine running and unpaused. A new pacing task starting at
    /// frame 0 is spawned only if none is alive; otherwise the live task picks
    /// up the new target on its next tick and keeps its position. The frame
    /// rate of a live task is fixed until the next fresh start.
    ///
    /// # Errors
    ///
    /// - [`ConductorError::InvalidConfig`] for a zero frame rate
    /// - [`ConductorError::TransmitterUnavailable`] if the output resource
    ///   cannot be acquired; the engine stays stopped
    pub async fn try_start_sending(&self, target_frame: u16, frame_rate: u32) -> Result<()> {
        if frame_rate == 0 {
            return Err(ConductorError::invalid_config("frame_rate", frame_rate, "(0, 120]"));
        }

        let mut pacer = self.pacer.lock().await;
        self.ensure_initialized().await?;

        self.shared.target_frame.store(target_frame, Ordering::Release);
        self.shared.frame_rate.store(frame_rate, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        if matches!(&*pacer, Some(task) if !task.is_finished()) {
            info!(
                "Retargeted live transmission: target={}, current={}",
                target_frame,
                self.current_frame()
            );
        } else {
            self.shared.current_frame.store(0, Ordering::Release);
            *pacer = Some(tokio::spawn(pacing_loop(Arc::clone(&self.shared))));
            info!("Started transmission: {} frames at {} fps", target_frame, frame_rate);
        }

        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if !self.available {
            return Err(ConductorError::unavailable("transmitter library is not installed"));
        }

        let mut output = self.shared.output.lock().await;
        if !output.initialized {
            output.transmitter.initialize().await?;
            output.initialized = true;
            debug!("Transmitter initialized");
        }
        Ok(())
    }

    /// Pause transmission; the counter holds its value
    ///
    /// The flag is set even when not running.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        debug!("Transmission paused at frame {}", self.current_frame());
    }

    /// Resume a paused transmission
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        debug!("Transmission resumed at frame {}", self.current_frame());
    }

    /// Stop transmission and reset the counter
    ///
    /// Releases the transmitter best-effort, then waits up to [`JOIN_TIMEOUT`]
    /// for the pacing task to exit. A task that does not exit in time is left
    /// to finish on its own and still counts as live for the next start.
    pub async fn stop_sending(&self) {
        let mut pacer = self.pacer.lock().await;

        self.shared.running.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.current_frame.store(0, Ordering::Release);

        {
            let mut output = self.shared.output.lock().await;
            if output.initialized {
                match output.transmitter.shutdown().await {
                    Ok(()) => {
                        output.initialized = false;
                        debug!("Transmitter released");
                    }
                    Err(e) => warn!("Error releasing transmitter: {}", e),
                }
            }
        }

        if let Some(mut task) = pacer.take() {
            match tokio::time::timeout(JOIN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => debug!("Pacing task joined"),
                Ok(Err(e)) => error!("Pacing task ended abnormally: {}", e),
                Err(_) => {
                    warn!("Pacing task still running: {}", join_timeout_error());
                    *pacer = Some(task);
                }
            }
        }

        // A tick in flight during the reset may have advanced the counter
        self.shared.current_frame.store(0, Ordering::Release);
        info!("Transmission stopped");
    }

    /// Register the frame observer, replacing any previous one
    pub fn set_frame_observer<F>(&self, observer: F)
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        *self.shared.observer.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(observer));
    }

    /// Remove the frame observer
    pub fn clear_frame_observer(&self) {
        *self.shared.observer.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Stream of transmitted frames
    ///
    /// Yields only frames sent after subscription. Slow consumers see the
    /// latest frame, not every frame.
    pub fn frame_updates(&self) -> impl Stream<Item = u16> + 'static {
        WatchStream::from_changes(self.shared.frames.subscribe())
    }

    /// Change the destination universe; applied on the next tick
    pub fn set_universe(&self, universe: u16) {
        self.shared.universe.store(universe, Ordering::Release);
    }

    /// Change the payload length; applied on the next tick
    pub fn set_payload_length(&self, payload_length: usize) {
        self.shared.payload_length.store(payload_length, Ordering::Release);
    }

    /// Next frame to transmit (or `target + 1` once the target was sent)
    pub fn current_frame(&self) -> u32 {
        self.shared.current_frame.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TransmissionStatus {
        TransmissionStatus::from_flags(self.is_running(), self.is_paused())
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn target_frame(&self) -> u16 {
        self.shared.target_frame.load(Ordering::Acquire)
    }

    pub fn frame_rate(&self) -> u32 {
        self.shared.frame_rate.load(Ordering::Acquire)
    }

    pub fn universe(&self) -> u16 {
        self.shared.universe.load(Ordering::Acquire)
    }

    pub fn payload_length(&self) -> usize {
        self.shared.payload_length.load(Ordering::Acquire)
    }

    /// Whether the transmitter's library was present at construction
    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        debug!("Dropping engine");
        // Let a live pacing task exit on its next tick
        self.shared.running.store(false, Ordering::Release);
    }
}

/// Reported when the pacing task outlives [`JOIN_TIMEOUT`]
fn join_timeout_error() -> ConductorError {
    ConductorError::Timeout { duration: JOIN_TIMEOUT }
}

/// Sleep until `deadline`, waking at least every [`IDLE_TICK`] to notice a stop
async fn pace_until(shared: &Shared, deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline || !shared.is_running() {
            return;
        }
        sleep_until(deadline.min(now + IDLE_TICK)).await;
    }
}

/// Pacing task body
///
/// Runs until `running` is observed false. Reaching the target does not end
/// the task; it idles holding `target + 1` so a restart can reuse it.
async fn pacing_loop(shared: Arc<Shared>) {
    let frame_rate = shared.frame_rate.load(Ordering::Acquire).max(1);
    let interval = Duration::from_secs_f64(1.0 / frame_rate as f64);
    info!("Pacing task started ({} fps, {:?} per frame)", frame_rate, interval);

    let mut payload = Vec::new();
    let mut frames_sent = 0u64;
    let mut failure_streak = 0u32;

    while shared.is_running() {
        if shared.paused.load(Ordering::Acquire) {
            pace_until(&shared, Instant::now() + IDLE_TICK).await;
            continue;
        }

        let frame = shared.current_frame.load(Ordering::Acquire);
        if frame > shared.target_frame.load(Ordering::Acquire) as u32 {
            pace_until(&shared, Instant::now() + IDLE_TICK).await;
            continue;
        }

        let tick_started = Instant::now();
        let universe = shared.universe.load(Ordering::Acquire);
        let payload_length = shared.payload_length.load(Ordering::Acquire);
        // frame <= target_frame, so it fits in u16
        let frame = frame as u16;

        payload.clear();
        payload.resize(payload_length.max(FRAME_BYTES), 0);
        write_frame(&mut payload, frame);

        let sent = {
            let mut output = shared.output.lock().await;
            output.transmitter.send(universe, &payload).await
        };

        match sent {
            Ok(()) => {
                if failure_streak > 0 {
                    info!("Transmission recovered after {} failed frames", failure_streak);
                    failure_streak = 0;
                }
                trace!(frame, universe, "Frame sent");
            }
            Err(e) => {
                failure_streak += 1;
                if failure_streak == 1 || failure_streak % 100 == 0 {
                    warn!("Error sending frame {} ({} in a row): {}", frame, failure_streak, e);
                } else {
                    debug!("Error sending frame {}: {}", frame, e);
                }
            }
        }

        if !shared.is_running() {
            break;
        }

        shared.notify(frame);
        frames_sent += 1;

        // Lose the increment rather than overwrite a concurrent reset
        let next = frame as u32 + 1;
        if shared
            .current_frame
            .compare_exchange(frame as u32, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Frame counter changed during tick {}, keeping external value", frame);
        }

        pace_until(&shared, tick_started + interval).await;
    }

    info!("Pacing task ended ({} frames sent)", frames_sent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingTransmitter, init_tracing};
    use crate::transmitters::{MemoryTransmitter, UnavailableTransmitter};
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn engine() -> (Engine, MemoryTransmitter) {
        let transmitter = MemoryTransmitter::new();
        (Engine::new(999, 512, transmitter.clone()), transmitter)
    }

    #[tokio::test]
    async fn stop_on_fresh_engine_leaves_it_stopped() {
        let (engine, transmitter) = engine();
        engine.stop_sending().await;

        assert!(!engine.is_running());
        assert!(!engine.is_paused());
        assert_eq!(engine.current_frame(), 0);
        assert_eq!(engine.status(), TransmissionStatus::Stopped);
        assert_eq!(transmitter.shutdown_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_sends_frame_zero_promptly() {
        init_tracing();
        let (engine, transmitter) = engine();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine.set_frame_observer(move |frame| {
            let _ = tx.send(frame);
        });

        assert!(engine.start_sending(100, 20).await);
        assert!(engine.is_running());
        assert!(!engine.is_paused());
        assert_eq!(engine.status(), TransmissionStatus::Running);

        let first = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("observer should fire within two frame intervals");
        assert_eq!(first, Some(0));

        engine.stop_sending().await;
        let sent = transmitter.sent();
        assert_eq!(sent[0].universe, 999);
        assert_eq!(sent[0].data.len(), 512);
        assert_eq!(sent[0].frame(), Some(0));
    }

    #[tokio::test]
    async fn unavailable_transmitter_keeps_engine_stopped() {
        let engine = Engine::new(1, 24, UnavailableTransmitter::default());
        assert!(!engine.is_available());
        assert!(!engine.start_sending(10, 30).await);
        assert!(!engine.is_running());

        let err = engine.try_start_sending(10, 30).await.unwrap_err();
        assert!(matches!(err, ConductorError::TransmitterUnavailable { .. }));
    }

    #[tokio::test]
    async fn failed_initialize_keeps_engine_stopped() {
        let engine = Engine::new(1, 24, FailingTransmitter::failing_initialize());
        assert!(engine.is_available());
        assert!(!engine.start_sending(10, 30).await);
        assert_eq!(engine.status(), TransmissionStatus::Stopped);
    }

    #[tokio::test]
    async fn zero_frame_rate_is_rejected() {
        let (engine, transmitter) = engine();
        let err = engine.try_start_sending(10, 0).await.unwrap_err();
        assert!(matches!(err, ConductorError::InvalidConfig { .. }));
        assert!(!engine.is_running());
        assert_eq!(transmitter.initialize_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pause_holds_the_counter() {
        let (engine, _transmitter) = engine();
        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(150)).await;

        engine.pause();
        assert_eq!(engine.status(), TransmissionStatus::Paused);
        // Let any in-flight tick settle
        sleep(Duration::from_millis(60)).await;
        let held = engine.current_frame();
        sleep(Duration::from_millis(300)).await;
        assert_eq!(engine.current_frame(), held);

        engine.resume();
        assert_eq!(engine.status(), TransmissionStatus::Running);
        sleep(Duration::from_millis(250)).await;
        assert!(engine.current_frame() > held);

        engine.stop_sending().await;
    }

    #[tokio::test]
    async fn pause_and_resume_set_flags_even_when_stopped() {
        let (engine, _transmitter) = engine();
        engine.pause();
        assert!(engine.is_paused());
        assert_eq!(engine.status(), TransmissionStatus::Stopped);
        engine.resume();
        assert!(!engine.is_paused());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn restart_while_running_keeps_position() {
        let (engine, transmitter) = engine();
        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(200)).await;
        let before = engine.current_frame();
        assert!(before > 0);

        assert!(engine.start_sending(2000, 50).await);
        assert!(engine.current_frame() >= before);
        assert_eq!(engine.target_frame(), 2000);
        assert_eq!(transmitter.initialize_calls(), 1);

        sleep(Duration::from_millis(100)).await;
        engine.stop_sending().await;

        // One pacing task only: frames never repeat
        let frames = transmitter.frames();
        assert!(frames.windows(2).all(|w| w[1] == w[0] + 1), "frames: {:?}", frames);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn idles_after_reaching_target() {
        let (engine, transmitter) = engine();
        assert!(engine.start_sending(3, 100).await);
        sleep(Duration::from_millis(300)).await;

        assert!(engine.is_running(), "reaching the target must not stop the engine");
        assert_eq!(engine.current_frame(), 4);
        assert_eq!(transmitter.frames(), vec![0, 1, 2, 3]);

        engine.stop_sending().await;
        assert_eq!(engine.current_frame(), 0);

        // A fresh start begins again at zero
        transmitter.clear();
        assert!(engine.start_sending(1, 100).await);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(transmitter.frames(), vec![0, 1]);
        engine.stop_sending().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn send_failures_still_advance_the_counter() {
        let engine = Engine::new(5, 24, FailingTransmitter::failing_send());
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        engine.set_frame_observer(move |_| {
            observed.fetch_add(1, Ordering::Relaxed);
        });

        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(200)).await;

        assert!(engine.is_running());
        assert!(engine.current_frame() >= 3);
        assert!(calls.load(Ordering::Relaxed) >= 3);
        engine.stop_sending().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_observer_does_not_kill_the_loop() {
        let (engine, _transmitter) = engine();
        engine.set_frame_observer(|frame| {
            if frame == 1 {
                panic!("observer bug");
            }
        });

        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(200)).await;
        assert!(engine.current_frame() > 2);
        engine.stop_sending().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_setters_apply_on_next_tick() {
        let (engine, transmitter) = engine();
        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(60)).await;

        engine.set_universe(7);
        engine.set_payload_length(24);
        sleep(Duration::from_millis(100)).await;

        let last = transmitter.last().expect("frames were sent");
        assert_eq!(last.universe, 7);
        assert_eq!(last.data.len(), 24);
        engine.stop_sending().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn last_observer_wins() {
        let (engine, _transmitter) = engine();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&first);
        engine.set_frame_observer(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let counter = Arc::clone(&second);
        engine.set_frame_observer(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(100)).await;
        engine.stop_sending().await;

        assert_eq!(first.load(Ordering::Relaxed), 0);
        assert!(second.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn frame_updates_stream_follows_transmission() {
        let (engine, _transmitter) = engine();
        let mut updates = Box::pin(engine.frame_updates());

        assert!(engine.start_sending(1000, 20).await);
        let frame = tokio::time::timeout(Duration::from_millis(200), updates.next())
            .await
            .expect("stream should yield a frame")
            .expect("stream should stay open");
        assert_eq!(frame, 0);
        engine.stop_sending().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_releases_transmitter_and_resets_state() {
        let (engine, transmitter) = engine();
        assert!(engine.start_sending(1000, 50).await);
        engine.pause();
        sleep(Duration::from_millis(50)).await;

        engine.stop_sending().await;
        assert!(!engine.is_running());
        assert!(!engine.is_paused());
        assert_eq!(engine.current_frame(), 0);
        assert_eq!(transmitter.shutdown_calls(), 1);
        assert!(!transmitter.is_initialized());

        assert!(engine.start_sending(10, 50).await);
        assert_eq!(transmitter.initialize_calls(), 2);
        engine.stop_sending().await;
    }

    #[test]
    fn join_timeout_is_reported_as_retryable_timeout() {
        let err = join_timeout_error();
        assert!(matches!(err, ConductorError::Timeout { duration } if duration == JOIN_TIMEOUT));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Operation timed out after 1s");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_release_still_stops() {
        let engine = Engine::new(5, 24, FailingTransmitter::failing_shutdown());
        assert!(engine.start_sending(1000, 50).await);
        sleep(Duration::from_millis(60)).await;

        engine.stop_sending().await;
        assert_eq!(engine.status(), TransmissionStatus::Stopped);
        assert_eq!(engine.current_frame(), 0);

        // Still holding the resource, so a restart skips initialize
        assert!(engine.start_sending(10, 50).await);
        engine.stop_sending().await;
    }
}
