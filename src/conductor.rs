//! Conductor: the owned context tying configuration, engine and progress
//!
//! A [`Conductor`] is what a control surface talks to. It validates control
//! actions against the engine status, keeps a [`Progress`] snapshot current
//! from the engine's frame observer, and persists configuration changes.
//!
//! ```no_run
//! use frame_conductor::{Conductor, ConductorConfig, UpdateRate};
//! use frame_conductor::transmitters::MemoryTransmitter;
//! use futures::StreamExt;
//!
//! # async fn run() -> frame_conductor::Result<()> {
//! let conductor = Conductor::new(ConductorConfig::default(), MemoryTransmitter::new());
//! let mut progress = conductor.progress_updates(UpdateRate::Max(10));
//!
//! conductor.start().await?;
//! while let Some(snapshot) = progress.next().await {
//!     println!("{} {}%", snapshot.status, snapshot.percent);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::config::{ConductorConfig, ConfigStore, ConfigUpdate};
use crate::engine::Engine;
use crate::stream::ThrottleExt;
use crate::transmitter::Transmitter;
use crate::types::{ControlAction, Progress, ProgressStatus, TransmissionStatus, UpdateRate};
use crate::{ConductorError, Result};

/// Control-surface view of the transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConductorState {
    pub state: TransmissionStatus,
    pub available_actions: Vec<ControlAction>,
    pub current_frame: u32,
    pub total_frames: u16,
}

/// Owned transmission context
pub struct Conductor {
    engine: Engine,
    config: watch::Sender<ConductorConfig>,
    progress: Arc<watch::Sender<Progress>>,
    store: Option<ConfigStore>,
}

impl Conductor {
    /// Build a conductor without persistence
    pub fn new<T>(config: ConductorConfig, transmitter: T) -> Self
    where
        T: Transmitter,
    {
        let engine = Engine::new(config.universe, config.frame_length, transmitter);
        let (config_tx, _) = watch::channel(config);
        let (progress, _) = watch::channel(Progress::ready(config.total_frames));

        Self { engine, config: config_tx, progress: Arc::new(progress), store: None }
    }

    /// Build a conductor whose configuration is loaded from and saved to `store`
    pub fn with_store<T>(store: ConfigStore, transmitter: T) -> Self
    where
        T: Transmitter,
    {
        let config = store.load();
        info!("Loaded configuration from {}: {:?}", store.path().display(), config);
        Self { store: Some(store), ..Self::new(config, transmitter) }
    }

    /// Start transmitting from frame 0 with the current configuration
    ///
    /// A run already in progress is stopped first.
    ///
    /// # Errors
    ///
    /// - [`ConductorError::InvalidConfig`] if the configuration is out of range
    /// - [`ConductorError::TransmitterUnavailable`] if the output cannot be
    ///   acquired; progress returns to `Ready`
    pub async fn start(&self) -> Result<()> {
        let config = self.config();
        config.validate()?;

        self.engine.set_universe(config.universe);
        self.engine.set_payload_length(config.frame_length);
        if self.engine.is_running() {
            debug!("Stopping previous run before start");
            self.engine.stop_sending().await;
        }

        let progress = Arc::clone(&self.progress);
        self.engine.set_frame_observer(move |frame| {
            progress.send_modify(|snapshot| *snapshot = snapshot.with_frame(frame as u32));
        });

        self.progress.send_replace(Progress::new(0, config.total_frames, ProgressStatus::Sending));
        if let Err(e) = self.engine.try_start_sending(config.total_frames, config.frame_rate).await {
            self.progress.send_replace(Progress::ready(config.total_frames));
            return Err(e);
        }

        info!(
            "Transmission started: {} frames at {} fps on universe {}",
            config.total_frames, config.frame_rate, config.universe
        );
        Ok(())
    }

    /// Pause a running transmission
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidState`] unless the engine is running and not
    /// paused.
    pub fn pause(&self) -> Result<()> {
        match self.engine.status() {
            TransmissionStatus::Running => {
                self.engine.pause();
                self.set_progress_status(ProgressStatus::Paused);
                Ok(())
            }
            status => Err(ConductorError::invalid_state("pause", status.to_string())),
        }
    }

    /// Resume a paused transmission
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidState`] unless the engine is paused.
    pub fn resume(&self) -> Result<()> {
        match self.engine.status() {
            TransmissionStatus::Paused => {
                self.engine.resume();
                self.set_progress_status(ProgressStatus::Sending);
                Ok(())
            }
            status => Err(ConductorError::invalid_state("resume", status.to_string())),
        }
    }

    /// Play/pause toggle
    ///
    /// Pauses a running transmission, resumes a paused one and starts a
    /// stopped one. Returns the status afterwards.
    pub async fn toggle(&self) -> Result<TransmissionStatus> {
        match self.engine.status() {
            TransmissionStatus::Running => self.pause()?,
            TransmissionStatus::Paused => self.resume()?,
            TransmissionStatus::Stopped => self.start().await?,
        }
        Ok(self.engine.status())
    }

    /// Stop transmission and return progress to `Ready`
    pub async fn reset(&self) {
        self.engine.stop_sending().await;
        self.progress.send_replace(Progress::ready(self.config().total_frames));
        info!("Transmission reset");
    }

    /// Merge `update` into the configuration
    ///
    /// The merged config is validated and, when a store is attached, saved
    /// before it takes effect. A running transmission is stopped so the next
    /// start uses the new settings.
    ///
    /// # Errors
    ///
    /// [`ConductorError::InvalidConfig`] or [`ConductorError::ConfigFile`]; the
    /// previous configuration stays in effect.
    pub async fn apply_config(&self, update: ConfigUpdate) -> Result<ConductorConfig> {
        let config = self.config().apply(&update);
        config.validate()?;

        if let Some(store) = &self.store {
            store.save(&config)?;
        }
        self.config.send_replace(config);

        self.engine.set_universe(config.universe);
        self.engine.set_payload_length(config.frame_length);

        if self.engine.is_running() {
            info!("Configuration changed during transmission, stopping");
            self.engine.stop_sending().await;
            self.progress.send_replace(Progress::ready(config.total_frames));
        } else {
            self.progress.send_modify(|p| *p = p.with_total(config.total_frames));
        }

        info!("Configuration updated: {:?}", config);
        Ok(config)
    }

    pub fn config(&self) -> ConductorConfig {
        *self.config.borrow()
    }

    /// Current status with the actions valid from it
    pub fn state(&self) -> ConductorState {
        let state = self.engine.status();
        ConductorState {
            state,
            available_actions: state.available_actions().to_vec(),
            current_frame: self.engine.current_frame(),
            total_frames: self.config().total_frames,
        }
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    /// Progress snapshots, starting with the current one
    ///
    /// Updates arrive once per transmitted frame; `rate` caps how often they
    /// are delivered (latest wins).
    pub fn progress_updates(&self, rate: UpdateRate) -> BoxStream<'static, Progress> {
        let updates = WatchStream::new(self.progress.subscribe());
        let source_hz = self.config().frame_rate as f64;

        match rate.throttle_interval(source_hz) {
            None => updates.boxed(),
            Some(interval) => updates.throttle(interval).boxed(),
        }
    }

    /// Configuration changes, starting with the current config
    pub fn config_updates(&self) -> BoxStream<'static, ConductorConfig> {
        WatchStream::new(self.config.subscribe()).boxed()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> Option<&ConfigStore> {
        self.store.as_ref()
    }

    /// Stop transmission and detach the progress observer
    pub async fn shutdown(&self) {
        self.engine.stop_sending().await;
        self.engine.clear_frame_observer();
        info!("Conductor shut down");
    }

    fn set_progress_status(&self, status: ProgressStatus) {
        self.progress.send_modify(|p| *p = p.with_status(status));
    }
}
