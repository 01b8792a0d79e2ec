//! # Acquisition Module
//!
//! Periodic fetch-decode-derive-append cycle with pause/resume/stop control.
//!
//! ## Cycle
//!
//! For each configured parameter: encode the request, send it, wait for the
//! matching response (bounded by `response_wait`), decode, and store the
//! measurement in the session's live table. Then derive the secondary
//! metrics from the updated table and append one row to the CSV log.
//!
//! ## Scheduling
//!
//! The first cycle runs as soon as acquisition starts; each later cycle
//! starts `interval` after the previous one finished, so a slow cycle
//! delays the cadence instead of causing catch-up bursts. At most one
//! cycle is in flight: every tick takes the cycle lock and re-checks the
//! state before doing any work.

pub mod state;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::{AcquisitionConfig, ResponseCorrelation};
use crate::error::{ObdLoggerError, Result};
use crate::metrics;
use crate::obd::protocol::{Measurement, ParameterId};
use crate::obd::TelegramCodec;
use crate::obd::decoder::normalize_response;
use crate::serial::correlator::{response_parameter, ResponseCorrelator};
use crate::serial::transport::Transport;
use crate::telemetry::{LogRow, LogWriter, Session, Snapshot, SnapshotStore};
pub use state::{AcquisitionState, Clock, SystemClock};

/// Timing and parameter selection for the acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Delay between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Upper bound on waiting for one parameter's response
    pub response_wait: Duration,
    pub correlation: ResponseCorrelation,
    /// Parameters requested each cycle, in request order
    pub parameters: Vec<ParameterId>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            response_wait: Duration::from_millis(200),
            correlation: ResponseCorrelation::Keyed,
            parameters: ParameterId::ALL.to_vec(),
        }
    }
}

impl AcquisitionSettings {
    /// Build settings from the `[acquisition]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedParameter` if a parameter name is unknown.
    pub fn from_config(config: &AcquisitionConfig) -> Result<Self> {
        let parameters = config
            .parameters
            .iter()
            .map(|name| name.parse())
            .collect::<Result<Vec<ParameterId>>>()?;

        Ok(Self {
            interval: Duration::from_millis(config.interval_ms),
            response_wait: Duration::from_millis(config.response_wait_ms),
            correlation: config.correlation,
            parameters,
        })
    }
}

/// Mutable lifecycle data, guarded by one lock so transitions are atomic
#[derive(Default)]
struct Control {
    state: AcquisitionState,
    /// Incremented whenever the cycle is re-armed; stale ticks see a mismatch
    generation: u64,
    task: Option<JoinHandle<()>>,
    writer: Option<LogWriter>,
}

struct Inner {
    control: Mutex<Control>,
    cycle_lock: tokio::sync::Mutex<()>,
    settings: AcquisitionSettings,
    codec: TelegramCodec,
    transport: Arc<dyn Transport>,
    correlator: Arc<ResponseCorrelator>,
    session: Arc<Session>,
    clock: Arc<dyn Clock>,
    log_dir: PathBuf,
    cycles: AtomicU64,
    rows_written: AtomicU64,
    rows_dropped: AtomicU64,
}

/// Drives the periodic acquisition cycle
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct AcquisitionScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AcquisitionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionScheduler")
            .field("state", &self.state())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl AcquisitionScheduler {
    /// Create an idle scheduler
    ///
    /// Parameters disabled in `codec` are dropped from the request list;
    /// their log columns carry the error sentinel.
    pub fn new(
        mut settings: AcquisitionSettings,
        codec: TelegramCodec,
        transport: Arc<dyn Transport>,
        correlator: Arc<ResponseCorrelator>,
        session: Arc<Session>,
        clock: Arc<dyn Clock>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        settings.parameters.retain(|&p| {
            let enabled = codec.is_enabled(p);
            if !enabled {
                warn!("Parameter {} is disabled and will not be requested", p);
            }
            enabled
        });

        Self {
            inner: Arc::new(Inner {
                control: Mutex::new(Control::default()),
                cycle_lock: tokio::sync::Mutex::new(()),
                settings,
                codec,
                transport,
                correlator,
                session,
                clock,
                log_dir: log_dir.into(),
                cycles: AtomicU64::new(0),
                rows_written: AtomicU64::new(0),
                rows_dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.inner.control().state
    }

    /// Log file of the current or most recent run
    pub fn log_path(&self) -> Option<PathBuf> {
        self.inner.control().writer.as_ref().map(|w| w.path().to_path_buf())
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Completed cycles since creation
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }

    pub fn rows_written(&self) -> u64 {
        self.inner.rows_written.load(Ordering::Relaxed)
    }

    /// Rows lost to log write failures
    pub fn rows_dropped(&self) -> u64 {
        self.inner.rows_dropped.load(Ordering::Relaxed)
    }

    /// Start a new run with a fresh log file; the first cycle runs immediately
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless Idle or Stopped.
    pub fn start(&self) -> Result<()> {
        let mut control = self.inner.control();
        if !control.state.can_start() {
            return Err(invalid(control.state, "start"));
        }

        let writer = LogWriter::in_dir(&self.inner.log_dir, self.inner.clock.now());
        info!("Starting acquisition, logging to {}", writer.path().display());
        control.writer = Some(writer);
        control.state = AcquisitionState::Running;
        self.arm(&mut control);
        Ok(())
    }

    /// Pause after the current cycle; the next tick does nothing
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless Running.
    pub fn pause(&self) -> Result<()> {
        let mut control = self.inner.control();
        if !control.state.can_pause() {
            return Err(invalid(control.state, "pause"));
        }
        control.state = AcquisitionState::Paused;
        info!("Acquisition paused");
        Ok(())
    }

    /// Resume a paused run; a cycle runs immediately and the cadence restarts
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless Paused.
    pub fn resume(&self) -> Result<()> {
        let mut control = self.inner.control();
        if !control.state.can_resume() {
            return Err(invalid(control.state, "resume"));
        }
        control.state = AcquisitionState::Running;
        self.arm(&mut control);
        info!("Acquisition resumed");
        Ok(())
    }

    /// Stop the run and cancel the pending tick
    ///
    /// Does not wait for an in-flight cycle. A cycle that already received
    /// its last response still writes its row. Stopping twice is a no-op.
    pub fn stop(&self) {
        let mut control = self.inner.control();
        if let Some(task) = control.task.take() {
            task.abort();
        }
        if control.state != AcquisitionState::Stopped {
            control.state = AcquisitionState::Stopped;
            control.generation += 1;
            info!(
                "Acquisition stopped after {} cycles ({} rows written, {} dropped)",
                self.cycles_completed(),
                self.rows_written(),
                self.rows_dropped()
            );
        }
    }

    /// Save a snapshot of the session tables into `dir`
    pub fn save_snapshot(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        SnapshotStore::save_to_file(&self.inner.session, dir, self.inner.clock.now())
    }

    /// Replace the session tables from snapshot bytes
    ///
    /// Waits for an in-flight cycle to finish before applying.
    ///
    /// # Errors
    ///
    /// Returns `AcquisitionBusy` while Running (pause or stop first), or
    /// `CorruptSnapshot` in which case the session is left untouched.
    pub async fn restore_snapshot(&self, bytes: &[u8]) -> Result<Snapshot> {
        if self.state() == AcquisitionState::Running {
            return Err(ObdLoggerError::AcquisitionBusy);
        }

        let _cycle = self.inner.cycle_lock.lock().await;
        if self.state() == AcquisitionState::Running {
            return Err(ObdLoggerError::AcquisitionBusy);
        }
        SnapshotStore::restore(&self.inner.session, bytes)
    }

    /// Read a snapshot file and restore it, see [`Self::restore_snapshot`]
    pub async fn load_snapshot_file(&self, path: impl AsRef<Path>) -> Result<Snapshot> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        match self.restore_snapshot(&bytes).await {
            Ok(snapshot) => {
                info!("Loaded snapshot ({} bytes) from {}", bytes.len(), path.display());
                Ok(snapshot)
            }
            Err(e) => {
                error!("Failed to load snapshot {}: {}", path.display(), e);
                Err(e)
            }
        }
    }

    /// Spawn a tick loop for a new generation
    fn arm(&self, control: &mut Control) {
        control.generation += 1;
        let generation = control.generation;
        let inner = Arc::clone(&self.inner);
        // A previous loop notices the generation change and exits on its own
        control.task = Some(tokio::spawn(inner.run(generation)));
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log writer if `generation` is still the live, running one
    fn active_writer(&self, generation: u64) -> Option<LogWriter> {
        let control = self.control();
        if control.state == AcquisitionState::Running && control.generation == generation {
            control.writer.clone()
        } else {
            None
        }
    }

    async fn run(self: Arc<Self>, generation: u64) {
        loop {
            {
                let _cycle = self.cycle_lock.lock().await;
                let Some(writer) = self.active_writer(generation) else {
                    debug!("Tick for generation {} skipped, loop exits", generation);
                    break;
                };
                self.run_cycle(&writer).await;
            }
            sleep(self.settings.interval).await;
        }
    }

    async fn run_cycle(&self, writer: &LogWriter) {
        let timestamp = self.clock.now();

        for &parameter in &self.settings.parameters {
            let measurement = self.acquire(parameter).await;
            if measurement.value.is_error() {
                debug!("{} decoded to error sentinel (raw '{}')", parameter, measurement.raw_text);
            }
            self.session.record(measurement);
        }

        let readings = self.session.live_data().readings();
        let derived = metrics::derive(&readings);
        let row = LogRow::new(timestamp, &readings, derived);

        match writer.append_row(&row) {
            Ok(()) => {
                self.rows_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.rows_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping log row for {}: {}", writer.path().display(), e);
            }
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Request one parameter and decode whatever answers it
    async fn acquire(&self, parameter: ParameterId) -> Measurement {
        let telegram = match self.codec.encode_request(parameter, None) {
            Ok(telegram) => telegram,
            Err(e) => {
                warn!("Cannot request {}: {}", parameter, e);
                return Measurement::decode_error(parameter, "");
            }
        };

        match self.settings.correlation {
            ResponseCorrelation::Keyed => self.acquire_keyed(parameter, &telegram).await,
            ResponseCorrelation::FixedDelay => self.acquire_fixed_delay(parameter, &telegram).await,
        }
    }

    async fn acquire_keyed(&self, parameter: ParameterId, telegram: &str) -> Measurement {
        let pending = self.correlator.expect(parameter);

        if let Err(e) = self.transport.send(telegram).await {
            warn!("Failed to send {}: {}", telegram, e);
            self.correlator.cancel(parameter);
            return Measurement::decode_error(parameter, "");
        }

        match timeout(self.settings.response_wait, pending).await {
            Ok(Ok(response)) => self.codec.decode_response(parameter, &response),
            Ok(Err(_)) | Err(_) => {
                self.correlator.cancel(parameter);
                debug!("No response to {} within {:?}", telegram, self.settings.response_wait);
                Measurement::decode_error(parameter, "")
            }
        }
    }

    /// Wait a fixed time, then take the most recent inbound message
    ///
    /// A message echoing a different PID is left over from an earlier
    /// request and decodes to the error sentinel.
    async fn acquire_fixed_delay(&self, parameter: ParameterId, telegram: &str) -> Measurement {
        if let Err(e) = self.transport.send(telegram).await {
            warn!("Failed to send {}: {}", telegram, e);
            return Measurement::decode_error(parameter, "");
        }

        sleep(self.settings.response_wait).await;

        let Some(response) = self.transport.last_response() else {
            return Measurement::decode_error(parameter, "");
        };
        let text = normalize_response(&response);
        if response_parameter(&text) != Some(parameter) {
            debug!("Last response {} does not answer {}", text, telegram);
            return Measurement::decode_error(parameter, text);
        }
        self.codec.decode_response(parameter, &text)
    }
}

fn invalid(from: AcquisitionState, action: &'static str) -> ObdLoggerError {
    ObdLoggerError::InvalidTransition {
        from: from.to_string(),
        action,
    }
}
