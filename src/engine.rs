//! # Recording Engine Module
//!
//! The session controller, timer/status publisher, and ingest API, tied to
//! the writer thread and the session store. One `RecordingEngine` is
//! instantiated at process start and handed by reference to the command
//! layer and the sampling producers.
//!
//! ## Threads
//! - Caller threads: the control API runs on whichever thread calls it;
//!   `stop()` performs finalization synchronously.
//! - Writer thread: drains filled buffer halves (see `writer`).
//! - Timer thread: wakes once a second, advances elapsed time, enforces the
//!   duration timeout, and publishes best-effort status snapshots.
//!
//! ## Hot-Path Publication Protocol
//! Producers gate on two atomics and nothing else: `recording_active` and
//! `active_mask`. On start the mask is stored before the flag; on stop the
//! flag is cleared before the mask. A producer that loads the flag first and
//! then the mask therefore never observes active with a stale or empty mask.
//!
//! ## Stop/Timeout Race
//! Explicit `stop()` and the timer's duration timeout both funnel into
//! `finalize()`, which re-checks the state under the lifecycle mutex. Only
//! the first caller finds the session in `Recording`; the loser gets
//! `NotRecording` and no second finalization occurs.

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Sender};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::buffer::BufferSet;
use crate::config::{RecordingConfig, Settings};
use crate::error::{ConfigError, StartError, StopError, StorageError};
use crate::header::FileHeader;
use crate::session::{FaultCode, Session, SessionState, StatusSnapshot};
use crate::signal::{
    pack, GsrSample, ImuSample, PpgFingerSample, PpgWristSample, Sample, SignalKind,
};
use crate::store::{SessionIndexRecord, SessionStore};
use crate::writer::{self, WriterCommand};

/// Events published to the external transport (BLE command layer, UI).
#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    /// Periodic and at-finalize session status
    Status(StatusSnapshot),
    /// One stored session, emitted during `list_sessions()`
    SessionIndex(SessionIndexRecord),
}

/// Locks a mutex, recovering the data if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// State shared between the control API, the timer thread, and (via the
/// buffer set and fault cell) the writer thread.
struct EngineInner {
    /// Hot-path gate: producers load this first
    recording_active: AtomicBool,
    /// Hot-path gate: bits of the signals being recorded
    active_mask: AtomicU8,
    buffers: Arc<BufferSet>,
    /// Raised by the writer on mid-session write failures
    fault: Arc<AtomicU8>,
    /// Session metadata; read by `get_status()`, ticked by the timer
    session: Mutex<Session>,
    /// Transition guard. Holds the staged configuration, consumed by
    /// `start()`; a fresh `configure()` is mandatory for every session.
    lifecycle: Mutex<Option<RecordingConfig>>,
    writer_tx: Sender<WriterCommand>,
    events: Sender<EngineEvent>,
    store: SessionStore,
    settings: Settings,
}

impl EngineInner {
    fn configure(&self, config: RecordingConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let mut staged = lock(&self.lifecycle);
        {
            let mut session = lock(&self.session);
            match session.state {
                SessionState::Recording | SessionState::Finalizing => {
                    return Err(ConfigError::RecordingActive);
                }
                // Error recovers here; re-arming replaces a staged config
                SessionState::Idle | SessionState::Armed | SessionState::Error => {}
            }
            *session = Session {
                state: SessionState::Armed,
                duration_s: config.duration_s,
                signal_mask: config.signal_mask,
                ..Session::default()
            };
        }
        self.fault.store(FaultCode::None.as_u8(), Ordering::Release);
        *staged = Some(config);

        log::info!(
            "Configured: {} s, mask {:#04x}, decimation {}",
            config.duration_s,
            config.signal_mask.bits(),
            config.decimation()
        );
        Ok(())
    }

    fn start(&self) -> Result<(), StartError> {
        let mut staged = lock(&self.lifecycle);
        {
            let session = lock(&self.session);
            match session.state {
                SessionState::Armed => {}
                SessionState::Recording | SessionState::Finalizing => {
                    return Err(StartError::AlreadyRecording);
                }
                SessionState::Idle | SessionState::Error => {
                    return Err(StartError::NotConfigured);
                }
            }
        }
        let config = staged.take().ok_or(StartError::NotConfigured)?;
        let start_timestamp = Utc::now().timestamp();

        let files = match self.open_session_files(&config, start_timestamp) {
            Ok(files) => files,
            Err(e) => {
                let fault = match &e {
                    StorageError::DirCreate(_) | StorageError::FileCreate(_) => {
                        FaultCode::FileCreate
                    }
                    _ => FaultCode::FileWrite,
                };
                let mut session = lock(&self.session);
                session.state = SessionState::Error;
                session.fault = fault;
                log::error!("Failed to start recording: {}", e);
                return Err(StartError::Storage(e));
            }
        };

        for kind in SignalKind::ALL {
            self.buffers.get(kind).reset();
        }
        if self.writer_tx.send(WriterCommand::Begin { files }).is_err() {
            log::error!("Writer thread unavailable");
        }

        {
            let mut session = lock(&self.session);
            session.state = SessionState::Recording;
            session.start_timestamp = start_timestamp;
            session.elapsed_s = 0;
            session.samples_written = 0;
        }
        // Mask before flag: a producer that sees active=true also sees the
        // session's mask, never a stale or empty one
        self.active_mask
            .store(config.signal_mask.bits(), Ordering::Release);
        self.recording_active.store(true, Ordering::Release);

        log::info!("Recording started: session {}", start_timestamp);
        Ok(())
    }

    /// Creates the session directory and one header-stamped file per enabled
    /// signal. On any failure the partially built `files` vector is dropped,
    /// closing every handle opened so far.
    fn open_session_files(
        &self,
        config: &RecordingConfig,
        start_timestamp: i64,
    ) -> Result<Vec<(SignalKind, File)>, StorageError> {
        let dir = self.store.create_session_dir(start_timestamp)?;
        let mut files = Vec::new();
        for kind in config.signal_mask.iter() {
            let mut file =
                File::create(dir.join(kind.file_name())).map_err(StorageError::FileCreate)?;
            file.write_all(&FileHeader::new(kind, start_timestamp).encode())
                .map_err(StorageError::FileWrite)?;
            files.push((kind, file));
        }
        Ok(files)
    }

    /// The single finalization path, shared by explicit `stop()`, the
    /// duration timeout, and engine teardown.
    fn finalize(&self) -> Result<(), StopError> {
        let _staged = lock(&self.lifecycle);
        {
            let mut session = lock(&self.session);
            if session.state != SessionState::Recording {
                return Err(StopError::NotRecording);
            }
            session.state = SessionState::Finalizing;
        }
        // Flag before mask: producers go quiet at FINALIZING entry, before
        // any filesystem work begins
        self.recording_active.store(false, Ordering::Release);
        self.active_mask.store(0, Ordering::Release);

        let (reply_tx, reply_rx) = bounded(1);
        let outcome = if self
            .writer_tx
            .send(WriterCommand::Finalize { reply: reply_tx })
            .is_ok()
        {
            reply_rx.recv().unwrap_or_else(|_| {
                Err(StorageError::FileWrite(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "writer thread unavailable",
                )))
            })
        } else {
            Err(StorageError::FileWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writer thread unavailable",
            )))
        };

        let snapshot;
        let result = match outcome {
            Ok(report) => {
                let mut session = lock(&self.session);
                session.samples_written = report.total_samples();
                session.end_timestamp = Utc::now().timestamp();
                session.state = SessionState::Idle;
                snapshot = StatusSnapshot::from_session(&session, false);
                log::info!(
                    "Recording finalized: session {}, {} samples",
                    session.start_timestamp,
                    session.samples_written
                );
                Ok(())
            }
            Err(e) => {
                let mut session = lock(&self.session);
                session.state = SessionState::Error;
                session.fault = FaultCode::FileWrite;
                snapshot = StatusSnapshot::from_session(&session, false);
                log::error!("Failed to finalize recording: {}", e);
                Err(StopError::Storage(e))
            }
        };
        // One extra broadcast at finalize, same best-effort policy as ticks
        let _ = self.events.try_send(EngineEvent::Status(snapshot));
        result
    }

    /// Aborts a recording session after the writer raised a fault. Files are
    /// still closed through the writer's finalize path; the session lands in
    /// `Error` rather than `Idle`.
    fn abort(&self, fault: FaultCode) {
        let _staged = lock(&self.lifecycle);
        {
            let mut session = lock(&self.session);
            if session.state != SessionState::Recording {
                return;
            }
            session.state = SessionState::Finalizing;
        }
        self.recording_active.store(false, Ordering::Release);
        self.active_mask.store(0, Ordering::Release);

        let (reply_tx, reply_rx) = bounded(1);
        if self
            .writer_tx
            .send(WriterCommand::Finalize { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.recv();
        }

        let snapshot = {
            let mut session = lock(&self.session);
            session.state = SessionState::Error;
            session.fault = fault;
            session.end_timestamp = Utc::now().timestamp();
            StatusSnapshot::from_session(&session, false)
        };
        let _ = self.events.try_send(EngineEvent::Status(snapshot));
        log::error!("Recording aborted: {:?}", fault);
    }

    /// One timer beat: fault check, elapsed-time advance, timeout
    /// enforcement, best-effort status publish. Never blocks.
    fn tick(&self) {
        let fault = FaultCode::from_u8(self.fault.load(Ordering::Acquire));
        if fault != FaultCode::None {
            self.fault.store(FaultCode::None.as_u8(), Ordering::Release);
            self.abort(fault);
            return;
        }

        let (timed_out, snapshot) = {
            let mut session = lock(&self.session);
            if session.state != SessionState::Recording {
                return;
            }
            session.elapsed_s += 1;
            session.samples_written = session
                .signal_mask
                .iter()
                .map(|kind| self.buffers.get(kind).submitted())
                .sum();
            (
                session.elapsed_s >= u32::from(session.duration_s),
                StatusSnapshot::from_session(&session, true),
            )
        };

        if timed_out {
            log::info!("Recording duration reached");
            match self.finalize() {
                Ok(()) => {}
                // An explicit stop() won the race this tick
                Err(StopError::NotRecording) => {}
                Err(StopError::Storage(e)) => log::error!("Timeout finalize failed: {}", e),
            }
        } else if self.events.try_send(EngineEvent::Status(snapshot)).is_err() {
            log::debug!("Status consumer behind; snapshot dropped");
        }
    }

    fn get_status(&self) -> StatusSnapshot {
        let session = lock(&self.session);
        StatusSnapshot::from_session(&session, self.recording_active.load(Ordering::Acquire))
    }

    /// Producer-side submission. The two atomic loads up front are the
    /// entire cost when the signal is not being recorded.
    fn submit<S: Sample>(&self, kind: SignalKind, samples: &[S]) {
        if !self.recording_active.load(Ordering::Acquire) {
            return;
        }
        if self.active_mask.load(Ordering::Acquire) & kind.bit() == 0 {
            return;
        }
        if samples.is_empty() {
            return;
        }

        let payload = pack(samples);
        let result = self
            .buffers
            .get(kind)
            .push_samples(kind.sample_size(), &payload);
        if result.flush.is_some() {
            // Counting signal to the writer; unbounded send never blocks
            if self.writer_tx.send(WriterCommand::Flush).is_err() {
                log::error!("Writer thread unavailable");
            }
        }
        if result.dropped > 0 {
            log::warn!(
                "{:?}: writer behind, dropped {} samples ({} total)",
                kind,
                result.dropped,
                self.buffers.get(kind).dropped()
            );
        }
    }
}

/// The recording engine: owns the writer and timer threads and all session
/// state. Construct one per process; drop joins both threads.
pub struct RecordingEngine {
    inner: Arc<EngineInner>,
    writer_thread: Option<thread::JoinHandle<()>>,
    timer_thread: Option<thread::JoinHandle<()>>,
    timer_shutdown: Sender<()>,
}

impl RecordingEngine {
    /// Builds the engine and spawns its writer and timer threads. `events`
    /// is the bounded outbound channel to the external transport; status
    /// snapshots are dropped rather than waited on when it is full.
    pub fn new(settings: Settings, events: Sender<EngineEvent>) -> Self {
        let buffers = Arc::new(BufferSet::new(settings.buffer_half_bytes));
        let fault = Arc::new(AtomicU8::new(FaultCode::None.as_u8()));
        let (writer_tx, writer_rx) = unbounded();
        let writer_thread = writer::spawn(writer_rx, buffers.clone(), fault.clone());

        let store = SessionStore::new(settings.storage_dir.clone());
        let inner = Arc::new(EngineInner {
            recording_active: AtomicBool::new(false),
            active_mask: AtomicU8::new(0),
            buffers,
            fault,
            session: Mutex::new(Session::default()),
            lifecycle: Mutex::new(None),
            writer_tx,
            events,
            store,
            settings,
        });

        let (timer_shutdown, shutdown_rx) = bounded(1);
        let timer_inner = inner.clone();
        let timer_thread = thread::spawn(move || {
            let ticker = crossbeam_channel::tick(Duration::from_secs(1));
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => timer_inner.tick(),
                    recv(shutdown_rx) -> _ => break,
                }
            }
            log::debug!("Timer thread stopped");
        });

        RecordingEngine {
            inner,
            writer_thread: Some(writer_thread),
            timer_thread: Some(timer_thread),
            timer_shutdown,
        }
    }

    // --- Control API ---

    /// Validates and stages a session configuration: IDLE/ERROR -> ARMED.
    /// Rejected while a session is recording or finalizing.
    pub fn configure(&self, config: RecordingConfig) -> Result<(), ConfigError> {
        self.inner.configure(config)
    }

    /// ARMED -> RECORDING. Creates the session directory and per-signal
    /// files, writes headers, then publishes the producer gate.
    pub fn start(&self) -> Result<(), StartError> {
        self.inner.start()
    }

    /// RECORDING -> FINALIZING -> IDLE, synchronously. The second of two
    /// racing stops (explicit or timeout) gets `NotRecording`.
    pub fn stop(&self) -> Result<(), StopError> {
        self.inner.finalize()
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.inner.get_status()
    }

    pub fn is_active(&self) -> bool {
        self.inner.recording_active.load(Ordering::Acquire)
    }

    /// Emits one `SessionIndex` event per stored session, paced by the
    /// configured inter-record delay. Returns the number of sessions found.
    pub fn list_sessions(&self) -> usize {
        let records = self.inner.store.scan();
        let count = records.len();
        let delay = Duration::from_millis(self.inner.settings.index_delay_ms);
        for record in records {
            let event = EngineEvent::SessionIndex(record);
            if self
                .inner
                .events
                .send_timeout(event, Duration::from_millis(250))
                .is_err()
            {
                log::warn!("Event consumer not keeping up; session listing cut short");
                break;
            }
            thread::sleep(delay);
        }
        count
    }

    pub fn delete_session(&self, timestamp: i64) -> Result<(), StorageError> {
        self.inner.store.delete_session(timestamp)
    }

    pub fn wipe_all(&self) -> Result<usize, StorageError> {
        self.inner.store.wipe_all()
    }

    pub fn storage_usage_bytes(&self) -> u64 {
        self.inner.store.total_usage_bytes()
    }

    // --- Ingest API (one entry point per signal kind) ---

    pub fn submit_ppg_wrist(&self, samples: &[PpgWristSample]) {
        self.inner.submit(SignalKind::PpgWrist, samples);
    }

    pub fn submit_ppg_finger(&self, samples: &[PpgFingerSample]) {
        self.inner.submit(SignalKind::PpgFinger, samples);
    }

    pub fn submit_imu_accel(&self, samples: &[ImuSample]) {
        self.inner.submit(SignalKind::ImuAccel, samples);
    }

    pub fn submit_imu_gyro(&self, samples: &[ImuSample]) {
        self.inner.submit(SignalKind::ImuGyro, samples);
    }

    pub fn submit_gsr(&self, samples: &[GsrSample]) {
        self.inner.submit(SignalKind::Gsr, samples);
    }
}

impl Drop for RecordingEngine {
    fn drop(&mut self) {
        // Finalize any session still running so its files are not left with
        // placeholder headers
        let _ = self.inner.finalize();

        let _ = self.timer_shutdown.try_send(());
        let _ = self.inner.writer_tx.send(WriterCommand::Shutdown);

        if let Some(handle) = self.timer_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }
}
