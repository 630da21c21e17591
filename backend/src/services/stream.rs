//! Stream service: supervises the single live transcoder process.
//!
//! The supervisor owns at most one [StreamJob]. A job is created by
//! [start_stream](StreamSupervisor::start_stream), promoted to `Running` once
//! the grace period elapses with the process still alive, and torn down by
//! [stop_stream](StreamSupervisor::stop_stream), by a newer start, or by the
//! process exiting on its own.
//!
//! Each transcoder process is owned by a watcher task. The job only holds a
//! [ProcessHandle]: the pid and the sending half of a one-shot terminate
//! channel. Dropping the handle terminates the process, and every path that
//! leaves `Starting`/`Running` goes through [StreamJob::retire], so a handle
//! can never outlive its state. Exit reports carry the job generation and are
//! ignored when a newer job has taken the slot.
//!
//! There is no structured "ready" signal from ffmpeg. Readiness is inferred
//! from elapsed time, so a slow upstream can be reported `Running` before the
//! first segment exists; [status](StreamSupervisor::status) reports playlist
//! existence separately for callers that need to poll.
//!
//! Superseding a job signals its process without waiting for it to exit. A
//! process finalizing on SIGTERM can rewrite `stream.m3u8` after the new
//! start has purged the directory; the new transcoder overwrites it with its
//! own playlist on its first segment.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::services::ffmpeg::{FfmpegService, HlsSettings};
use crate::services::manager::{Service, ServiceHealth};
use crate::services::segments::{PLAYLIST_FILE, SegmentDirectory};

/// Number of stderr lines kept for failure reports.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// How long a terminated process gets before it is killed outright.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded wait for the output readers after the process exits.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of the stream job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Idle,
    Starting,
    Running,
    Failed,
    Stopping,
}

impl StreamState {
    /// Whether a live process handle belongs to this state.
    pub fn has_process(self) -> bool {
        matches!(self, StreamState::Starting | StreamState::Running)
    }
}

/// Failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamErrorKind {
    InvalidSource,
    CapabilityUnavailable,
    ProcessStartFailure,
    ProcessRuntimeFailure,
    Superseded,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("source address must not be empty")]
    InvalidSource,

    #[error("ffmpeg cannot be executed in this environment")]
    CapabilityUnavailable,

    #[error("transcoder failed to start: {reason}")]
    ProcessStartFailure {
        reason: String,
        exit_code: Option<i32>,
        diagnostics: Vec<String>,
    },

    #[error("transcoder exited while streaming: {reason}")]
    ProcessRuntimeFailure {
        reason: String,
        exit_code: Option<i32>,
        diagnostics: Vec<String>,
    },

    #[error("stream start was superseded by a newer start or stop request")]
    Superseded,
}

impl StreamError {
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::InvalidSource => StreamErrorKind::InvalidSource,
            StreamError::CapabilityUnavailable => StreamErrorKind::CapabilityUnavailable,
            StreamError::ProcessStartFailure { .. } => StreamErrorKind::ProcessStartFailure,
            StreamError::ProcessRuntimeFailure { .. } => StreamErrorKind::ProcessRuntimeFailure,
            StreamError::Superseded => StreamErrorKind::Superseded,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StreamError::ProcessStartFailure { exit_code, .. }
            | StreamError::ProcessRuntimeFailure { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> &[String] {
        match self {
            StreamError::ProcessStartFailure { diagnostics, .. }
            | StreamError::ProcessRuntimeFailure { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

/// Recorded failure of a job left in `Failed`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFailure {
    pub error_kind: StreamErrorKind,
    pub message: String,
    pub exit_code: Option<i32>,
    pub diagnostics: Vec<String>,
    pub failed_at: DateTime<Utc>,
}

impl StreamFailure {
    fn new(error_kind: StreamErrorKind, message: String, exit_code: Option<i32>, diagnostics: Vec<String>) -> Self {
        Self {
            error_kind,
            message,
            exit_code,
            diagnostics,
            failed_at: Utc::now(),
        }
    }

    /// Convert back into the error returned to a caller.
    pub fn to_error(&self) -> StreamError {
        match self.error_kind {
            StreamErrorKind::ProcessRuntimeFailure => StreamError::ProcessRuntimeFailure {
                reason: self.message.clone(),
                exit_code: self.exit_code,
                diagnostics: self.diagnostics.clone(),
            },
            _ => StreamError::ProcessStartFailure {
                reason: self.message.clone(),
                exit_code: self.exit_code,
                diagnostics: self.diagnostics.clone(),
            },
        }
    }
}

/// Successful start result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedStream {
    pub playlist_url: String,
    pub source_address: String,
    pub started_at: DateTime<Utc>,
}

/// Result of a stop request. Stop never fails.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAck {
    /// Whether a job record existed when stop was called
    pub stopped_job: bool,
    pub removed_files: usize,
}

/// Point-in-time view of the supervisor.
///
/// `is_running` comes from memory, `hls_available` from the filesystem. They
/// are read separately and may disagree briefly; treat disagreement as
/// "poll again".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    pub is_running: bool,
    pub hls_available: bool,
    pub hls_url: Option<String>,
    pub source_address: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub has_capability: bool,
    pub state: StreamState,
    pub last_failure: Option<StreamFailure>,
}

/// Exclusive handle to a live transcoder, held by the job.
struct ProcessHandle {
    pid: Option<u32>,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Ask the watcher to terminate the process. Does not wait for exit.
    fn terminate(mut self) {
        if let Some(tx) = self.terminate_tx.take() {
            // Receiver is gone once the process has already exited
            let _ = tx.send(());
        }
    }
}

type DiagnosticTail = Arc<Mutex<VecDeque<String>>>;

struct StreamJob {
    generation: u64,
    source_address: String,
    state: StreamState,
    started_at: DateTime<Utc>,
    process: Option<ProcessHandle>,
    failure: Option<StreamFailure>,
}

impl StreamJob {
    /// The only way out of `Starting`/`Running`: releases the process handle
    /// (signalling the process if it is still alive) and moves to `next`.
    fn retire(&mut self, next: StreamState) {
        debug_assert!(!next.has_process());
        if let Some(handle) = self.process.take() {
            debug!(
                service = "stream",
                generation = self.generation,
                pid = ?handle.pid,
                "Releasing transcoder process"
            );
            handle.terminate();
        }
        self.state = next;
    }
}

/// What an exit report did to the job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitOutcome {
    /// A newer job owns the slot, or the job was already retired
    Ignored,
    StartFailed,
    RuntimeFailed,
    Finished,
}

#[derive(Default)]
struct SupervisorState {
    job: Option<StreamJob>,
    last_generation: u64,
}

impl SupervisorState {
    fn current_state(&self) -> StreamState {
        self.job.as_ref().map(|j| j.state).unwrap_or(StreamState::Idle)
    }

    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }

    /// Remove the current job, releasing its process.
    fn clear(&mut self) -> Option<StreamJob> {
        let mut job = self.job.take()?;
        job.retire(StreamState::Idle);
        Some(job)
    }

    /// `Starting` -> `Running` once the grace period has elapsed for
    /// `generation`. Any other state yields the error the starter sees.
    fn promote(&mut self, generation: u64, playlist_url: &str) -> Result<StartedStream, StreamError> {
        let Some(job) = self.job.as_mut().filter(|j| j.generation == generation) else {
            return Err(StreamError::Superseded);
        };

        match job.state {
            StreamState::Starting => {
                job.state = StreamState::Running;
                Ok(StartedStream {
                    playlist_url: playlist_url.to_string(),
                    source_address: job.source_address.clone(),
                    started_at: job.started_at,
                })
            }
            StreamState::Failed => Err(job
                .failure
                .as_ref()
                .map(StreamFailure::to_error)
                .unwrap_or(StreamError::ProcessStartFailure {
                    reason: "transcoder exited during startup".to_string(),
                    exit_code: None,
                    diagnostics: Vec::new(),
                })),
            StreamState::Idle | StreamState::Running | StreamState::Stopping => {
                Err(StreamError::Superseded)
            }
        }
    }

    fn on_process_exit(
        &mut self,
        generation: u64,
        exit_code: Option<i32>,
        success: bool,
        diagnostics: Vec<String>,
    ) -> ExitOutcome {
        let Some(job) = self.job.as_mut() else {
            return ExitOutcome::Ignored;
        };
        if job.generation != generation {
            return ExitOutcome::Ignored;
        }

        let current = job.state;
        match current {
            StreamState::Starting => {
                job.failure = Some(StreamFailure::new(
                    StreamErrorKind::ProcessStartFailure,
                    format!("transcoder exited before the grace period elapsed ({})", describe_exit(exit_code)),
                    exit_code,
                    diagnostics,
                ));
                job.retire(StreamState::Failed);
                ExitOutcome::StartFailed
            }
            StreamState::Running if success => {
                self.clear();
                ExitOutcome::Finished
            }
            StreamState::Running => {
                job.failure = Some(StreamFailure::new(
                    StreamErrorKind::ProcessRuntimeFailure,
                    format!("transcoder exited while streaming ({})", describe_exit(exit_code)),
                    exit_code,
                    diagnostics,
                ));
                job.retire(StreamState::Failed);
                ExitOutcome::RuntimeFailed
            }
            StreamState::Idle | StreamState::Failed | StreamState::Stopping => ExitOutcome::Ignored,
        }
    }
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Configuration for the stream service.
#[derive(Debug, Clone)]
pub struct StreamServiceConfig {
    pub ffmpeg_path: String,
    pub hls_dir: PathBuf,
    /// Public URL of the playlist returned to callers
    pub playlist_url: String,
    pub grace_period: Duration,
    pub probe_timeout: Duration,
    pub hls: HlsSettings,
}

impl StreamServiceConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            hls_dir: config.hls_dir.clone(),
            playlist_url: format!(
                "{}{}/{}",
                config.public_base_url(),
                config.hls_public_path,
                PLAYLIST_FILE
            ),
            grace_period: config.grace_period,
            probe_timeout: config.probe_timeout,
            hls: HlsSettings {
                segment_seconds: config.segment_seconds,
                playlist_size: config.playlist_size,
            },
        }
    }
}

/// Owns the transcoder process and the segment directory.
pub struct StreamSupervisor {
    config: StreamServiceConfig,
    ffmpeg: FfmpegService,
    segments: SegmentDirectory,
    /// Set once by the availability probe, never re-probed
    capability: OnceCell<bool>,
    state: Arc<Mutex<SupervisorState>>,
}

impl StreamSupervisor {
    pub fn new(config: StreamServiceConfig) -> Self {
        Self {
            ffmpeg: FfmpegService::with_ffmpeg_path(config.ffmpeg_path.clone()),
            segments: SegmentDirectory::new(config.hls_dir.clone()),
            capability: OnceCell::new(),
            state: Arc::new(Mutex::new(SupervisorState::default())),
            config,
        }
    }

    pub fn segments(&self) -> &SegmentDirectory {
        &self.segments
    }

    /// Run the availability probe if it has not run yet and cache the result.
    pub async fn probe_capability(&self) -> bool {
        if let Some(available) = self.capability.get() {
            return *available;
        }
        let available = self.ffmpeg.probe_capability(self.config.probe_timeout).await;
        *self.capability.get_or_init(|| available)
    }

    /// Capability flag; false until the probe has run.
    pub fn has_capability(&self) -> bool {
        self.capability.get().copied().unwrap_or(false)
    }

    pub fn state(&self) -> StreamState {
        self.state.lock().current_state()
    }

    /// Start transcoding `source_address` into the segment directory.
    ///
    /// Returns after the grace period. Any existing job is superseded: its
    /// process is signalled (not awaited) and stale artifacts are purged.
    pub async fn start_stream(&self, source_address: &str) -> Result<StartedStream, StreamError> {
        let source = source_address.trim();
        if source.is_empty() {
            return Err(StreamError::InvalidSource);
        }
        if !self.has_capability() {
            debug!(service = "stream", "Start rejected: ffmpeg unavailable");
            return Err(StreamError::CapabilityUnavailable);
        }

        let previous = self.state.lock().clear();
        if let Some(previous) = previous {
            info!(
                service = "stream",
                generation = previous.generation,
                source = %previous.source_address,
                "Superseding previous stream"
            );
        }

        self.segments.purge().await;
        if let Err(e) = self.segments.ensure().await {
            return Err(self.record_start_failure(source, format!("{:#}", e), None));
        }

        let mut command = self
            .ffmpeg
            .live_hls_command(source, &self.segments, self.config.hls);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(service = "stream", error = %e, "Failed to spawn transcoder");
                return Err(self.record_start_failure(
                    source,
                    format!("failed to spawn {}: {}", self.ffmpeg.ffmpeg_path(), e),
                    None,
                ));
            }
        };

        let pid = child.id();
        let started_at = Utc::now();
        let diagnostics: DiagnosticTail =
            Arc::new(Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES)));
        let (terminate_tx, terminate_rx) = oneshot::channel();

        let generation = {
            let mut state = self.state.lock();
            // A concurrent start may have filled the slot while we were spawning
            state.clear();
            let generation = state.next_generation();
            state.job = Some(StreamJob {
                generation,
                source_address: source.to_string(),
                state: StreamState::Starting,
                started_at,
                process: Some(ProcessHandle {
                    pid,
                    terminate_tx: Some(terminate_tx),
                }),
                failure: None,
            });
            generation
        };

        info!(
            service = "stream",
            generation,
            pid = ?pid,
            source = %source,
            "Transcoder spawned"
        );

        tokio::spawn(watch_process(
            self.state.clone(),
            generation,
            child,
            terminate_rx,
            diagnostics,
        ));

        // Promotion runs on its own task; a cancelled caller must not leave
        // the job in `Starting`.
        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(promote_after_grace(
            self.state.clone(),
            generation,
            self.config.grace_period,
            self.config.playlist_url.clone(),
            outcome_tx,
        ));

        outcome_rx.await.unwrap_or(Err(StreamError::Superseded))
    }

    /// Leave a `Failed` record for a start that never got a process.
    fn record_start_failure(&self, source: &str, reason: String, exit_code: Option<i32>) -> StreamError {
        let failure = StreamFailure::new(
            StreamErrorKind::ProcessStartFailure,
            reason,
            exit_code,
            Vec::new(),
        );
        let error = failure.to_error();

        let mut state = self.state.lock();
        state.clear();
        let generation = state.next_generation();
        state.job = Some(StreamJob {
            generation,
            source_address: source.to_string(),
            state: StreamState::Failed,
            started_at: Utc::now(),
            process: None,
            failure: Some(failure),
        });
        error
    }

    /// Stop the current job (if any) and purge the segment directory.
    ///
    /// Idempotent. The process is signalled but not awaited.
    pub async fn stop_stream(&self) -> StopAck {
        let stopping = {
            let mut state = self.state.lock();
            state.job.as_mut().map(|job| {
                let previous = job.state;
                job.retire(StreamState::Stopping);
                info!(
                    service = "stream",
                    generation = job.generation,
                    previous_state = ?previous,
                    "Stopping stream"
                );
                job.generation
            })
        };

        let report = self.segments.purge().await;

        if let Some(generation) = stopping {
            let mut state = self.state.lock();
            if state.job.as_ref().is_some_and(|j| j.generation == generation) {
                state.clear();
            }
        }

        StopAck {
            stopped_job: stopping.is_some(),
            removed_files: report.removed,
        }
    }

    /// Consistent read of in-memory state plus a fresh playlist check.
    pub async fn status(&self) -> StreamStatus {
        let (state, source_address, started_at, last_failure) = {
            let guard = self.state.lock();
            match guard.job.as_ref() {
                Some(job) => (
                    job.state,
                    Some(job.source_address.clone()),
                    Some(job.started_at),
                    job.failure.clone(),
                ),
                None => (StreamState::Idle, None, None, None),
            }
        };

        let hls_available = self.segments.playlist_exists().await;
        let is_running = state.has_process();

        StreamStatus {
            is_running,
            hls_available,
            hls_url: is_running.then(|| self.config.playlist_url.clone()),
            source_address,
            started_at,
            has_capability: self.has_capability(),
            state,
            last_failure,
        }
    }
}

#[async_trait]
impl Service for StreamSupervisor {
    fn name(&self) -> &str {
        "stream"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "stream", "Stream service starting");
        self.segments.ensure().await?;

        let report = self.segments.purge().await;
        if report.removed > 0 {
            info!(
                service = "stream",
                removed = report.removed,
                "Removed stale stream artifacts"
            );
        }

        let available = self.probe_capability().await;
        if !available {
            warn!(
                service = "stream",
                ffmpeg = %self.config.ffmpeg_path,
                "ffmpeg unavailable; stream start requests will be rejected"
            );
        }
        info!(
            service = "stream",
            capability = available,
            hls_dir = %self.segments.root().display(),
            "Stream service started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_stream().await;
        info!(service = "stream", "Stream service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        if !self.has_capability() {
            return Ok(ServiceHealth::degraded("ffmpeg unavailable; streaming disabled"));
        }
        let failure = self
            .state
            .lock()
            .job
            .as_ref()
            .and_then(|j| j.failure.as_ref().map(|f| f.message.clone()));
        match failure {
            Some(message) => Ok(ServiceHealth::degraded(message)),
            None => Ok(ServiceHealth::healthy()),
        }
    }
}

/// Waits out the grace period, promotes the job and reports the outcome to
/// the starter if it is still listening.
async fn promote_after_grace(
    state: Arc<Mutex<SupervisorState>>,
    generation: u64,
    grace_period: Duration,
    playlist_url: String,
    outcome_tx: oneshot::Sender<Result<StartedStream, StreamError>>,
) {
    tokio::time::sleep(grace_period).await;

    let outcome = state.lock().promote(generation, &playlist_url);
    match &outcome {
        Ok(_) => info!(service = "stream", generation, "Stream running"),
        Err(e) => debug!(service = "stream", generation, error = %e, "Stream not promoted"),
    }
    // Receiver is gone when the starter was cancelled
    let _ = outcome_tx.send(outcome);
}

/// Owns `child` until it exits, terminating it on request, then reports the
/// exit to the supervisor.
async fn watch_process(
    state: Arc<Mutex<SupervisorState>>,
    generation: u64,
    mut child: Child,
    mut terminate_rx: oneshot::Receiver<()>,
    diagnostics: DiagnosticTail,
) {
    let readers = [
        child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain_output(out, generation, "stdout", None))),
        child
            .stderr
            .take()
            .map(|err| tokio::spawn(drain_output(err, generation, "stderr", Some(diagnostics.clone())))),
    ];

    let status = tokio::select! {
        status = child.wait() => status,
        // Fires on an explicit terminate and when the handle is dropped
        _ = &mut terminate_rx => {
            send_terminate(&mut child, generation);
            match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(service = "stream", generation, "Transcoder ignored terminate, killing");
                    let _ = child.start_kill();
                    child.wait().await
                }
            }
        }
    };

    for reader in readers.into_iter().flatten() {
        let abort = reader.abort_handle();
        if tokio::time::timeout(READER_JOIN_TIMEOUT, reader).await.is_err() {
            abort.abort();
        }
    }

    let (exit_code, success) = match &status {
        Ok(status) => (status.code(), status.success()),
        Err(e) => {
            warn!(service = "stream", generation, error = %e, "Failed to wait for transcoder");
            (None, false)
        }
    };

    let tail: Vec<String> = diagnostics.lock().iter().cloned().collect();
    let outcome = state
        .lock()
        .on_process_exit(generation, exit_code, success, tail);

    match outcome {
        ExitOutcome::StartFailed => warn!(
            service = "stream",
            generation,
            exit_code = ?exit_code,
            error_kind = "ProcessStartFailure",
            "Transcoder exited during startup"
        ),
        ExitOutcome::RuntimeFailed => warn!(
            service = "stream",
            generation,
            exit_code = ?exit_code,
            error_kind = "ProcessRuntimeFailure",
            "Transcoder exited while streaming"
        ),
        ExitOutcome::Finished => info!(service = "stream", generation, "Transcoder finished cleanly"),
        ExitOutcome::Ignored => debug!(
            service = "stream",
            generation,
            exit_code = ?exit_code,
            "Transcoder exited"
        ),
    }
}

/// SIGTERM lets ffmpeg finalize its output; kill is the fallback.
fn send_terminate(child: &mut Child, generation: u64) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return,
                Err(e) => debug!(service = "stream", generation, error = %e, "SIGTERM failed"),
            }
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(service = "stream", generation, error = %e, "Kill failed");
    }
}

/// Log every output line; optionally keep a tail of the last lines.
/// Reads raw bytes so non-UTF-8 output never stalls the pipe.
async fn drain_output<R: AsyncRead + Unpin>(
    reader: R,
    generation: u64,
    stream: &'static str,
    tail: Option<DiagnosticTail>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                debug!(service = "stream", generation, stream, line = %line, "ffmpeg output");
                if let Some(tail) = &tail {
                    let mut tail = tail.lock();
                    if tail.len() == DIAGNOSTIC_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(e) => {
                debug!(service = "stream", generation, stream, error = %e, "Output reader stopped");
                break;
            }
        }
    }
}
