//! Solve session orchestration
//!
//! One session drives one trajectory solve through
//! `Idle → Computing → {Ready | Failed | Fallback}`. `Failed → Idle` needs an
//! explicit [`IkSessionController::retry`]; cancellation returns a computing
//! session to `Idle` and leaves the previously published outcome alone.

use crate::error::{ReachError, Result};
use crate::model::{DhKinematicModel, JointVector};
use crate::tcp::TcpOffset;
use crate::telemetry::{NoOpTelemetry, ProgressData, SessionEvent, SessionTelemetry};
use crate::toolpath::Waypoint;
use crate::trajectory::{TrajectoryBatchSolver, TrajectoryResult};
use crate::wire::SolveRequest;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Joint tolerance used when validating backend output (radians)
const VALIDATION_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Computing,
    Ready,
    Failed,
    /// Result came from the local fallback after the primary was unavailable
    Fallback,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Computing => "computing",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Shared cancellation flag and progress counters of a session
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    abort: Arc<AtomicBool>,
    solved: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    /// Milliseconds since the epoch when computing began, 0 when idle
    started_ms: Arc<AtomicI64>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub fn abort_flag(&self) -> &AtomicBool {
        &self.abort
    }

    /// Counter a backend stores its solved waypoint count in
    pub fn progress_counter(&self) -> &AtomicUsize {
        &self.solved
    }

    /// `(solved, total)` waypoints of the running solve
    pub fn progress(&self) -> (usize, usize) {
        (self.solved.load(Ordering::Relaxed), self.total.load(Ordering::Relaxed))
    }

    /// Time spent computing so far, zero when not computing
    pub fn elapsed(&self) -> Duration {
        match self.started_ms.load(Ordering::Relaxed) {
            0 => Duration::ZERO,
            started => {
                Duration::from_millis((Utc::now().timestamp_millis() - started).max(0) as u64)
            }
        }
    }

    fn begin(&self, total: usize) {
        self.abort.store(false, Ordering::Relaxed);
        self.solved.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.started_ms.store(Utc::now().timestamp_millis().max(1), Ordering::Relaxed);
    }

    fn finish(&self) {
        self.started_ms.store(0, Ordering::Relaxed);
    }
}

/// Something that turns a solve request into a trajectory
#[async_trait]
pub trait SolveBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Solve `request`, honouring `handle`'s abort flag and updating its progress
    ///
    /// Returns `SolverUnavailable` when the backend cannot be reached.
    async fn solve(
        &self,
        request: &SolveRequest,
        handle: &SessionHandle,
    ) -> Result<TrajectoryResult>;
}

/// In-process backend over a [`TrajectoryBatchSolver`]
pub struct LocalBackend {
    name: String,
    batch: TrajectoryBatchSolver,
}

impl LocalBackend {
    pub fn new(batch: TrajectoryBatchSolver) -> Self {
        Self::named("local", batch)
    }

    pub fn named(name: impl Into<String>, batch: TrajectoryBatchSolver) -> Self {
        Self {
            name: name.into(),
            batch,
        }
    }

    pub fn batch(&self) -> &TrajectoryBatchSolver {
        &self.batch
    }
}

#[async_trait]
impl SolveBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn solve(
        &self,
        request: &SolveRequest,
        handle: &SessionHandle,
    ) -> Result<TrajectoryResult> {
        if request.is_chunked() {
            let chunk = self.batch.solve_range(
                &request.waypoints,
                &request.tcp_offset,
                request.initial_guess.as_ref(),
                request.chunk_start.unwrap_or(0),
                request.chunk_size,
            );
            handle.progress_counter().store(chunk.result.len(), Ordering::Relaxed);
            return Ok(chunk.result);
        }

        self.batch
            .solve_all_cooperative(
                &request.waypoints,
                &request.tcp_offset,
                request.initial_guess.as_ref(),
                handle.abort_flag(),
                handle.progress_counter(),
            )
            .await
    }
}

/// Input of one session
#[derive(Debug, Clone)]
pub struct SolveJob {
    /// Tool-tip waypoints in the robot base frame (meters)
    pub waypoints: Vec<Waypoint>,
    pub tcp_offset: TcpOffset,
    pub initial_guess: Option<JointVector>,
    /// Duration of the toolpath itself, before home padding
    pub toolpath_duration_secs: f64,
}

impl SolveJob {
    pub fn new(waypoints: Vec<Waypoint>, tcp_offset: TcpOffset) -> Self {
        let toolpath_duration_secs = crate::toolpath::duration_secs(&waypoints);
        Self {
            waypoints,
            tcp_offset,
            initial_guess: None,
            toolpath_duration_secs,
        }
    }

    fn request(&self) -> SolveRequest {
        SolveRequest::new(self.waypoints.clone(), self.tcp_offset)
            .with_initial_guess(self.initial_guess)
    }
}

/// Published result of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session_id: Uuid,
    /// `Ready` or `Fallback`
    pub state: SessionState,
    pub backend: String,
    pub result: TrajectoryResult,
    /// Entries the backend marked reachable that failed validation
    pub demoted: usize,
    pub elapsed_secs: f64,
    /// Toolpath duration plus home transits
    pub duration_secs: f64,
}

pub struct IkSessionController {
    primary: Arc<dyn SolveBackend>,
    fallback: Option<Arc<dyn SolveBackend>>,
    telemetry: Arc<dyn SessionTelemetry>,
    model: Arc<DhKinematicModel>,
    home: Option<JointVector>,
    home_transit_secs: f64,
    timeout: Duration,
    handle: SessionHandle,
    state: SessionState,
    session_id: Uuid,
    last_elapsed: Duration,
    last_error: Option<String>,
    published: Option<SessionOutcome>,
}

impl IkSessionController {
    pub const DEFAULT_TIMEOUT_MINUTES: u64 = 10;

    pub fn new(primary: Arc<dyn SolveBackend>, model: Arc<DhKinematicModel>) -> Self {
        Self {
            primary,
            fallback: None,
            telemetry: Arc::new(NoOpTelemetry),
            model,
            home: None,
            home_transit_secs: 0.0,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_MINUTES * 60),
            handle: SessionHandle::default(),
            state: SessionState::Idle,
            session_id: Uuid::new_v4(),
            last_elapsed: Duration::ZERO,
            last_error: None,
            published: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SolveBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn SessionTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Pad solved trajectories with `home`, each transit taking `transit_secs`
    pub fn with_home(mut self, home: Option<JointVector>, transit_secs: f64) -> Self {
        self.home = home;
        self.home_transit_secs = transit_secs.max(0.0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Clone of the cancellation handle, usable from other tasks
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Last successfully published outcome
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.published.as_ref()
    }

    /// Elapsed time of the running session, or of the last one when finished
    pub fn elapsed(&self) -> Duration {
        if self.state == SessionState::Computing {
            self.handle.elapsed()
        } else {
            self.last_elapsed
        }
    }

    /// Explicit `Failed → Idle`
    pub async fn retry(&mut self) -> Result<()> {
        if self.state != SessionState::Failed {
            return Err(ReachError::InvalidState(format!(
                "retry is only possible from failed, session is {}",
                self.state
            )));
        }
        self.last_error = None;
        self.publish_transition(SessionState::Idle, Some("retry".to_string())).await;
        Ok(())
    }

    /// Run one session to completion
    ///
    /// Returns the published outcome on `Ready` or `Fallback`. A cancelled
    /// session returns [`ReachError::Cancelled`] and ends in `Idle`.
    pub async fn run(&mut self, job: SolveJob) -> Result<&SessionOutcome> {
        match self.state {
            SessionState::Computing | SessionState::Failed => {
                return Err(ReachError::InvalidState(format!(
                    "cannot start a session while {}",
                    self.state
                )));
            }
            SessionState::Idle | SessionState::Ready | SessionState::Fallback => {}
        }

        self.session_id = Uuid::new_v4();
        self.last_error = None;
        self.handle.begin(job.waypoints.len());
        let deadline = Instant::now() + self.timeout;
        info!(
            "Session {} computing {} waypoints on {}",
            self.session_id,
            job.waypoints.len(),
            self.primary.name()
        );
        self.publish_transition(SessionState::Computing, None).await;

        let request = job.request();
        let primary = Arc::clone(&self.primary);
        let mut outcome = self.drive(primary.as_ref(), &request, deadline).await;
        let mut terminal = SessionState::Ready;
        let mut backend = primary.name().to_string();

        if let Err(e) = &outcome {
            // The fallback shares the session deadline and only gets what is left of it
            let time_left = Instant::now() < deadline;
            if e.is_unavailable() && time_left && !self.handle.is_cancelled() {
                if let Some(fallback) = self.fallback.clone() {
                    warn!(
                        "Primary solver {} unavailable ({}), using {}",
                        primary.name(),
                        e,
                        fallback.name()
                    );
                    self.handle.progress_counter().store(0, Ordering::Relaxed);
                    outcome = self.drive(fallback.as_ref(), &request, deadline).await;
                    terminal = SessionState::Fallback;
                    backend = fallback.name().to_string();
                }
            }
        }

        let outcome = if self.handle.is_cancelled() {
            Err(ReachError::Cancelled)
        } else {
            outcome.and_then(|result| self.validate(result, job.waypoints.len()))
        };
        self.last_elapsed = self.handle.elapsed();
        self.handle.finish();

        match outcome {
            Ok((mut result, demoted)) => {
                self.pad_home(&mut result);
                let padding = if self.home.is_some() { 2.0 * self.home_transit_secs } else { 0.0 };
                let published = SessionOutcome {
                    session_id: self.session_id,
                    state: terminal,
                    backend,
                    result,
                    demoted,
                    elapsed_secs: self.last_elapsed.as_secs_f64(),
                    duration_secs: job.toolpath_duration_secs + padding,
                };
                info!(
                    "Session {} {} in {:.2}s",
                    self.session_id,
                    terminal,
                    self.last_elapsed.as_secs_f64()
                );
                self.publish_transition(terminal, None).await;
                Ok(&*self.published.insert(published))
            }
            Err(ReachError::Cancelled) => {
                info!("Session {} cancelled, partial results discarded", self.session_id);
                self.publish_transition(SessionState::Idle, Some("cancelled".to_string())).await;
                Err(ReachError::Cancelled)
            }
            Err(e) => {
                error!("Session {} failed: {}", self.session_id, e);
                self.last_error = Some(e.to_string());
                self.publish_transition(SessionState::Failed, Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Run one backend until `deadline`, publishing progress
    async fn drive(
        &self,
        backend: &dyn SolveBackend,
        request: &SolveRequest,
        deadline: Instant,
    ) -> Result<TrajectoryResult> {
        let solve = backend.solve(request, &self.handle);
        let progress = async {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                ticker.tick().await;
                self.publish_progress().await;
            }
        };

        let guarded = async {
            tokio::select! {
                result = solve => result,
                _ = progress => {
                    Err(ReachError::InvalidState("progress reporter stopped".to_string()))
                }
            }
        };

        match tokio::time::timeout_at(deadline, guarded).await {
            Ok(result) => result,
            Err(_) => Err(ReachError::Timeout(self.timeout)),
        }
    }

    /// Demote entries that must never be commanded
    fn validate(
        &self,
        mut result: TrajectoryResult,
        expected: usize,
    ) -> Result<(TrajectoryResult, usize)> {
        if result.trajectory.len() != expected || result.reachability.len() != expected {
            return Err(ReachError::InvalidState(format!(
                "backend returned {} entries ({} mask) for {} waypoints",
                result.trajectory.len(),
                result.reachability.len(),
                expected
            )));
        }

        let mut demoted = 0;
        for (entry, reachable) in result.trajectory.iter_mut().zip(result.reachability.iter_mut()) {
            let valid = match entry {
                Some(joints) => {
                    joints.is_finite() && self.model.within_limits(joints, VALIDATION_TOLERANCE)
                }
                None => false,
            };
            if *reachable && !valid {
                demoted += 1;
            }
            if !*reachable || !valid {
                *reachable = false;
                *entry = None;
            }
        }

        if demoted > 0 {
            warn!("Demoted {} entries marked reachable without a valid joint vector", demoted);
        }
        result.recount();
        Ok((result, demoted))
    }

    fn pad_home(&self, result: &mut TrajectoryResult) {
        if let Some(home) = self.home {
            result.trajectory.insert(0, Some(home));
            result.reachability.insert(0, true);
            result.trajectory.push(Some(home));
            result.reachability.push(true);
            result.recount();
        }
    }

    async fn publish_transition(&mut self, state: SessionState, message: Option<String>) {
        let event = self.transition(state, message);
        if let Err(e) = self.telemetry.publish_state(&event).await {
            warn!("Failed to publish session state: {}", e);
        }
    }

    fn transition(&mut self, state: SessionState, message: Option<String>) -> SessionEvent {
        let previous = self.state;
        self.state = state;
        let elapsed_secs = self.elapsed().as_secs_f64();
        SessionEvent {
            session_id: self.session_id,
            state,
            previous,
            message,
            elapsed_secs,
            timestamp: Utc::now(),
        }
    }

    async fn publish_progress(&self) {
        let (solved, total) = self.handle.progress();
        let data = ProgressData {
            session_id: self.session_id,
            solved,
            total,
            elapsed_secs: self.handle.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.telemetry.publish_progress(&data).await {
            warn!("Failed to publish session progress: {}", e);
        }
    }
}
