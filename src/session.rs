//! State machine owning one render job from start to completion or
//! cancellation. The view layer only ever talks to this type: it forwards
//! start/cancel intents in and receives pushed events out.
//!
//! All estimator and parser state lives on the drainer task - single writer.
//! Everything published outward is an immutable value copy, so observers on
//! other tasks never race the drain loop.

use crate::blender::{Blender, RunningJob};
use crate::models::args::{Args, OutputOverride};
use crate::models::error::SessionError;
use crate::models::event::SessionEvent;
use crate::models::format::Format;
use crate::models::mode::{Frame, Mode};
use crate::models::status::SessionState;
use crate::parser::ProgressParser;
use crate::process::{self, CancelOutcome, DEFAULT_GRACE_PERIOD};
use crate::timing::TimingEstimator;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Everything the user supplies for one render run.
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub project_file: PathBuf,
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub output: Option<OutputOverride>,
    pub format: Option<Format>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    pid: Option<u32>,
}

pub struct RenderSession {
    blender: Blender,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
    grace_period: Duration,
    min_frame_duration: Duration,
}

impl RenderSession {
    pub fn new(blender: Blender) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            blender,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                pid: None,
            })),
            events,
            grace_period: DEFAULT_GRACE_PERIOD,
            min_frame_duration: Duration::ZERO,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Frame timing samples at or below this threshold are discarded as
    /// clock anomalies.
    pub fn with_min_frame_duration(mut self, min_frame_duration: Duration) -> Self {
        self.min_frame_duration = min_frame_duration;
        self
    }

    /// Observers get every frame-progress update, every timing snapshot,
    /// and one event per state transition. Subscribe before calling start.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().expect("session state lock poisoned").state
    }

    /// Launch the job described by `params`. Valid only from `Idle`; a new
    /// start always creates a wholly new job, never a retry of the old one.
    pub fn start(&self, params: RenderParams) -> Result<Uuid, SessionError> {
        if params.start_frame > params.end_frame {
            return Err(SessionError::InvalidRange {
                start: params.start_frame,
                end: params.end_frame,
            });
        }

        let mut inner = self.inner.lock().expect("session state lock poisoned");
        if inner.state != SessionState::Idle {
            return Err(SessionError::InvalidState(inner.state));
        }

        let mode = Mode::Animation {
            start: params.start_frame,
            end: params.end_frame,
        };
        let mut args = Args::new(&params.project_file, mode);
        args.output = params.output.clone();
        args.format = params.format;

        let job = match self.blender.render(&args) {
            Ok(job) => job,
            Err(e) => {
                log::error!("failed to launch render: {e}");
                inner.state = SessionState::Failed { exit_code: None };
                self.publish(SessionEvent::StateChanged(inner.state));
                return Err(e.into());
            }
        };

        let job_id = job.id;
        inner.pid = Some(job.pid);
        inner.state = SessionState::Running;
        self.publish(SessionEvent::StateChanged(SessionState::Running));
        drop(inner);

        log::info!("render job {job_id} running as pid {}", job.pid);
        tokio::spawn(drain_job(
            job,
            Arc::clone(&self.inner),
            self.events.clone(),
            mode,
            self.min_frame_duration,
        ));
        Ok(job_id)
    }

    /// Stop the running job, terminating its whole process tree. Resolves
    /// once the controller is done, force-kill included. Cancelling a job
    /// that already exited naturally is benign: the session keeps the state
    /// the natural exit produced.
    pub async fn cancel(&self) -> Result<CancelOutcome, SessionError> {
        let pid = {
            let mut inner = self.inner.lock().expect("session state lock poisoned");
            match inner.state {
                SessionState::Idle | SessionState::Cancelling => {
                    return Err(SessionError::InvalidState(inner.state));
                }
                state if state.is_terminal() => return Ok(CancelOutcome::AlreadyExited),
                _ => {}
            }
            inner.state = SessionState::Cancelling;
            self.publish(SessionEvent::StateChanged(SessionState::Cancelling));
            inner.pid.take()
        };

        let outcome = match pid {
            Some(pid) => process::terminate_tree(pid, self.grace_period).await,
            None => CancelOutcome::NotFound,
        };

        let mut inner = self.inner.lock().expect("session state lock poisoned");
        if inner.state == SessionState::Cancelling {
            inner.state = SessionState::Canceled;
            self.publish(SessionEvent::StateChanged(SessionState::Canceled));
        }
        Ok(outcome)
    }

    /// Return to `Idle` from a terminal state so a fresh job can start.
    pub fn reset(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().expect("session state lock poisoned");
        match inner.state {
            SessionState::Idle => Ok(()),
            state if state.is_terminal() => {
                inner.state = SessionState::Idle;
                inner.pid = None;
                self.publish(SessionEvent::StateChanged(SessionState::Idle));
                Ok(())
            }
            state => Err(SessionError::InvalidState(state)),
        }
    }

    fn publish(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Drainer task: owns the child and both streams, feeds the parser, routes
/// frame events into the estimator, and republishes snapshots. The only
/// writer of timing state; the only natural-exit writer of session state.
async fn drain_job(
    mut job: RunningJob,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
    mode: Mode,
    min_frame_duration: Duration,
) {
    let started = Instant::now();
    let mut parser = ProgressParser::default().with_min_duration(min_frame_duration);
    let mut estimator = TimingEstimator::starting_at(mode.end_frame(), started);
    let total = mode.total_frames();
    let mut rendered = 0u32;

    // stderr is captured so blender cannot block on a full pipe; we only log it
    let stderr = job.stderr;
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::debug!("blender stderr: {line}");
        }
    });

    let mut lines = BufReader::new(job.stdout).lines();
    let mut tick = interval(TICK_PERIOD);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parser.parse_line(&line, Instant::now()) {
                    Ok(Some(event)) => {
                        rendered += 1;
                        log::info!("frame {} finished in {:.2?}", event.frame, event.duration);
                        let snapshot = estimator.record(event);
                        let _ = events.send(SessionEvent::Progress {
                            frame: event.frame,
                            total,
                            rendered,
                        });
                        let _ = events.send(SessionEvent::Timing(snapshot));
                    }
                    Ok(None) => {}
                    Err(warning) => log::warn!("{warning}"),
                },
                Ok(None) => break,
                Err(e) => {
                    log::warn!("error reading render output: {e}");
                    break;
                }
            },
            _ = tick.tick() => {
                // keep elapsed / current-frame clocks moving between frames
                let _ = events.send(SessionEvent::Timing(estimator.snapshot_at(Instant::now())));
            }
        }
    }

    // stream end closes the window of the frame still in progress
    if let Some(event) = parser.finish(Instant::now()) {
        rendered += 1;
        log::info!("final frame {} finished in {:.2?}", event.frame, event.duration);
        let snapshot = estimator.record(event);
        let _ = events.send(SessionEvent::Progress {
            frame: event.frame,
            total,
            rendered,
        });
        let _ = events.send(SessionEvent::Timing(snapshot));
    }

    let status = job.child.wait().await;

    let mut inner = inner.lock().expect("session state lock poisoned");
    inner.pid = None;
    // a session mid-cancellation keeps its fate with the cancel call
    if inner.state == SessionState::Running {
        let state = match &status {
            Ok(status) if status.success() => SessionState::Completed,
            Ok(status) => SessionState::Failed {
                exit_code: status.code(),
            },
            Err(e) => {
                log::error!("could not observe render exit status: {e}");
                SessionState::Failed { exit_code: None }
            }
        };
        log::info!("render job {} ended: {state:?}", job.id);
        inner.state = state;
        let _ = events.send(SessionEvent::StateChanged(state));
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use semver::Version;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(20);

    /// Stand-in for blender: a shell script that prints marker lines the way
    /// blender does and ignores the CLI flags it is given.
    fn fake_blender(dir: &Path, body: &str) -> Blender {
        let _ = env_logger::builder().is_test(true).try_init();
        let path = dir.join("fake_blender.sh");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Blender::new(path, Version::new(4, 1, 0))
    }

    fn params() -> RenderParams {
        RenderParams {
            project_file: PathBuf::from("/tmp/scene.blend"),
            start_frame: 1,
            end_frame: 2,
            output: None,
            format: None,
        }
    }

    async fn wait_for_terminal(
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> (SessionState, Vec<SessionEvent>) {
        let mut seen = Vec::new();
        loop {
            let event = timeout(WAIT, rx.recv()).await.expect("session stalled").unwrap();
            if let SessionEvent::StateChanged(state) = &event {
                if state.is_terminal() {
                    let state = *state;
                    seen.push(event);
                    return (state, seen);
                }
            }
            seen.push(event);
        }
    }

    #[tokio::test]
    async fn cancel_from_idle_is_invalid_and_harmless() {
        let dir = TempDir::new().unwrap();
        let session = RenderSession::new(fake_blender(dir.path(), "exit 0"));

        match session.cancel().await {
            Err(SessionError::InvalidState(SessionState::Idle)) => {}
            other => panic!("expected invalid state, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn rejects_inverted_frame_range() {
        let dir = TempDir::new().unwrap();
        let session = RenderSession::new(fake_blender(dir.path(), "exit 0"));

        let mut bad = params();
        bad.start_frame = 10;
        bad.end_frame = 2;
        assert!(matches!(
            session.start(bad),
            Err(SessionError::InvalidRange { start: 10, end: 2 })
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn completes_and_reports_frame_progress() {
        let dir = TempDir::new().unwrap();
        let script = r#"echo "Blender 4.1.0"
echo "Fra:1 Mem:27.54M | Rendering 1 / 64 samples"
sleep 0.3
echo "Fra:1 Mem:27.60M | Rendering 64 / 64 samples"
echo "Fra:2 Mem:27.54M | Sce: Scene Ve:0"
sleep 0.3
exit 0"#;
        let session = RenderSession::new(fake_blender(dir.path(), script));
        let mut rx = session.subscribe();

        session.start(params()).unwrap();
        // a second start while running is a programming error, not a queue
        assert!(matches!(
            session.start(params()),
            Err(SessionError::InvalidState(SessionState::Running))
        ));

        let (state, seen) = wait_for_terminal(&mut rx).await;
        assert_eq!(state, SessionState::Completed);

        let frames: Vec<Frame> = seen
            .iter()
            .filter_map(|event| match event {
                SessionEvent::Progress { frame, total, .. } => {
                    assert_eq!(*total, 2);
                    Some(*frame)
                }
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![1, 2]);

        let last_timing = seen.iter().rev().find_map(|event| match event {
            SessionEvent::Timing(snapshot) => Some(*snapshot),
            _ => None,
        });
        assert!(last_timing.unwrap().average_frame_time.is_some());

        // racing cancel after natural completion is benign
        assert!(matches!(session.cancel().await, Ok(CancelOutcome::AlreadyExited)));
        assert_eq!(session.state(), SessionState::Completed);

        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn non_zero_exit_fails_with_code() {
        let dir = TempDir::new().unwrap();
        let session = RenderSession::new(fake_blender(dir.path(), "echo \"Fra:1\"\nexit 3"));
        let mut rx = session.subscribe();

        session.start(params()).unwrap();
        let (state, _) = wait_for_terminal(&mut rx).await;
        assert_eq!(state, SessionState::Failed { exit_code: Some(3) });
    }

    #[tokio::test]
    async fn launch_failure_moves_to_failed() {
        let blender = Blender::new(PathBuf::from("/nonexistent/blender"), Version::new(4, 1, 0));
        let session = RenderSession::new(blender);

        assert!(matches!(session.start(params()), Err(SessionError::Launch(_))));
        assert_eq!(session.state(), SessionState::Failed { exit_code: None });
    }

    #[tokio::test]
    async fn cancel_terminates_a_long_render() {
        let dir = TempDir::new().unwrap();
        let script = r#"echo "Fra:1 Mem:27.54M"
sleep 60
exit 0"#;
        let session = RenderSession::new(fake_blender(dir.path(), script))
            .with_grace_period(Duration::from_secs(5));
        let mut rx = session.subscribe();

        session.start(params()).unwrap();
        // wait until the job is live before cancelling
        loop {
            match timeout(WAIT, rx.recv()).await.expect("no events").unwrap() {
                SessionEvent::StateChanged(SessionState::Running) => break,
                _ => {}
            }
        }

        let outcome = session.cancel().await.unwrap();
        assert!(matches!(
            outcome,
            CancelOutcome::Terminated | CancelOutcome::ForceKilled
        ));
        assert_eq!(session.state(), SessionState::Canceled);

        session.reset().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }
}
