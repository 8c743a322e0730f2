//! Mirroring engine process lifecycle.
//!
//! Each session's child process is exclusively owned by its monitor
//! task: nothing else signals or reaps it, which rules out double-reap
//! races. The monitor finalizes the session status when the process
//! exits, whether that is a clean stop, a crash, or a forced kill.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use mircast_protocol::{Device, MirrorConfig, ResolutionCap, TelemetryEvent};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::find_engine_executable;
use crate::error::{Error, Result};
use crate::telemetry::TelemetryParser;

/// Lifecycle of one supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Spawned, not yet past the immediate-exit window
    Starting,
    Running,
    /// Stop requested, grace period running
    Stopping,
    /// Exited cleanly or was stopped by request
    Stopped,
    /// Exited non-zero on its own
    Crashed,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Running | SessionStatus::Stopping
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Crashed)
    }
}

/// Tunables for session supervision.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Wait after graceful termination before force-killing
    pub grace: Duration,
    /// How long the engine must survive before Starting becomes Running
    pub spawn_grace: Duration,
    /// Telemetry error lines kept as crash diagnostics
    pub error_context: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(3),
            spawn_grace: Duration::from_millis(300),
            error_context: 8,
        }
    }
}

#[derive(Debug)]
enum ControlMsg {
    Stop,
}

#[derive(Clone)]
struct SessionEntry {
    status: watch::Receiver<SessionStatus>,
    control: mpsc::Sender<ControlMsg>,
}

/// Launches and owns all mirroring sessions, at most one active per
/// device.
pub struct Supervisor {
    engine: PathBuf,
    config: SupervisorConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

/// Caller-side handle to one supervised session.
#[derive(Debug)]
pub struct Session {
    serial: String,
    config: MirrorConfig,
    status: watch::Receiver<SessionStatus>,
    telemetry: broadcast::Sender<TelemetryEvent>,
    control: mpsc::Sender<ControlMsg>,
    diagnostics: Arc<Mutex<VecDeque<String>>>,
    exit_code: Arc<Mutex<Option<i32>>>,
}

impl Supervisor {
    pub fn new(engine: impl Into<PathBuf>, config: SupervisorConfig) -> Self {
        Self {
            engine: engine.into(),
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Discovers the engine executable and builds a supervisor around it.
    pub fn locate(config: SupervisorConfig) -> Result<Self> {
        Ok(Self::new(find_engine_executable()?, config))
    }

    /// Starts a mirroring session for the device.
    ///
    /// Rejected synchronously with [`Error::AlreadyRunning`] when a
    /// session for this serial is still active; a finished but
    /// unacknowledged session is replaced.
    pub fn launch(&self, device: &Device, config: MirrorConfig) -> Result<Session> {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get(&device.serial) {
            if entry.status.borrow().is_active() {
                return Err(Error::AlreadyRunning {
                    serial: device.serial.clone(),
                });
            }
        }

        let args = build_args(device, &config);
        info!(
            target = "mircast.supervisor",
            serial = %device.serial,
            engine = %self.engine.display(),
            ?args,
            "launching mirroring engine"
        );

        let mut child = Command::new(&self.engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::EngineNotFound,
                _ => Error::LaunchFailed(e.to_string()),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::LaunchFailed("engine stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::LaunchFailed("engine stderr not captured".into()))?;

        // Both streams feed one channel so merged arrival order is
        // preserved for subscribers.
        let (line_tx, line_rx) = mpsc::channel::<String>(256);
        tokio::spawn(read_lines(stdout, line_tx.clone()));
        tokio::spawn(read_lines(stderr, line_tx));

        let (status_tx, status_rx) = watch::channel(SessionStatus::Starting);
        let (telemetry_tx, _) = broadcast::channel(256);
        let (control_tx, control_rx) = mpsc::channel(4);
        let diagnostics = Arc::new(Mutex::new(VecDeque::new()));
        let exit_code = Arc::new(Mutex::new(None));

        tokio::spawn(monitor(MonitorTask {
            serial: device.serial.clone(),
            child,
            lines: line_rx,
            status: status_tx,
            telemetry: telemetry_tx.clone(),
            control: control_rx,
            diagnostics: Arc::clone(&diagnostics),
            exit_code: Arc::clone(&exit_code),
            config: self.config.clone(),
        }));

        sessions.insert(
            device.serial.clone(),
            SessionEntry {
                status: status_rx.clone(),
                control: control_tx.clone(),
            },
        );

        Ok(Session {
            serial: device.serial.clone(),
            config,
            status: status_rx,
            telemetry: telemetry_tx,
            control: control_tx,
            diagnostics,
            exit_code,
        })
    }

    /// Requests a graceful stop and waits for the session to finish.
    pub async fn stop(&self, serial: &str) -> Result<SessionStatus> {
        let entry = self
            .sessions
            .lock()
            .get(serial)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound {
                serial: serial.to_owned(),
            })?;

        let _ = entry.control.send(ControlMsg::Stop).await;
        let mut status = entry.status.clone();
        let bound = self.config.grace + Duration::from_secs(2);
        match tokio::time::timeout(bound, wait_terminal(&mut status)).await {
            Ok(final_status) => Ok(final_status),
            Err(_) => {
                warn!(
                    target = "mircast.supervisor",
                    serial, "session did not finalize within the stop bound"
                );
                Ok(*entry.status.borrow())
            }
        }
    }

    /// Acknowledges a finished session, releasing its slot. Returns
    /// false if the session is still active or unknown.
    pub fn reap(&self, serial: &str) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(serial) {
            Some(entry) if entry.status.borrow().is_terminal() => {
                sessions.remove(serial);
                true
            }
            _ => false,
        }
    }

    /// Serials with a session in any non-terminal state.
    pub fn active_serials(&self) -> Vec<String> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, entry)| entry.status.borrow().is_active())
            .map(|(serial, _)| serial.clone())
            .collect()
    }

    /// Stops every active session. Used on launcher shutdown.
    pub async fn shutdown(&self) {
        for serial in self.active_serials() {
            let _ = self.stop(&serial).await;
            self.reap(&serial);
        }
    }
}

impl Session {
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// A watchable view of the status, independent of this handle.
    pub fn status_stream(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Subscribes to this session's telemetry stream, delivered in
    /// arrival order.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry.subscribe()
    }

    /// Last telemetry error lines, populated as the stream is parsed.
    pub fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.lock().iter().cloned().collect()
    }

    /// Engine exit code, once the session is terminal. None while the
    /// engine runs or when it died from a signal.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    /// Requests a graceful stop and waits for the final status.
    pub async fn stop(&mut self) -> SessionStatus {
        let _ = self.control.send(ControlMsg::Stop).await;
        self.wait().await
    }

    /// Waits until the session reaches a terminal status.
    pub async fn wait(&mut self) -> SessionStatus {
        wait_terminal(&mut self.status).await
    }
}

async fn wait_terminal(status: &mut watch::Receiver<SessionStatus>) -> SessionStatus {
    loop {
        let current = *status.borrow();
        if current.is_terminal() {
            return current;
        }
        if status.changed().await.is_err() {
            return *status.borrow();
        }
    }
}

/// Translates a launch configuration into engine invocation arguments.
/// Deterministic and pure given (device, config).
pub fn build_args(device: &Device, config: &MirrorConfig) -> Vec<String> {
    let mut args = vec!["-s".to_owned(), device.serial.clone()];
    if let ResolutionCap::Pixels(pixels) = config.resolution_cap {
        args.push("-m".to_owned());
        args.push(pixels.to_string());
    }
    args.push(format!("--max-fps={}", config.fps));
    args.push(format!("--video-codec={}", config.codec.as_engine_arg()));
    args.push("-b".to_owned());
    args.push(format!("{}M", config.bitrate_mbps));
    if config.screen_off_on_start {
        args.push("--turn-screen-off".to_owned());
    }
    if config.borderless {
        args.push("--window-borderless".to_owned());
    }
    if config.print_fps {
        args.push("--print-fps".to_owned());
    }
    args
}

struct MonitorTask {
    serial: String,
    child: Child,
    lines: mpsc::Receiver<String>,
    status: watch::Sender<SessionStatus>,
    telemetry: broadcast::Sender<TelemetryEvent>,
    control: mpsc::Receiver<ControlMsg>,
    diagnostics: Arc<Mutex<VecDeque<String>>>,
    exit_code: Arc<Mutex<Option<i32>>>,
    config: SupervisorConfig,
}

async fn monitor(task: MonitorTask) {
    let MonitorTask {
        serial,
        mut child,
        mut lines,
        status,
        telemetry,
        mut control,
        diagnostics,
        exit_code,
        config,
    } = task;

    let mut parser = TelemetryParser::new();
    let mut lines_open = true;
    let mut starting = true;
    let mut stopping = false;
    let mut force_deadline: Option<tokio::time::Instant> = None;

    let spawn_deadline = tokio::time::sleep(config.spawn_grace);
    tokio::pin!(spawn_deadline);

    // The child is polled rather than awaited so the stop and force-kill
    // handlers can reach it without a long-lived borrow.
    let mut poll = tokio::time::interval(Duration::from_millis(100));

    let exit: std::io::Result<ExitStatus> = loop {
        tokio::select! {
            _ = poll.tick() => {
                match child.try_wait() {
                    Ok(Some(exit_status)) => break Ok(exit_status),
                    Ok(None) => {}
                    Err(e) => break Err(e),
                }
            }
            maybe_line = lines.recv(), if lines_open => {
                match maybe_line {
                    Some(line) => publish(&mut parser, &line, &telemetry, &diagnostics, config.error_context),
                    None => lines_open = false,
                }
            }
            () = &mut spawn_deadline, if starting => {
                starting = false;
                if !stopping {
                    let _ = status.send(SessionStatus::Running);
                }
            }
            maybe_cmd = control.recv(), if !stopping => {
                // A closed control channel means every handle is gone;
                // treat it like a stop request.
                if matches!(maybe_cmd, Some(ControlMsg::Stop) | None) {
                    stopping = true;
                    let _ = status.send(SessionStatus::Stopping);
                    graceful_terminate(&mut child, &serial);
                    force_deadline = Some(tokio::time::Instant::now() + config.grace);
                }
            }
            _ = async {
                // Disabled unless a deadline is armed; the fallback is never awaited.
                tokio::time::sleep_until(force_deadline.unwrap_or_else(tokio::time::Instant::now)).await
            }, if force_deadline.is_some() => {
                warn!(
                    target = "mircast.supervisor",
                    serial, "grace period elapsed, force-killing engine"
                );
                let _ = child.start_kill();
                force_deadline = None;
            }
        }
    };

    // Trailing output: the readers end at EOF and close the channel.
    // Bounded, because a grandchild holding the pipe open must not
    // stall finalization.
    let drain = async {
        while let Some(line) = lines.recv().await {
            publish(&mut parser, &line, &telemetry, &diagnostics, config.error_context);
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(1), drain).await;

    *exit_code.lock() = exit.as_ref().ok().and_then(ExitStatus::code);

    let final_status = match exit {
        Ok(exit_status) if exit_status.success() => SessionStatus::Stopped,
        Ok(exit_status) if stopping => {
            // Non-zero after a termination signal is still a clean stop.
            debug!(
                target = "mircast.supervisor",
                serial, status = %exit_status, "engine stopped by request"
            );
            SessionStatus::Stopped
        }
        Ok(exit_status) => {
            let code = exit_status.code().unwrap_or(-1);
            warn!(
                target = "mircast.supervisor",
                serial,
                code,
                diagnostics = ?diagnostics.lock(),
                "mirroring engine crashed"
            );
            SessionStatus::Crashed
        }
        Err(e) => {
            warn!(target = "mircast.supervisor", serial, error = %e, "failed to reap engine");
            SessionStatus::Crashed
        }
    };

    let _ = status.send(final_status);
    info!(target = "mircast.supervisor", serial, status = ?final_status, "session finished");
}

fn publish(
    parser: &mut TelemetryParser,
    line: &str,
    telemetry: &broadcast::Sender<TelemetryEvent>,
    diagnostics: &Mutex<VecDeque<String>>,
    error_context: usize,
) {
    for event in parser.parse_line(line, std::time::Instant::now()) {
        if event.is_error() && error_context > 0 {
            let mut diag = diagnostics.lock();
            if diag.len() >= error_context {
                diag.pop_front();
            }
            diag.push_back(line.to_owned());
        }
        let _ = telemetry.send(event);
    }
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
fn graceful_terminate(child: &mut Child, serial: &str) {
    match child.id() {
        Some(pid) => {
            debug!(target = "mircast.supervisor", serial, pid, "sending SIGTERM");
            // SAFETY: signalling our own child's pid.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn graceful_terminate(child: &mut Child, serial: &str) {
    debug!(target = "mircast.supervisor", serial, "terminating engine");
    let _ = child.start_kill();
}


#[cfg(all(test, unix))]
mod process_tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;

    use super::*;
    use mircast_protocol::{DeviceState, TelemetryKind};

    fn fake_engine(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn test_supervisor(engine: PathBuf) -> Supervisor {
        Supervisor::new(
            engine,
            SupervisorConfig {
                grace: Duration::from_secs(1),
                spawn_grace: Duration::from_millis(100),
                error_context: 8,
            },
        )
    }

    fn device() -> Device {
        Device::usb("TESTSERIAL", DeviceState::Ready)
    }

    #[tokio::test]
    async fn duplicate_launch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = test_supervisor(fake_engine(&dir, "sleep 5"));

        let _session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        let err = supervisor
            .launch(&device(), MirrorConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning { serial } if serial == "TESTSERIAL"));

        let status = supervisor.stop("TESTSERIAL").await.unwrap();
        assert_eq!(status, SessionStatus::Stopped);
        assert!(supervisor.reap("TESTSERIAL"));
        // The slot is free again.
        let mut session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        assert_eq!(session.stop().await, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_finishes_within_grace_bound() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = test_supervisor(fake_engine(&dir, "sleep 30"));

        let session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.status(), SessionStatus::Running);

        let started = Instant::now();
        let status = supervisor.stop("TESTSERIAL").await.unwrap();
        assert_eq!(status, SessionStatus::Stopped);
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "stop took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn sigterm_resistant_engine_is_force_killed_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        // Ignores TERM; only the forced kill can end it. Short sleeps
        // keep the shell itself the signal target.
        let supervisor = test_supervisor(fake_engine(
            &dir,
            "trap '' TERM\nwhile true; do sleep 0.1; done",
        ));

        let session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.status(), SessionStatus::Running);

        let status = supervisor.stop("TESTSERIAL").await.unwrap();
        assert_eq!(status, SessionStatus::Stopped);
        assert!(supervisor.reap("TESTSERIAL"));
    }

    #[tokio::test]
    async fn self_exit_with_nonzero_status_is_a_crash_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = test_supervisor(fake_engine(
            &dir,
            "echo 'ERROR: Could not open video stream' >&2\nexit 3",
        ));

        let mut session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        let status = tokio::time::timeout(Duration::from_secs(5), session.wait())
            .await
            .expect("session should finalize");
        assert_eq!(status, SessionStatus::Crashed);
        assert_eq!(session.exit_code(), Some(3));
        assert!(
            session
                .diagnostics()
                .iter()
                .any(|line| line.contains("Could not open video stream")),
            "diagnostics: {:?}",
            session.diagnostics()
        );
    }

    #[tokio::test]
    async fn telemetry_arrives_in_stream_order() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = test_supervisor(fake_engine(
            &dir,
            "sleep 0.3\necho 'fps: 59.8'\necho 'Device: Pixel 7'",
        ));

        let mut session = supervisor.launch(&device(), MirrorConfig::default()).unwrap();
        let mut events = session.subscribe();

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("first event")
            .unwrap();
        assert_eq!(first.kind, TelemetryKind::FpsSample { fps: 59.8 });

        let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("second event")
            .unwrap();
        assert_eq!(
            second.kind,
            TelemetryKind::Info {
                message: "Device: Pixel 7".into()
            }
        );

        assert_eq!(session.wait().await, SessionStatus::Stopped);
    }
}
