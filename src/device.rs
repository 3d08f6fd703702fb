//! Drives instrumented test runs through the device bridge.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DeviceConfig, DEFAULT_ADB};
use crate::discovery::TestUnit;
use crate::error::{Error, Result};
use crate::protocol::{self, InstrumentedRunResult};

/// Captured result of one external process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// `None` when the process was killed.
    pub status: Option<ExitStatus>,
    /// Killed because the run was cancelled rather than timed out.
    pub cancelled: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn timed_out(&self) -> bool {
        self.status.is_none() && !self.cancelled
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// Stdout followed by stderr, decoded lossily.
    pub fn merged(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Extra time granted to the output readers once the deadline has passed.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Shared flag that asks running work to stop at the next opportunity.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut s) = stream {
            let _ = s.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Output of a reader, or nothing if a stray descendant still holds the pipe
/// open past `deadline`. The reader thread is left behind in that case.
fn collect(rx: &Receiver<Vec<u8>>, deadline: Instant, program: &str) -> Vec<u8> {
    let wait = deadline.saturating_duration_since(Instant::now()).max(DRAIN_GRACE);
    rx.recv_timeout(wait).unwrap_or_else(|_| {
        log::warn!("output of {} still open after it exited, dropping it", program);
        Vec::new()
    })
}

/// Kill the child and every process it started.
fn kill_tree(child: &mut Child) {
    // The child leads its own process group.
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            unsafe {
                let _ = libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `cmd` to completion, killing it once `timeout` has elapsed.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<ProcessOutput> {
    run_cancellable(cmd, timeout, &CancelFlag::new())
}

/// Like [`run_with_timeout`], but also kills the process as soon as `cancel`
/// is raised.
pub fn run_cancellable(cmd: &mut Command, timeout: Duration, cancel: &CancelFlag) -> Result<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let deadline = start + timeout;
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::Spawn { program: program.clone(), source })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let mut cancelled = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if cancel.is_cancelled() {
                    log::warn!("{} cancelled, killing it", program);
                    kill_tree(&mut child);
                    cancelled = true;
                    break None;
                }
                if start.elapsed() > timeout {
                    log::warn!("{} timed out after {} ms, killing it", program, timeout.as_millis());
                    kill_tree(&mut child);
                    break None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(source) => {
                kill_tree(&mut child);
                return Err(Error::Spawn { program, source });
            }
        }
    };

    Ok(ProcessOutput {
        status,
        cancelled,
        stdout: collect(&stdout, deadline, &program),
        stderr: collect(&stderr, deadline, &program),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Split a command line on whitespace into program and arguments.
pub fn parse_command(cmd: &str) -> Option<(String, Vec<String>)> {
    let mut parts = cmd.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(String),
    /// The test could not be run or its result could not be read.
    NotExecuted(String),
    TimedOut,
    /// The run was cancelled while the test was in flight.
    Cancelled,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}

#[derive(Debug)]
pub struct TestRun {
    pub outcome: TestOutcome,
    /// Raw coverage artifact, when the run reported one and it could be fetched.
    pub coverage: Option<Vec<u8>>,
    pub duration_ms: u64,
}

/// The bridge may be configured with its own arguments, e.g. `adb -s emulator-5554`.
fn bridge_command(config: &DeviceConfig) -> Command {
    let (program, args) =
        parse_command(&config.adb).unwrap_or_else(|| (DEFAULT_ADB.to_string(), Vec::new()));
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

pub fn instrument_command(config: &DeviceConfig, test: &TestUnit) -> Command {
    let mut cmd = bridge_command(config);
    cmd.args(["shell", "am", "instrument", "-w", "-r", "-e", "coverage", "true", "-e", "class"])
        .arg(test.selector())
        .arg(config.instrumentation_component());
    cmd
}

pub fn fetch_command(config: &DeviceConfig, device_path: &str) -> Command {
    let mut cmd = bridge_command(config);
    cmd.args(["shell", "run-as"])
        .arg(&config.tested_app_id)
        .arg("cat")
        .arg(device_path);
    cmd
}

/// Read the coverage artifact at `device_path` out of the tested
/// application's sandbox.
pub fn fetch_coverage(
    config: &DeviceConfig,
    device_path: &str,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<Vec<u8>> {
    let output = run_cancellable(&mut fetch_command(config, device_path), timeout, cancel)?;
    if output.cancelled {
        return Err(Error::Cancelled);
    }
    if !output.stderr.is_empty() {
        log::warn!(
            "coverage fetch of {} reported: {}",
            device_path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    if output.timed_out() {
        return Err(Error::Spawn {
            program: config.adb.clone(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "coverage fetch timed out"),
        });
    }
    Ok(output.stdout)
}

/// Run a single test method with coverage enabled and collect its outcome.
///
/// Every failure here is reported through the outcome; nothing aborts the
/// caller's batch.
pub fn run_instrumented(
    config: &DeviceConfig,
    test: &TestUnit,
    timeout: Duration,
    cancel: &CancelFlag,
) -> TestRun {
    log::info!("Running {}", test);
    let output = match run_cancellable(&mut instrument_command(config, test), timeout, cancel) {
        Ok(output) => output,
        Err(e) => {
            log::error!("Could not run {}: {}", test, e);
            return TestRun {
                outcome: TestOutcome::NotExecuted(e.to_string()),
                coverage: None,
                duration_ms: 0,
            };
        }
    };
    if output.cancelled {
        return TestRun {
            outcome: TestOutcome::Cancelled,
            coverage: None,
            duration_ms: output.duration_ms,
        };
    }
    if output.timed_out() {
        return TestRun {
            outcome: TestOutcome::TimedOut,
            coverage: None,
            duration_ms: output.duration_ms,
        };
    }

    let result = protocol::parse_runner_output(&output.merged());
    let coverage = if result.executed {
        retrieve_coverage(config, test, &result, timeout, cancel)
    } else {
        None
    };
    TestRun {
        outcome: outcome_of(result),
        coverage,
        duration_ms: output.duration_ms,
    }
}

fn retrieve_coverage(
    config: &DeviceConfig,
    test: &TestUnit,
    result: &InstrumentedRunResult,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Option<Vec<u8>> {
    let Some(path) = result.coverage_path.as_deref() else {
        log::warn!("Failed to get coverage info for {}", test);
        return None;
    };
    match fetch_coverage(config, path, timeout, cancel) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("Failed to get coverage info for {}: {}", test, e);
            None
        }
    }
}

fn outcome_of(result: InstrumentedRunResult) -> TestOutcome {
    match result {
        InstrumentedRunResult { executed: false, failure_cause, .. } => {
            TestOutcome::NotExecuted(failure_cause.unwrap_or_default())
        }
        InstrumentedRunResult { passed: true, .. } => TestOutcome::Passed,
        InstrumentedRunResult { failure_cause, .. } => {
            TestOutcome::Failed(failure_cause.unwrap_or_else(|| "test failed".to_string()))
        }
    }
}
