use std::path::PathBuf;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::quality::Quality;

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time a transcoder gets to exit after SIGTERM before it is killed.
pub(crate) const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// One conversion as submitted by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}

impl ConversionRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, quality: Quality) -> Self {
        ConversionRequest {
            input: input.into(),
            output: output.into(),
            quality,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SupervisorStatus {
    Idle,
    Running(RunSnapshot),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSnapshot {
    pub request: ConversionRequest,
    pub total_duration: Option<f64>,
    pub percentage: Option<f64>,
}

/// State of the single live conversion. Owning one means owning the child.
#[derive(Debug)]
pub(crate) struct ConversionRun {
    pub generation: u64,
    pub child: Child,
    pub request: ConversionRequest,
    pub total_duration: Option<f64>,
    pub last_percentage: Option<f64>,
}

impl ConversionRun {
    pub fn new(generation: u64, child: Child, request: ConversionRequest) -> Self {
        ConversionRun {
            generation,
            child,
            request,
            total_duration: None,
            last_percentage: None,
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            request: self.request.clone(),
            total_duration: self.total_duration,
            percentage: self.last_percentage,
        }
    }

    /// Asks the child to exit and reaps it off-thread. A child still alive
    /// after `grace` is killed. Failures are only logged.
    pub fn terminate(mut self, grace: Duration) {
        let pid = self.child.id();
        request_exit(&mut self.child);
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(pid, %status, "transcoder terminated");
            return;
        }
        let child = self.child;
        let spawned = thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || reap(child, grace));
        if let Err(err) = spawned {
            warn!(pid, "unable to reap transcoder: {err}");
        }
    }
}

/// SIGTERM on unix so ffmpeg can finish the container; kill where that fails.
#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pid = child.id();
    if let Err(errno) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, "SIGTERM failed: {errno}");
        if let Err(err) = child.kill() {
            warn!(pid, "unable to kill transcoder: {err}");
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(pid = child.id(), "unable to kill transcoder: {err}");
    }
}

fn reap(mut child: Child, grace: Duration) {
    let pid = child.id();
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid, %status, "transcoder terminated");
                return;
            },
            Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL_INTERVAL),
            Ok(None) => break,
            Err(err) => {
                warn!(pid, "unable to reap transcoder: {err}");
                return;
            },
        }
    }
    warn!(pid, "transcoder ignored termination, killing");
    if let Err(err) = child.kill() {
        warn!(pid, "unable to kill transcoder: {err}");
    }
    match child.wait() {
        Ok(status) => debug!(pid, %status, "transcoder terminated"),
        Err(err) => warn!(pid, "unable to reap transcoder: {err}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command, Stdio};

    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    use crate::testing;

    fn run_of(child: Child) -> ConversionRun {
        ConversionRun::new(1, child, ConversionRequest::new("a.mov", "a.mp4", Quality::High))
    }

    #[test]
    fn test_request_exit_sends_sigterm() {
        let _serial = testing::serial();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        request_exit(&mut child);
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn test_terminate_kills_after_grace() {
        let _serial = testing::serial();
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; echo ready; exec sleep 30"])
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let mut ready = String::new();
        BufReader::new(child.stdout.take().unwrap()).read_line(&mut ready).unwrap();
        assert_eq!(ready.trim(), "ready");

        let pid = child.id() as i32;
        let started = Instant::now();
        run_of(child).terminate(Duration::from_millis(200));

        // the reaper thread owns the child; wait for the pid to disappear
        while signal::kill(Pid::from_raw(pid), None).is_ok() {
            assert!(started.elapsed() < Duration::from_secs(10), "transcoder still alive");
            thread::sleep(Duration::from_millis(20));
        }
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
