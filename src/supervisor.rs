use std::io;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::PreflightError;
use crate::events::{ConversionEvent, Outcome};
use crate::ffmpeg::command::TranscodeCommand;
use crate::ffmpeg::lines;
use crate::ffmpeg::probe::DurationProber;
use crate::ffmpeg::progress;
use crate::transcode_state::{ConversionRequest, ConversionRun, SupervisorStatus, TERMINATE_GRACE};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Shared {
    run: Option<ConversionRun>,
    generation: u64,
    subscribers: Vec<Sender<ConversionEvent>>,
}

impl Shared {
    fn publish(&mut self, event: ConversionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn run_mut(&mut self, generation: u64) -> Option<&mut ConversionRun> {
        self.run.as_mut().filter(|run| run.generation == generation)
    }

    fn take_run(&mut self, generation: u64) -> Option<ConversionRun> {
        if self.run.as_ref().is_some_and(|run| run.generation == generation) {
            self.run.take()
        } else {
            None
        }
    }

    /// Fails the run with `generation` if it is still live.
    fn abort(&mut self, generation: u64, message: String) {
        if let Some(run) = self.take_run(generation) {
            warn!(input = %run.request.input.display(), "conversion failed: {message}");
            run.terminate(TERMINATE_GRACE);
            self.publish(ConversionEvent::status(message));
            self.publish(ConversionEvent::Finished { outcome: Outcome::Failure { code: None } });
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one transcoder process at a time and reports on it through events.
///
/// `Idle -> Running -> {Completed, Failed, Canceled} -> Idle`. Every method
/// takes `&self`, so a supervisor can be shared behind an `Arc` and canceled
/// from another thread.
pub struct Supervisor {
    config: Config,
    prober: DurationProber,
    shared: Arc<Mutex<Shared>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let prober = DurationProber::from_config(&config);
        Supervisor {
            config,
            prober,
            shared: Arc::new(Mutex::new(Shared {
                run: None,
                generation: 0,
                subscribers: vec![],
            })),
        }
    }

    pub fn subscribe(&self) -> Receiver<ConversionEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared).subscribers.push(tx);
        rx
    }

    pub fn status(&self) -> SupervisorStatus {
        match &lock(&self.shared).run {
            None => SupervisorStatus::Idle,
            Some(run) => SupervisorStatus::Running(run.snapshot()),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared).run.is_some()
    }

    /// Launches the transcoder for `request`.
    ///
    /// Refusals leave the supervisor untouched and emit no events. Once
    /// accepted, exactly one `Finished` event follows.
    pub fn start(&self, request: ConversionRequest) -> Result<(), PreflightError> {
        let mut shared = lock(&self.shared);
        if shared.run.is_some() {
            return Err(PreflightError::AlreadyRunning);
        }
        preflight(&self.config, &request)?;

        let command = TranscodeCommand::new(&self.config, &request.input, &request.output, request.quality);
        info!("Executing command: {}", command.display());
        let mut child = command.command().spawn()?;
        let output = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => lines::merge(stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PreflightError::Spawn(io::Error::other("transcoder output was not captured")));
            },
        };

        shared.generation += 1;
        let generation = shared.generation;
        let input = request.input.clone();
        shared.run = Some(ConversionRun::new(generation, child, request));

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            generation,
            prober: self.prober.clone(),
        };
        let spawned = thread::Builder::new()
            .name(format!("conversion-{generation}"))
            .spawn(move || worker.run(&input, output));
        if let Err(err) = spawned {
            if let Some(run) = shared.take_run(generation) {
                run.terminate(TERMINATE_GRACE);
            }
            return Err(PreflightError::Spawn(err));
        }

        shared.publish(ConversionEvent::status("Starting conversion..."));
        Ok(())
    }

    /// Stops the running conversion. Returns false, and emits nothing, when
    /// there is nothing to cancel.
    pub fn cancel(&self) -> bool {
        let mut shared = lock(&self.shared);
        match shared.run.take() {
            None => false,
            Some(run) => {
                info!(input = %run.request.input.display(), "conversion canceled");
                run.terminate(TERMINATE_GRACE);
                shared.publish(ConversionEvent::status("Conversion canceled."));
                shared.publish(ConversionEvent::Finished { outcome: Outcome::Canceled });
                true
            },
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn preflight(config: &Config, request: &ConversionRequest) -> Result<(), PreflightError> {
    if !config.transcoder_path.is_file() {
        return Err(PreflightError::TranscoderMissing(config.transcoder_path.clone()));
    }
    if is_blank(&request.input) {
        return Err(PreflightError::EmptyField("input"));
    }
    if is_blank(&request.output) {
        return Err(PreflightError::EmptyField("output"));
    }
    // existence only; unreadable or empty inputs fail in the transcoder
    if !request.input.exists() {
        return Err(PreflightError::InputMissing(request.input.clone()));
    }
    Ok(())
}

fn is_blank(path: &Path) -> bool {
    path.to_string_lossy().trim().is_empty()
}

struct Worker {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    prober: DurationProber,
}

impl Worker {
    fn run(self, input: &Path, output: Receiver<io::Result<String>>) {
        let guard = RunGuard {
            shared: Arc::clone(&self.shared),
            generation: self.generation,
        };

        let total_duration = self.prober.probe(input);
        let active = match lock(&self.shared).run_mut(self.generation) {
            Some(run) => {
                run.total_duration = Some(total_duration);
                true
            },
            None => false,
        };
        if !active {
            return;
        }

        for line in output {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    guard.fail(format!("Error reading transcoder output: {err}"));
                    return;
                },
            };
            if !self.report(line, total_duration) {
                debug!(generation = self.generation, "run no longer active; stop reading");
                return;
            }
        }

        guard.wait_for_exit();
    }

    /// Publishes a status line and any progress it carries. Returns false once
    /// the run has been canceled, in which case nothing is published.
    fn report(&self, line: String, total_duration: f64) -> bool {
        let percentage = progress::parse(&line, total_duration);
        if percentage.is_none() && line.contains("time=") {
            debug!(line = %line, "no elapsed time in status line");
        }

        let mut shared = lock(&self.shared);
        match shared.run_mut(self.generation) {
            None => return false,
            Some(run) => {
                if percentage.is_some() {
                    run.last_percentage = percentage;
                }
            },
        }
        shared.publish(ConversionEvent::status(line));
        if let Some(percentage) = percentage {
            shared.publish(ConversionEvent::Progress { percentage });
        }
        true
    }
}

/// Releases the child of one run on every way out of the worker, panics
/// included. Does nothing if the run already finished or was canceled.
struct RunGuard {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
}

impl RunGuard {
    fn fail(&self, message: String) {
        lock(&self.shared).abort(self.generation, message);
    }

    /// Polls for exit without holding the lock between polls, so `cancel`
    /// stays responsive while the transcoder flushes its output.
    fn wait_for_exit(&self) {
        loop {
            {
                let mut shared = lock(&self.shared);
                let Some(run) = shared.run_mut(self.generation) else {
                    return;
                };
                match run.child.try_wait() {
                    Ok(Some(status)) => {
                        let outcome = if status.success() {
                            Outcome::Success
                        } else {
                            Outcome::Failure { code: status.code() }
                        };
                        info!(input = %run.request.input.display(), %status, "transcoder exited");
                        shared.run = None;
                        shared.publish(ConversionEvent::Finished { outcome });
                        return;
                    },
                    Ok(None) => (),
                    Err(err) => {
                        shared.abort(self.generation, format!("Error waiting for the transcoder: {err}"));
                        return;
                    },
                }
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock(&self.shared).abort(self.generation, String::from("Conversion ended unexpectedly."));
    }
}
