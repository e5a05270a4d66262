use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use human_repr::HumanCount;
use rustop::opts;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use convert_mp4::config::Config;
use convert_mp4::error::PreflightError;
use convert_mp4::events::{ConversionEvent, Outcome};
use convert_mp4::ffmpeg::Tool;
use convert_mp4::fstools::{classify_file, default_output_path, file_size, DirEntryCategory};
use convert_mp4::quality::Quality;
use convert_mp4::report::{BarReporter, JsonReporter, Reporter};
use convert_mp4::supervisor::Supervisor;
use convert_mp4::transcode_state::ConversionRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    let (args, _rest) = opts! {
        synopsis "Convert a video to H.264/AAC mp4 with ffmpeg";
        opt quality:String=String::from("high"), desc:"Quality profile. [low, medium, high, original]";
        opt config:Option<String>, desc:"JSON config file with tool paths and codec defaults.";
        opt force:bool=false, desc:"Overwrite the output file if it already exists.";
        opt json:bool=false, desc:"Print events as JSON lines instead of a progress bar.";
        opt check:bool=false, desc:"Show transcoder and probe tool status, then exit.";
        param infile:Option<String>, desc:"Input video file";
        param outfile:Option<String>, desc:"Output file (defaults to the input with an .mp4 extension)";
    }.parse_or_exit();

    init_logging();
    let json = args.json;

    let config = match Config::load(args.config.as_deref().map(Path::new)) {
        Ok(config) => config,
        Err(err) => return reject(json, &err.to_string()),
    };

    if args.check {
        return show_check(&config);
    }

    if let Err(err) = config.validate() {
        return reject(json, &err.to_string());
    }

    let quality = match args.quality.parse::<Quality>() {
        Ok(quality) => quality,
        Err(err) => return reject(json, &err.to_string()),
    };

    let Some(infile) = args.infile else {
        return reject(json, "Please select an input file.");
    };
    let input = PathBuf::from(infile);
    match classify_file(&input) {
        DirEntryCategory::RegularFile | DirEntryCategory::SymbolicLink => (),
        DirEntryCategory::DoesNotExist => {
            return reject(json, &format!("{:?} does not exist.", input));
        },
        DirEntryCategory::Directory => {
            return reject(json, &format!("{:?} is a directory.", input));
        },
        DirEntryCategory::Unknown => {
            return reject(json, &format!("Unable to classify {:?}.", input));
        },
    }

    let output = args.outfile.map(PathBuf::from).unwrap_or_else(|| default_output_path(&input));
    if output == input {
        return reject(json, "Input and output are the same file.");
    }
    if output.exists() && !args.force {
        return reject(json, &format!("{:?} already exists. Use --force to overwrite it.", output));
    }

    let desc = format!("{} ({})", display_name(&input), file_size(&input).unwrap_or(0).human_count_bytes());
    let mut reporter: Box<dyn Reporter> = if json {
        Box::new(JsonReporter::new(std::io::stdout()))
    } else {
        Box::new(BarReporter::new(desc))
    };

    match convert(config, ConversionRequest::new(input, output.clone(), quality), reporter.as_mut()) {
        Err(err) => reject(json, &err.to_string()),
        Ok(Outcome::Success) => {
            if !json {
                if let Some(size) = file_size(&output) {
                    println!("{} ({})", output.display(), size.human_count_bytes());
                }
            }
            ExitCode::SUCCESS
        },
        Ok(_) => ExitCode::FAILURE,
    }
}

/// Reports a conversion refused before it started. Diagnostics go to stderr
/// so a JSON event stream on stdout stays parseable.
fn reject(json: bool, reason: &str) -> ExitCode {
    eprintln!("{reason}");
    if json {
        JsonReporter::new(std::io::stdout()).rejected(reason);
    }
    ExitCode::FAILURE
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs one conversion to its end, or returns why it never started.
fn convert(config: Config, request: ConversionRequest, reporter: &mut dyn Reporter) -> Result<Outcome, PreflightError> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            warn!(signal, "unable to register signal handler: {err}");
        }
    }

    let supervisor = Supervisor::new(config);
    let events = supervisor.subscribe();
    supervisor.start(request)?;

    loop {
        if stop.swap(false, Ordering::Relaxed) {
            supervisor.cancel();
        }
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                reporter.event(&event);
                if let ConversionEvent::Finished { outcome } = event {
                    return Ok(outcome);
                }
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(Outcome::Failure { code: None }),
        }
    }
}

fn show_check(config: &Config) -> ExitCode {
    let transcoder = Tool::new(&config.transcoder_path);
    let probe = Tool::new(&config.probe_path);
    for (name, tool) in [("FFmpeg", &transcoder), ("FFprobe", &probe)] {
        let status = match (tool.exists(), tool.is_installed()) {
            (false, _) => "Not Found",
            (true, false) => "Found (not working)",
            (true, true) => "Found",
        };
        println!("{name} Status: {status}");
        println!("Path: {}", tool.path().display());
    }
    if transcoder.is_installed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().unwrap_or(path.as_os_str()).to_string_lossy().into_owned()
}
