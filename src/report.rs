use std::io::Write;

use kdam::{term, tqdm, Bar, BarExt};
use tracing::warn;

use crate::events::{ConversionEvent, Outcome};

const POSTFIX_WIDTH: usize = 60;

/// Presents conversion events to the user.
pub trait Reporter {
    fn event(&mut self, event: &ConversionEvent);
}

/// Human-readable message for a finished conversion.
pub fn outcome_message(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Success => String::from("Conversion completed successfully!"),
        Outcome::Failure { code: Some(code) } => format!("Error: Conversion failed with error code {code}"),
        Outcome::Failure { code: None } => String::from("Error: Conversion failed."),
        Outcome::Canceled => String::from("Conversion canceled."),
    }
}

/// A terminal progress bar from 0 to 100 with the latest status line.
pub struct BarReporter {
    pbar: Bar,
}

impl BarReporter {
    pub fn new(desc: String) -> Self {
        term::init(false);
        let pbar = tqdm!(
            total = 100,
            desc = desc,
            position = 0,
            force_refresh = true
        );
        BarReporter { pbar }
    }
}

impl Reporter for BarReporter {
    fn event(&mut self, event: &ConversionEvent) {
        match event {
            ConversionEvent::Status { text } => {
                self.pbar.set_postfix(truncate(&format!("Converting: {text}"), POSTFIX_WIDTH));
                let _ = self.pbar.refresh();
            },
            ConversionEvent::Progress { percentage } => {
                let _ = self.pbar.update_to(percentage.round() as usize);
            },
            ConversionEvent::Finished { outcome } => {
                if *outcome == Outcome::Success {
                    let _ = self.pbar.update_to(100);
                }
                eprintln!();
                println!("{}", outcome_message(outcome));
            },
        }
    }
}

/// One JSON object per event, for scripts driving the converter.
pub struct JsonReporter<W> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        JsonReporter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// A conversion refused before it started, as a `rejected` event.
    pub fn rejected(&mut self, reason: &str) {
        let line = serde_json::json!({ "event": "rejected", "reason": reason });
        self.write_line(&line.to_string());
    }

    fn write_line(&mut self, line: &str) {
        let written = writeln!(self.out, "{line}").and_then(|_| self.out.flush());
        if let Err(err) = written {
            warn!("unable to write event: {err}");
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn event(&mut self, event: &ConversionEvent) {
        match serde_json::to_string(event) {
            Ok(json) => self.write_line(&json),
            Err(err) => warn!("unable to encode event: {err}"),
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => String::from(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_reporter() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.event(&ConversionEvent::status("Starting conversion..."));
        reporter.event(&ConversionEvent::Progress { percentage: 12.5 });
        reporter.event(&ConversionEvent::Finished { outcome: Outcome::Success });
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out, concat!(
            r#"{"event":"status","text":"Starting conversion..."}"#, "\n",
            r#"{"event":"progress","percentage":12.5}"#, "\n",
            r#"{"event":"finished","outcome":{"result":"success"}}"#, "\n",
        ));
    }

    #[test]
    fn test_json_rejected() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.rejected("\"clip.mov\" does not exist.");
        let out = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(out, concat!(r#"{"event":"rejected","reason":"\"clip.mov\" does not exist."}"#, "\n"));
    }

    #[test]
    fn test_outcome_message() {
        assert_eq!(outcome_message(&Outcome::Failure { code: Some(1) }), "Error: Conversion failed with error code 1");
        assert_eq!(outcome_message(&Outcome::Canceled), "Conversion canceled.");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "0123456789...");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
