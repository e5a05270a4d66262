use serde::Serialize;

/// How a conversion ended. Exactly one is reported per run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// `code` is `None` when the transcoder died from a signal or the run
    /// failed for a reason of our own.
    Failure { code: Option<i32> },
    Canceled,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConversionEvent {
    Status { text: String },
    Progress { percentage: f64 },
    Finished { outcome: Outcome },
}

impl ConversionEvent {
    pub fn status(text: impl Into<String>) -> Self {
        ConversionEvent::Status { text: text.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionEvent::Finished { .. })
    }
}
