use thiserror::Error;

/// Fatal pipeline errors. Anything here aborts the affected subject's run;
/// per-window and per-segment metric failures are handled locally in
/// `windowed` and never surface as one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A non-baseline segment has an onset but no detectable offset.
    #[error("no offset marker found for segment '{segment}' (onset at {onset}); cannot determine segment end")]
    MissingBoundary { segment: String, onset: f64 },

    /// Resolved boundaries select zero samples; the event annotations are corrupt.
    #[error("segment '{segment}' is empty between {onset} and {offset}")]
    EmptySegment {
        segment: String,
        onset: f64,
        offset: f64,
    },

    /// Malformed configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Input data is not in the expected tabular shape.
    #[error("unexpected input shape: {0}")]
    InputType(String),

    /// An RSA segment carries more than one distinct event name.
    #[error("segment carries {names} distinct event names, expected exactly one")]
    AmbiguousSegment { names: usize },

    /// The RSA segment list violates a precondition (e.g. an empty segment).
    #[error("invalid segment list: {0}")]
    InvalidSegmentList(String),

    /// A gating stage was invoked before the column it depends on exists.
    #[error("gating precondition failed: column '{0}' has not been computed")]
    Precheck(&'static str),

    /// Analysis windows must contain at least one sample.
    #[error("window size must be >= 1 sample, got {0}")]
    InvalidWindowSize(i64),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
