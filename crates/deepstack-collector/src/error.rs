//! Error types for the collector.

/// Collection failures. Apart from `Launch`, which ends the run before any
/// target is opened, each of these turns one URL's result into
/// `fetch_status = "error"` without stopping the batch.
#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("failed to open browser context: {0}")]
    Context(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("navigation timed out after {0}ms")]
    Timeout(u64),

    #[error("challenge not resolved: {reason} (title {title:?})")]
    ChallengeUnresolved { title: String, reason: String },

    #[error("page not ready: {0}")]
    NotReady(String),
}

/// Failures inside one signal extractor. These degrade a single section of
/// the bundle to `{"error": ...}`.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("runtime evaluation failed: {0}")]
    Runtime(String),

    #[error("unexpected runtime result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("extractor panicked: {0}")]
    Panicked(String),
}

impl From<anyhow::Error> for ExtractError {
    fn from(err: anyhow::Error) -> Self {
        ExtractError::Runtime(format!("{err:#}"))
    }
}
