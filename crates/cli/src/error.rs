use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("no ready device attached")]
    NoDevice,

    #[error(
        "{count} ready devices attached, pass a serial to pick one: {serials}",
        serials = .candidates.join(", ")
    )]
    AmbiguousDevice { count: usize, candidates: Vec<String> },

    #[error("device {serial} is not a {required} device")]
    TransportMismatch {
        serial: String,
        required: &'static str,
    },

    #[error("invalid value for --max-size: {0} (expected a pixel count or \"native\")")]
    InvalidMaxSize(String),

    #[error(transparent)]
    Runtime(#[from] mircast_runtime::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
