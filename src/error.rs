use std::time::Duration;

pub type Result<T> = std::result::Result<T, SprintError>;

#[derive(Debug, thiserror::Error)]
pub enum SprintError {
    #[error("could not reach {endpoint}: {source}")]
    Dial {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("proxy rejected {endpoint}: {reason}")]
    Proxy { endpoint: String, reason: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operation exceeded the {0:?} deadline")]
    Timeout(Duration),
    #[error("no catalog server could be probed")]
    SelectionExhausted,
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<SprintError>,
    },
    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand::Error),
    #[error("lookup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
