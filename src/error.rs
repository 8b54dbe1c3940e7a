use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("No jobs for {worker} in queue {queue}")]
    EmptyQueue { worker: String, queue: String },

    #[error("Unknown worker class: {class}")]
    Resolution { class: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Worker error: {message}")]
    Worker { message: String },

    #[error("Middleware error: {message}")]
    Middleware { message: String },

    #[error("Submit error: {message}")]
    Submit { message: String },

    #[error("Testing is disabled and no submitter is configured")]
    SubmitterUnavailable,

    #[error("Drain exceeded {limit} jobs")]
    DrainLimitExceeded { limit: u64 },

    #[error("Invalid testing mode: {value}")]
    InvalidMode { value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::Config(format!("TOML deserialization error: {}", err))
    }
}

impl From<toml::ser::Error> for HarnessError {
    fn from(err: toml::ser::Error) -> Self {
        HarnessError::Config(format!("TOML serialization error: {}", err))
    }
}

impl HarnessError {
    /// Shorthand for failing a job from worker code.
    pub fn worker(message: impl Into<String>) -> Self {
        HarnessError::Worker {
            message: message.into(),
        }
    }
}
