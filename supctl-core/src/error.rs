use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process {0} not found")]
    NotFound(String),

    #[error("Process {0} is already running")]
    AlreadyRunning(String),

    #[error("Process {0} is already stopped")]
    AlreadyStopped(String),

    #[error("Process {0} is disabled; enable it in the registry and reload")]
    Disabled(String),

    #[error("Registry validation failed: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid process name: {0}")]
    InvalidName(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(unix)]
    #[error("Unix error: {0}")]
    Unix(#[from] nix::errno::Errno),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
