use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The app key '{0}' does not name an ingestion host")]
    UnresolvedHost(String),

    #[error("A self-hosted ingestion host requires a custom host URL")]
    MissingCustomHost,

    #[error("Invalid {0} ({1} seconds)")]
    InvalidInterval(&'static str, f64),

    #[error("The maximum chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("Encountered an error while parsing the YAML configuration ({0})")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to encode event payloads ({0})")]
    Encode(#[from] serde_json::Error),

    #[error(
        "Encountered an IO error while reading the configuration ({})",
        .0.kind()
    )]
    Io(#[from] io::Error),
}

/// Caller misuse of the session lifecycle. Never fatal.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum SessionError {
    #[error("A session ({0}) is already active")]
    AlreadyActive(String),

    #[error("No session is active")]
    NotActive,

    #[error("Session identifiers are managed automatically")]
    ManagedAutomatically,
}

/// A delivery attempt that never produced an HTTP response.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum TransportError {
    #[error("The request timed out")]
    Timeout,

    #[error("Failed to connect ({0})")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}
