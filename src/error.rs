use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single registry API call.
///
/// Callers decide what each variant means for them: a listing skips the
/// entry, a delete reports "nothing to delete" on `NotFound`.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl RequestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RequestError::NotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot load certificate bundle {path}: {message}")]
    Certificate { path: PathBuf, message: String },

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("cannot derive daemon endpoint from {0}")]
    Endpoint(String),

    #[error("exec {0} did not attach an output stream")]
    Detached(String),
}
