use reqwest::StatusCode;

/// Failure of a single upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name} request failed: {error}")]
    Request {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },
    #[error("{source_name} request failed with status {status}: {body}")]
    Status {
        source_name: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("failed to parse {source_name} response: {error}")]
    Parse {
        source_name: &'static str,
        #[source]
        error: serde_json::Error,
    },
    #[error("{source_name} response is missing {field}")]
    Missing {
        source_name: &'static str,
        field: &'static str,
    },
}

/// Errors that end a poll.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid forecast request: {0}")]
    Validation(String),
    #[error("grid data unavailable: {0}")]
    FatalSource(#[from] SourceError),
}

/// Revision cache I/O failures; logged, never returned from a poll.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
