//! Error types for the automation pipelines.
//!
//! Whole-batch operations (catalog listing, CSV export) fail fast with a
//! [`PipelineError`]; per-object operations (bulk download) collect
//! [`TransferError`]s into their result set instead of aborting. Each
//! [`PipelineError`] kind maps to one process exit code so callers can
//! branch on the failure kind instead of parsing log text.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while talking to the object-storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("credential error: {0}")]
    Credentials(String),

    #[error("{operation} failed with HTTP {status}: {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} transport error: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned an unreadable response: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },
}

/// Failure while talking to the storefront GraphQL endpoint.
///
/// Every transport- or API-level problem ends up here as a value; the
/// client never lets one escape as a panic.
#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("storefront credentials missing: {0}")]
    Credentials(String),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("storefront returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("GraphQL errors: {}", messages.join("; "))]
    Api { messages: Vec<String> },

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

/// Failure while talking to the embedding encoder service.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("encoder endpoint not configured: {0}")]
    Unconfigured(String),

    #[error("encoder request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("encoder returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("encoder returned an unreadable response: {0}")]
    Decode(String),
}

/// Per-object download failure. Collected into the batch result set,
/// never raised across the batch.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object key {0:?} would escape the destination directory")]
    UnsafeKey(String),

    #[error("transfer task aborted: {0}")]
    Aborted(String),
}

/// Mismatched inputs to the similarity math.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SimilarityError {
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("no embeddings to compare")]
    Empty,
}

/// The top-level failure taxonomy. One process exit code per kind.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("storage backend unavailable: {source}")]
    BackendUnavailable {
        #[source]
        source: StoreError,
    },

    #[error("destination {path} does not exist or is not a directory")]
    InvalidDestination { path: PathBuf },

    #[error("unsupported data shape for CSV export: {reason}")]
    UnsupportedShape { reason: String },

    #[error("failed writing {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer failed for {key}: {reason}")]
    TransferFailure { key: String, reason: String },

    #[error("storefront {operation} failed: {source}")]
    TransportFailure {
        operation: String,
        #[source]
        source: StorefrontError,
    },
}

impl PipelineError {
    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::BackendUnavailable { .. } => 2,
            PipelineError::InvalidDestination { .. } => 3,
            PipelineError::UnsupportedShape { .. } => 4,
            PipelineError::IoFailure { .. } => 5,
            PipelineError::TransferFailure { .. } => 6,
            PipelineError::TransportFailure { .. } => 7,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(source: StoreError) -> Self {
        PipelineError::BackendUnavailable { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let errors = vec![
            PipelineError::BackendUnavailable {
                source: StoreError::Credentials("missing key".into()),
            },
            PipelineError::InvalidDestination {
                path: PathBuf::from("/nope"),
            },
            PipelineError::UnsupportedShape {
                reason: "scalar".into(),
            },
            PipelineError::IoFailure {
                path: PathBuf::from("/tmp/out.csv"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            },
            PipelineError::TransferFailure {
                key: "a.3mf".into(),
                reason: "1 of 3 transfers failed".into(),
            },
            PipelineError::TransportFailure {
                operation: "list_creations".into(),
                source: StorefrontError::Http {
                    status: 502,
                    body: "bad gateway".into(),
                },
            },
        ];

        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len(), "every kind needs its own code");
    }

    #[test]
    fn backend_unavailable_preserves_the_cause() {
        let err: PipelineError = StoreError::Http {
            operation: "list objects",
            status: 403,
            body: "forbidden".into(),
        }
        .into();
        assert!(err.to_string().contains("storage backend unavailable"));
        assert!(format!("{:?}", err).contains("403"));
    }
}
