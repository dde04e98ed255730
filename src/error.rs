//! Error taxonomy for the listings cache.
//!
//! Each concern gets its own enum so callers can match on what actually
//! matters to them: the refresher retries on [`FetchError`], the normalizer
//! drops on [`NormalizeError`], startup aborts on [`PersistError`] and the
//! search handler answers `400` on [`QueryError`].

use thiserror::Error;

/// Failure talking to the upstream listings source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {status} for offset {offset}")]
    Status { status: u16, offset: usize },

    /// Response body was not a listings envelope.
    #[error("could not decode page at offset {offset}: {message}")]
    Decode { offset: usize, message: String },

    /// Envelope decoded fine but carried an error list.
    #[error("upstream reported errors at offset {offset}: {}", .errors.join("; "))]
    Upstream { offset: usize, errors: Vec<String> },
}

/// Why a raw listing could not become a queryable [`crate::ingest::types::Listing`].
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("listing {event_id} has no {field}")]
    MissingCoordinate { event_id: i64, field: &'static str },

    #[error("listing {event_id} has unparseable {field} {value:?}")]
    InvalidCoordinate {
        event_id: i64,
        field: &'static str,
        value: String,
    },

    #[error("listing {event_id} could not be serialized: {message}")]
    Serialize { event_id: i64, message: String },
}

/// Failure loading or saving a persisted snapshot.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Client-side problem with a search request.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("swlat, swlng, nelat and nelng required (missing {0})")]
    Missing(&'static str),

    #[error("{name} must be a number, got {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("swlat, swlng, nelat and nelng required ({0} is zero)")]
    Zero(&'static str),
}
