use std::fmt;

/// Crate-wide error type for the operations in §7 that are allowed a typed failure:
/// building the runtime, resolving a descriptor, a store I/O error surfacing during
/// pairing, and firmware download/IO failures.
///
/// Per-device public operations (claim, configure, dispatch, poll-control, …) do not
/// propagate this type to their callers; they collapse it into the boolean-success
/// contract §7 requires and log the classified failure instead.
#[derive(Debug)]
pub enum DriverError {
    /// The upper layer declined to accept a discovered device. Not a failure per §7 —
    /// callers that need to distinguish "rejected" from "erred" should match on this
    /// variant specifically.
    Rejected,
    /// A required external collaborator (`Hal`, `Descriptors`, `Store`) returned an
    /// error or could not be reached.
    Transport(String),
    /// A value failed validation (out-of-range poll interval, malformed endpoint id,
    /// malformed JSON).
    Validation(String),
    /// A contract the caller was expected to uphold was violated (missing
    /// `discoveredDetails` metadata, uncloneable descriptor, null argument).
    Contract(String),
    Io(std::io::Error),
    Http(reqwest::Error),
    Json(serde_json::Error),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Rejected => write!(f, "device rejected by upper driver"),
            DriverError::Transport(msg) => write!(f, "transport error: {msg}"),
            DriverError::Validation(msg) => write!(f, "validation error: {msg}"),
            DriverError::Contract(msg) => write!(f, "contract violation: {msg}"),
            DriverError::Io(e) => write!(f, "io error: {e}"),
            DriverError::Http(e) => write!(f, "http error: {e}"),
            DriverError::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Io(e) => Some(e),
            DriverError::Http(e) => Some(e),
            DriverError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e)
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(e: reqwest::Error) -> Self {
        DriverError::Http(e)
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::Json(e)
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
