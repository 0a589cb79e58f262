use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrickError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed input: bad column count, unparseable number, missing terminator, ...
    Validation,
    /// Well-formed input where nothing survived the domain filters
    EmptyResult,
    /// Ring ids that do not match the requested reordering/deletion scope
    Scope,
    /// Mutually exclusive inputs missing or combined
    Configuration,
    NotFound,
    Io,
    Internal,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct BrickError {
    pub code: ErrorCode,
    pub message: String,
}

impl BrickError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn empty_result(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EmptyResult, message)
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Scope, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl From<std::io::Error> for BrickError {
    fn from(err: std::io::Error) -> Self {
        BrickError::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for BrickError {
    fn from(err: serde_json::Error) -> Self {
        BrickError::new(ErrorCode::Validation, format!("Invalid JSON: {err}"))
    }
}

impl From<csv::Error> for BrickError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            BrickError::new(ErrorCode::Io, err.to_string())
        } else {
            BrickError::validation(format!("Malformed delimited file: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_code_and_message() {
        let err = BrickError::empty_result("no alignments passed the filters");
        let msg = err.to_string();
        assert!(msg.starts_with("EmptyResult"));
        assert!(msg.contains("no alignments passed the filters"));
    }

    #[test]
    fn test_io_error_maps_to_io_code() {
        let err: BrickError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.is(ErrorCode::Io));
    }

    #[test]
    fn test_json_error_maps_to_validation() {
        let err: BrickError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.is(ErrorCode::Validation));
    }
}
