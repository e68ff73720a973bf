// src/core/errors.rs

//! The error taxonomy shared by the Name Server and Storage Server, mapped
//! onto the numeric status codes carried on the wire.

use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("locked")]
    Locked,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("busy")]
    Busy,

    #[error("out of scope")]
    OutOfScope,

    #[error("already exists")]
    AlreadyExists,

    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("line exceeds maximum length")]
    LineTooLong,

    #[error("malformed request: {0}")]
    Protocol(String),
}

impl FsError {
    /// The numeric status code carried on the wire, per the status code table.
    pub fn status_code(&self) -> i32 {
        match self {
            FsError::NotFound => 1,
            FsError::Unauthorized => 2,
            FsError::Locked => 3,
            FsError::BadRequest(_) => 4,
            FsError::Conflict => 5,
            FsError::Internal(_) => 6,
            FsError::Busy => 7,
            FsError::OutOfScope => 8,
            FsError::AlreadyExists => 9,
            // A framing or connection-level failure while proxying is surfaced as Internal.
            FsError::Io(_) | FsError::LineTooLong | FsError::Protocol(_) => 6,
        }
    }
}

impl Clone for FsError {
    fn clone(&self) -> Self {
        match self {
            FsError::NotFound => FsError::NotFound,
            FsError::Unauthorized => FsError::Unauthorized,
            FsError::Locked => FsError::Locked,
            FsError::BadRequest(s) => FsError::BadRequest(s.clone()),
            FsError::Conflict => FsError::Conflict,
            FsError::Internal(s) => FsError::Internal(s.clone()),
            FsError::Busy => FsError::Busy,
            FsError::OutOfScope => FsError::OutOfScope,
            FsError::AlreadyExists => FsError::AlreadyExists,
            FsError::Io(e) => FsError::Io(Arc::clone(e)),
            FsError::LineTooLong => FsError::LineTooLong,
            FsError::Protocol(s) => FsError::Protocol(s.clone()),
        }
    }
}

impl PartialEq for FsError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FsError::BadRequest(a), FsError::BadRequest(b)) => a == b,
            (FsError::Internal(a), FsError::Internal(b)) => a == b,
            (FsError::Protocol(a), FsError::Protocol(b)) => a == b,
            (FsError::Io(a), FsError::Io(b)) => a.to_string() == b.to_string(),
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for FsError {
    fn from(e: serde_json::Error) -> Self {
        FsError::Protocol(e.to_string())
    }
}

pub type FsResult<T> = Result<T, FsError>;
