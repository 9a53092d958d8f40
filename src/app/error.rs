use crate::app::server::Status;
use std::io;
use thiserror::Error;

/// Why a single request could not be answered normally.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Invalid project")]
    UnknownProject,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid path")]
    InvalidPath,

    #[error("Malformed request")]
    MalformedRequest,

    /// Carries the OS error text back to the client.
    #[error("/{path}: {source}")]
    PathRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("404 page not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Too many connections")]
    Busy,
}

impl ServeError {
    pub fn path_read(path: &str, source: io::Error) -> Self {
        ServeError::PathRead {
            path: path.to_string(),
            source,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ServeError::UnknownProject | ServeError::InvalidPath | ServeError::MalformedRequest => {
                Status::BadRequest
            }
            ServeError::AccessDenied => Status::Forbidden,
            ServeError::NotFound => Status::NotFound,
            ServeError::MethodNotAllowed => Status::MethodNotAllowed,
            ServeError::Busy => Status::ServiceUnavailable,
            ServeError::PathRead { .. } | ServeError::Encode(_) => Status::InternalServerError,
        }
    }
}
