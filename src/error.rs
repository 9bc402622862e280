//! Error taxonomies for the LDP surface and the pod lifecycle.

use std::io;

use thiserror::Error;

use crate::http::response::{Response, StatusCode};

/// A failed LDP request. Every variant maps onto exactly one status code.
#[derive(Debug, Error)]
pub enum LdpError {
    #[error("path escapes the pod root")]
    PathViolation,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal error: {0}")]
    Internal(#[from] io::Error),
}

impl LdpError {
    pub fn status(&self) -> StatusCode {
        match self {
            LdpError::PathViolation => StatusCode::Forbidden,
            LdpError::NotFound => StatusCode::NotFound,
            LdpError::Validation(_) => StatusCode::BadRequest,
            LdpError::Conflict(_) => StatusCode::Conflict,
            LdpError::MethodNotAllowed => StatusCode::MethodNotAllowed,
            LdpError::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Renders the error as a plain-text response. Internal details stay in
    /// the logs and are not sent to the client.
    pub fn into_response(self) -> Response {
        let status = self.status();
        match self {
            LdpError::Internal(_) => Response::internal_error(),
            LdpError::NotFound => Response::not_found(),
            other => Response::text(status, other.to_string()),
        }
    }
}

/// A pod listener could not be started.
#[derive(Debug, Error)]
pub enum PodError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("invalid TLS material: {0}")]
    Tls(String),
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate generation failed: {0}")]
    Generation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("state file is malformed: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// A rejected or failed control-plane operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no pod named {0:?}")]
    NotFound(String),
    #[error("a pod named {0:?} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::NotFound(_) => StatusCode::NotFound,
            RegistryError::AlreadyExists(_) => StatusCode::Conflict,
            RegistryError::Invalid(_) => StatusCode::BadRequest,
            RegistryError::Pod(_) | RegistryError::Certificate(_) | RegistryError::Store(_) => {
                StatusCode::InternalServerError
            }
        }
    }
}
