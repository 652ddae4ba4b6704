//! Error type definitions.
//!
//! `AppError` is the top-level error type returned by every core operation.
//! It carries enough structure that both the web layer (HTTP status) and the
//! progress bus (terminal `error` event message) can derive what they need
//! from the same value, per spec §7's propagation policy.

use thiserror::Error;

/// The error taxonomy from spec §7. Every [`AppError`] variant maps to
/// exactly one kind via [`AppError::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    NotFound,
    Conflict,
    TransientUpstream,
    FatalUpstream,
    CircuitOpen,
    Internal,
}

impl ErrorKind {
    /// HTTP status code a web handler should use for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InputError => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::TransientUpstream => 502,
            ErrorKind::FatalUpstream => 502,
            ErrorKind::CircuitOpen => 503,
            ErrorKind::Internal => 500,
        }
    }
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {message}")]
    InputError { message: String },

    #[error("not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("transient upstream error ({service}): {message}")]
    TransientUpstream { service: String, message: String },

    #[error("fatal upstream error ({service}): {message}")]
    FatalUpstream { service: String, message: String },

    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Storage(#[from] sandboxed_file_manager::SandboxedFileError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InputError { .. } => ErrorKind::InputError,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Conflict { .. } => ErrorKind::Conflict,
            AppError::TransientUpstream { .. } => ErrorKind::TransientUpstream,
            AppError::FatalUpstream { .. } => ErrorKind::FatalUpstream,
            AppError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            AppError::Internal { .. } => ErrorKind::Internal,
            AppError::Repository(_) => ErrorKind::Internal,
            AppError::Http(_) => ErrorKind::TransientUpstream,
            AppError::Io(_) | AppError::Storage(_) => ErrorKind::Internal,
            AppError::Xml(_) => ErrorKind::FatalUpstream,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::InputError { message: message.into() }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound { resource: resource.into(), id: id.into() }
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn transient<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::TransientUpstream { service: service.into(), message: message.into() }
    }

    pub fn fatal_upstream<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::FatalUpstream { service: service.into(), message: message.into() }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Repository layer specific errors.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
