//! Centralized error handling.
//!
//! Errors are organized around the taxonomy of kinds the pipeline reasons
//! about (input / not-found / conflict / transient-upstream / fatal-upstream
//! / circuit-open / internal), not around the language's type hierarchy.
//! Each variant of [`AppError`] maps to exactly one [`ErrorKind`] so the web
//! layer can derive an HTTP status without re-deriving the classification.

pub mod types;

pub use types::*;

/// Convenience alias for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
