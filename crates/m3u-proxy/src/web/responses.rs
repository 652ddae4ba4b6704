//! HTTP response conventions shared by every handler.
//!
//! One `AppError` taxonomy, one mapping to a status code (spec §7), one JSON
//! envelope — handlers never build their own error responses by hand.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: crate::errors::ErrorKind,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { error: self.to_string(), kind: self.kind() })).into_response()
    }
}

/// Wraps a value created by a `POST` handler with `201 Created`, since the
/// default `Json<T>` response is `200 OK` (spec §6.1 "write endpoints ...
/// return the full entity representation").
pub struct Created<T>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// An operation that was accepted but runs in the background (spec §6.1
/// "async; 202 Accepted"), identified by the `ProgressOperation` id a client
/// can follow on `/api/v1/progress/events`.
#[derive(Serialize)]
pub struct Accepted {
    pub operation_id: crate::models::Id,
}

impl IntoResponse for Accepted {
    fn into_response(self) -> Response {
        (StatusCode::ACCEPTED, Json(self)).into_response()
    }
}
