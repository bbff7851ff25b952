//! The response served instead of a backend's when none is available.
use axum::{
    body::Body as AxumBody,
    response::{IntoResponse, Response},
};
use http::{StatusCode, header};

/// Body of every fallback response.
pub const FALLBACK_MESSAGE: &str = "Service is Temporarily Unavailable, please try again later";

/// Build the fallback response: `503` with a plain-text apology.
///
/// Stateless; the backend is never contacted.
pub fn respond() -> Response<AxumBody> {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        FALLBACK_MESSAGE,
    )
        .into_response()
}
