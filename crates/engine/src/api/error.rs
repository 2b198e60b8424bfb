//! API error type and error reporting.
//!
//! Handlers return [`ApiError`]. The response carries a generic message; the
//! detailed cause rides along in the response extensions so
//! [`report_errors`] can log it once, with request context attached.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::infrastructure::config::Environment;
use crate::infrastructure::database::DbError;
use crate::use_cases::{CharacterError, HandoffError, HudError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("service busy")]
    Busy,
}

/// Cause of a failed response, picked up by [`report_errors`].
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub debug: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound => (StatusCode::BAD_REQUEST, "Not found".to_string()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            ApiError::Busy => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server busy, try again".to_string(),
            ),
        };

        let mut response = (status, message).into_response();
        response.extensions_mut().insert(ErrorReport {
            status,
            debug: self.to_string(),
        });
        response
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<HandoffError> for ApiError {
    fn from(e: HandoffError) -> Self {
        match e {
            HandoffError::MissingToken => ApiError::BadRequest("missing token".to_string()),
            HandoffError::InvalidToken => ApiError::BadRequest(e.to_string()),
            HandoffError::SessionNotFound | HandoffError::PlayerNotFound => ApiError::NotFound,
            HandoffError::Busy => ApiError::Busy,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CharacterError> for ApiError {
    fn from(e: CharacterError) -> Self {
        match e {
            CharacterError::NotFound => ApiError::NotFound,
            CharacterError::Validation(msg) => ApiError::BadRequest(msg),
            CharacterError::UnknownField(field) => {
                ApiError::BadRequest(format!("unknown field: {field}"))
            }
            CharacterError::LegacyUnavailable => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<HudError> for ApiError {
    fn from(e: HudError) -> Self {
        match e {
            HudError::InvalidUrl(_) | HudError::NothingToRegister => {
                ApiError::BadRequest(e.to_string())
            }
            HudError::Db(db) => db.into(),
        }
    }
}

/// Logs every error response with method, URI and peer address.
///
/// Development logs carry the full cause; production logs only the status.
pub async fn report_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    let response = next.run(request).await;

    if let Some(report) = response.extensions().get::<ErrorReport>() {
        let status = report.status.as_u16();
        match environment {
            Environment::Development => tracing::error!(
                %method, %uri, %remote, status, cause = %report.debug,
                "Request failed"
            ),
            Environment::Production if report.status.is_server_error() => {
                tracing::error!(%method, %uri, %remote, status, "Request failed")
            }
            Environment::Production => {
                tracing::warn!(%method, %uri, %remote, status, "Request rejected")
            }
        }
    }
    response
}
