//! Shared utilities for the image handlers.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use card_common::CardError;
use renderer::{codec, ImageFormat, Pixmap};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, warn};

use crate::metrics::{ImageKind, MetricsCollector, Stage, Timer};
use crate::run_blocking;

// ============================================================================
// Errors
// ============================================================================

/// A [`CardError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CardError);

impl From<CardError> for ApiError {
    fn from(err: CardError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self.0, status = status.as_u16(), "Request rejected");
        }

        // Bad requests carry their reason verbatim, everything else the full error
        let body = match self.0 {
            CardError::InvalidRequest(message) => message,
            other => other.to_string(),
        };
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Cancellation
// ============================================================================

/// Cancellation scope of one request.
///
/// The token is cancelled when the scope drops, which happens when the client
/// disconnects or the timeout layer gives up on the handler future. Lock waits and
/// fetches started with the token stop at that point.
pub struct RequestScope {
    token: CancellationToken,
    _guard: DropGuard,
}

impl RequestScope {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            token,
            _guard: guard,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Responses
// ============================================================================

pub fn image_response(bytes: Vec<u8>, format: ImageFormat) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        bytes,
    )
        .into_response()
}

/// Encode `pixmap` off the async runtime and record the encode time.
pub async fn encode(
    metrics: &MetricsCollector,
    pixmap: Pixmap,
    format: ImageFormat,
) -> Result<Vec<u8>, CardError> {
    let timer = Timer::start();
    let bytes = run_blocking(move || codec::encode(&pixmap, format)).await?;
    metrics.record_stage(Stage::Encode, timer.elapsed_us()).await;
    Ok(bytes)
}

/// Record the outcome of a whole image request.
pub async fn finish(
    metrics: &MetricsCollector,
    kind: ImageKind,
    timer: &Timer,
    result: ApiResult<(Vec<u8>, ImageFormat)>,
) -> ApiResult<Response> {
    match result {
        Ok((bytes, format)) => {
            metrics
                .record_render(kind, timer.elapsed_us(), Some(bytes.len()))
                .await;
            Ok(image_response(bytes, format))
        }
        Err(e) => {
            metrics.record_render(kind, timer.elapsed_us(), None).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (CardError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (CardError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                CardError::LockTimeout {
                    key: "k".into(),
                    timeout_ms: 10,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CardError::RenderFailed("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
        assert_eq!(
            ApiError(CardError::Cancelled("k".into())).into_response().status().as_u16(),
            499
        );
    }

    #[test]
    fn test_scope_cancels_on_drop() {
        let scope = RequestScope::new();
        let token = scope.token().clone();
        assert!(!token.is_cancelled());
        drop(scope);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_image_response_content_type() {
        let response = image_response(vec![1, 2, 3], ImageFormat::Jpeg { quality: 100 });
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    }
}
