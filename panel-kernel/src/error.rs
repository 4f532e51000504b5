/**
 * ERREURS API - Traduction des erreurs métier en réponses HTTP
 *
 * RÔLE : Chaque handler retourne `Result<_, ApiError>`; la conversion depuis
 * `ConsoleError` fixe le code HTTP, le corps est toujours `{"error": "..."}`.
 *
 * SÉCURITÉ : les chemins absolus sous la racine confinée ne sortent jamais,
 * seuls les chemins relatifs fournis par le client apparaissent.
 */

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use panel_core::ConsoleError;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="Pi Panel""#),
            );
        }
        response
    }
}

impl From<ConsoleError> for ApiError {
    fn from(error: ConsoleError) -> Self {
        let message = error.to_string();
        match error {
            ConsoleError::AccessDenied => ApiError::Forbidden(message),
            ConsoleError::NotFound { .. } => ApiError::NotFound(message),
            ConsoleError::NotAFile { .. }
            | ConsoleError::NotAFolder { .. }
            | ConsoleError::InvalidName { .. } => ApiError::BadRequest(message),
            ConsoleError::IoFailure { .. } => {
                warn!("I/O failure: {}", message);
                ApiError::Internal(message)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::Internal(format!("{error:#}"))
    }
}
