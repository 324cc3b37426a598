use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::auth::guard;
use crate::auth::password::HashError;
use crate::forms::FieldErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("A user with this {field} already exists")]
    Conflict { field: String },

    #[error("Comments can only be deleted within 20 minutes")]
    CommentTooOld,

    #[error("Account deletion is unavailable")]
    AnonymousUnavailable,

    /// Control-flow exit: the request ends in a redirect, optionally
    /// rewriting the session cookie on the way out.
    #[error("Redirect to {location}")]
    Redirect {
        location: String,
        set_cookie: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(FieldErrors::single(field, message))
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Validation(errors) => {
                let message = errors
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect::<Vec<_>>()
                    .join("\n");
                (StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            AppError::Conflict { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::CommentTooOld => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::AnonymousUnavailable => (StatusCode::CONFLICT, self.to_string()),
            AppError::Redirect {
                location,
                set_cookie,
            } => return guard::redirect(location, set_cookie.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Hash(e) => {
                tracing::error!("Password hashing error: {}", e);
                internal()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
        };

        (status, message).into_response()
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn response_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_returns_422() {
        assert_eq!(
            response_status(AppError::validation("title", "Title is required")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn conflict_names_the_field() {
        let err = AppError::Conflict {
            field: "email".into(),
        };
        assert_eq!(err.to_string(), "A user with this email already exists");
        assert_eq!(response_status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn comment_too_old_returns_400() {
        assert_eq!(
            response_status(AppError::CommentTooOld),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn redirect_carries_location_and_cookie() {
        let response = AppError::Redirect {
            location: "/login?redirectTo=%2Fprofile".into(),
            set_cookie: Some("_session=; Max-Age=0".into()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?redirectTo=%2Fprofile"
        );
        assert_eq!(response.headers()[header::SET_COOKIE], "_session=; Max-Age=0");
    }

    #[test]
    fn anonymous_unavailable_returns_409() {
        assert_eq!(
            response_status(AppError::AnonymousUnavailable),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
