use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Storage-layer errors shared by the repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref err, ref msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict(
                    msg.clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            other => RepositoryError::Sql(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        RepositoryError::from(e).into()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Database(e) => AppError::Pool(e),
            RepositoryError::Sql(e) => AppError::Database(e),
            RepositoryError::NotFound(_) => AppError::NotFound,
            RepositoryError::Validation(msg) => AppError::BadRequest(msg),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side failures are logged and masked.
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound => "Not found".to_string(),
            AppError::Unauthorized => "Unauthorized".to_string(),
            AppError::Forbidden => "Forbidden".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Conflict(msg) => {
                tracing::warn!("Uniqueness conflict: {}", msg);
                "Conflict".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, self.public_message()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub const AJAX_VALIDATION_MESSAGE: &str = "Validation error";

/// Error for the AJAX endpoints: validation and lookup failures collapse
/// into one fixed string with no field-level detail.
#[derive(Debug)]
pub struct AjaxError(pub AppError);

impl From<AppError> for AjaxError {
    fn from(e: AppError) -> Self {
        AjaxError(e)
    }
}

impl From<RepositoryError> for AjaxError {
    fn from(e: RepositoryError) -> Self {
        AjaxError(e.into())
    }
}

impl From<rusqlite::Error> for AjaxError {
    fn from(e: rusqlite::Error) -> Self {
        AjaxError(e.into())
    }
}

impl From<r2d2::Error> for AjaxError {
    fn from(e: r2d2::Error) -> Self {
        AjaxError(e.into())
    }
}

impl IntoResponse for AjaxError {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::BadRequest(_) | AppError::NotFound => {
                (StatusCode::BAD_REQUEST, AJAX_VALIDATION_MESSAGE).into_response()
            }
            other => other.into_response(),
        }
    }
}

/// Error for the REST API: `{"detail": "..."}` bodies.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        ApiError(e.into())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError(e.into())
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let detail = match self.0 {
            AppError::Unauthorized => "Authentication credentials were not provided.".to_string(),
            AppError::Forbidden => {
                "You do not have permission to perform this action.".to_string()
            }
            other => other.public_message(),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
