//! Error taxonomy shared by every handler and middleware.
//!
//! Handlers return [`AppError`]; its `IntoResponse` impl renders the terse
//! production body and attaches an [`ErrorReport`] so that
//! [`classify_errors`] can swap in the verbose body in development.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::config::Environment;

const GENERIC_MESSAGE: &str = "Something went wrong! please try again";

/// One failed field check from record validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join(". ")
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid input data: {}", join_messages(.0))]
    Validation(Vec<FieldError>),

    #[error("Duplicate value for {field}: {value}. Please use another value!")]
    DuplicateKey { field: String, value: String },

    #[error("invalid value {path}: {value}")]
    InvalidId { path: &'static str, value: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("JWT has expired, please login again!")]
    ExpiredToken,

    #[error("Invalid token, please try again!")]
    InvalidToken,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Raised deliberately with its own status code.
    #[error("{message}")]
    Operational {
        status_code: StatusCode,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Normalized view of an error: what the client is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub status_code: StatusCode,
    pub status: &'static str,
    pub message: String,
    pub operational: bool,
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    pub fn classify(&self) -> Classified {
        let (status_code, operational) = match self {
            AppError::Validation(_)
            | AppError::DuplicateKey { .. }
            | AppError::InvalidId { .. }
            | AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, true),
            AppError::Unauthorized(_) | AppError::ExpiredToken | AppError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, true)
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, true),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, true),
            AppError::Operational { status_code, .. } => (*status_code, true),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, false),
        };
        let message = if operational {
            self.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        };
        Classified {
            status_code,
            status: status_label(status_code),
            message,
            operational,
        }
    }

    fn field_errors(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(errors) => Some(json!(errors)),
            AppError::DuplicateKey { field, value } => {
                let mut map = serde_json::Map::new();
                map.insert(field.clone(), json!(value));
                Some(map.into())
            }
            _ => None,
        }
    }
}

fn status_label(code: StatusCode) -> &'static str {
    if code.is_client_error() {
        "fail"
    } else {
        "error"
    }
}

/// Full internal detail of an error response, carried in the response
/// extensions until [`classify_errors`] decides what to expose.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status_code: StatusCode,
    pub status: &'static str,
    pub message: String,
    pub stack: String,
    pub errors: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let classified = self.classify();
        if !classified.operational {
            error!(error = ?self, "unhandled error");
        } else if classified.status_code.is_server_error() {
            error!(error = %self, "operational error");
        } else {
            warn!(status = %classified.status_code, error = %self, "request failed");
        }

        let report = ErrorReport {
            status_code: classified.status_code,
            status: classified.status,
            message: self.to_string(),
            stack: format!("{self:?}"),
            errors: self.field_errors(),
        };

        let mut res = (
            classified.status_code,
            Json(json!({
                "status": classified.status,
                "message": classified.message,
            })),
        )
            .into_response();
        res.extensions_mut().insert(report);
        res
    }
}

/// Outermost error middleware. Production keeps the terse body built by
/// `AppError::into_response`; development replaces it with the full report.
pub async fn classify_errors(
    State(environment): State<Environment>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let Some(report) = res.extensions_mut().remove::<ErrorReport>() else {
        return res;
    };
    if environment.is_production() {
        return res;
    }
    (
        report.status_code,
        Json(json!({
            "status": report.status,
            "message": report.message,
            "stackTrace": report.stack,
            "error": report.errors,
        })),
    )
        .into_response()
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejection (bad syntax, wrong content type, mistyped field)
/// is reported as an [`AppError`] like every other failure.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Response used by `CatchPanicLayer` for a panicking handler.
pub fn panic_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    AppError::Internal(anyhow::anyhow!("request handler panicked")).into_response()
}
