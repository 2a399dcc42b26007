use crate::util::extractor::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::error::ErrorKind;
use std::error::Error;
use std::fmt;
use std::fmt::Debug;
use validator::ValidationErrors;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Debug)]
pub struct ErrorMessage {
    pub code: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),

    PathError(u16, String),

    QueryRejection(QueryRejection),
    JsonRejection(JsonRejection),
    MultiPartError(MultipartError),

    ValidationError(ValidationErrors),

    Sqlx(sqlx::Error),

    Anyhow(anyhow::Error),

    Any(ErrorMessage),
}

impl ApiError {
    pub fn code(&self) -> u16 {
        use ApiError::*;

        match self {
            BadRequest(_) => 400,
            Unauthorized(_) => 401,
            Forbidden(_) => 403,
            NotFound(_) => 404,
            PathError(code, _) => *code,
            QueryRejection(_) | JsonRejection(_) | ValidationError(_) => 400,
            Sqlx(_) | Anyhow(_) => 500,
            MultiPartError(inner) => inner.status().as_u16(),
            Any(message) => message.code,
        }
    }

    fn reason(&self) -> &str {
        let status_code = StatusCode::from_u16(self.code());
        match status_code {
            Ok(status) => status.canonical_reason().unwrap_or("Unknown error"),
            Err(_e) => "Unknown error",
        }
    }

    pub fn message(&self) -> Option<String> {
        use ApiError::*;
        match self {
            BadRequest(msg) | NotFound(msg) | Unauthorized(msg) | Forbidden(msg) => {
                Some(msg.clone())
            }
            PathError(_, message) => Some(message.clone()),
            QueryRejection(error) => Some(error.body_text()),
            JsonRejection(error) => Some(error.body_text()),
            MultiPartError(error) => Some(error.body_text()),
            Sqlx(_) | Anyhow(_) => None,
            ValidationError(err) => Some(err.to_string().replace('\n', "; ")),
            Any(msg) => msg.message.clone(),
        }
    }

    fn to_default_json(&self) -> Response {
        self.to_json(self.code(), self.reason(), self.message().as_deref())
    }

    fn to_json(&self, code: u16, error: &str, message: Option<&str>) -> Response {
        (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(ErrorMessage {
                code,
                error: error.to_string(),
                message: message.map(String::from),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use ApiError::*;
        use ErrorKind::*;

        match self {
            Sqlx(ref error) => {
                tracing::error!("sqlx error: {:?}", error);
                match error {
                    sqlx::Error::Database(dbe) if dbe.constraint().is_some() => match dbe.kind() {
                        UniqueViolation => {
                            self.to_json(409, "Conflict", Some("Unique value already in use"))
                        }
                        ForeignKeyViolation => {
                            self.to_json(400, "Bad Request", Some("Missing related record"))
                        }
                        NotNullViolation => {
                            self.to_json(400, "Bad Request", Some("Missing required field"))
                        }
                        _ => self.to_json(400, "Bad Request", Some("Invalid input value")),
                    },
                    sqlx::Error::RowNotFound => {
                        self.to_json(404, "Not Found", Some("Data not found"))
                    }
                    _ => self.to_default_json(),
                }
            }
            Anyhow(ref error) => {
                tracing::error!("generic error: {:?}", error);
                self.to_default_json()
            }
            Forbidden(ref msg) => {
                tracing::warn!("permission denied: {}", msg);
                self.to_default_json()
            }
            _ => self.to_default_json(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {}", self.reason(), message),
            None => write!(f, "{}", self.reason()),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use ApiError::*;
        match self {
            QueryRejection(err) => Some(err),
            JsonRejection(err) => Some(err),
            MultiPartError(err) => Some(err),
            ValidationError(err) => Some(err),
            Sqlx(err) => Some(err),
            Anyhow(err) => err.source(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Sqlx(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Anyhow(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::QueryRejection(rejection)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::JsonRejection(rejection)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::MultiPartError(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::ValidationError(err)
    }
}

pub fn bad_request(msg: &str) -> ApiError {
    ApiError::BadRequest(msg.to_string())
}

pub fn not_found(msg: &str) -> ApiError {
    ApiError::NotFound(msg.to_string())
}

pub fn forbidden(msg: &str) -> ApiError {
    ApiError::Forbidden(msg.to_string())
}

pub fn any_error(code: u16, error: &str, message: Option<&str>) -> ApiError {
    ApiError::Any(ErrorMessage {
        code,
        error: error.to_string(),
        message: message.map(String::from),
    })
}
