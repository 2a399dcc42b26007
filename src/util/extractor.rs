use crate::errors::ApiError;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

/// `axum::extract::Json` with an `ApiError` rejection
#[derive(FromRequest)]
#[from_request(via(axum::extract::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        let Self(value) = self;
        axum::Json(value).into_response()
    }
}

/// `axum::extract::Query` with an `ApiError` rejection
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// [`Json`] followed by `validator` checks
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = ApiError>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// `axum::extract::Path` whose rejections are reported as `ApiError::PathError`.
/// A malformed id such as `/article/detail/abc` becomes a 400, while a route
/// declared with the wrong parameter type is reported as a 500.
pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        use axum::extract::path::ErrorKind::*;
        use ApiError::PathError;

        let rejection = match axum::extract::Path::<T>::from_request_parts(parts, state).await {
            Ok(value) => return Ok(Self(value.0)),
            Err(rejection) => rejection,
        };

        Err(match rejection {
            PathRejection::FailedToDeserializePathParams(inner) => {
                let kind = inner.into_kind();
                match &kind {
                    UnsupportedType { .. } => PathError(500, kind.to_string()),
                    Message(msg) => PathError(400, msg.to_string()),
                    _ => PathError(400, kind.to_string()),
                }
            }
            PathRejection::MissingPathParams(error) => PathError(500, error.to_string()),
            _ => PathError(500, format!("Unhandled path rejection: {rejection}")),
        })
    }
}
