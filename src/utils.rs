use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt::Debug;

pub fn e500<T>(error: T) -> HttpError<T>
where
    T: Debug,
{
    HttpError::InternalServerError(error)
}

pub fn e409<T>(error: T) -> HttpError<T>
where
    T: Debug,
{
    HttpError::Conflict(error)
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError<T>
where
    T: Debug,
{
    #[error("Something went wrong")]
    InternalServerError(T),
    #[error("The request conflicts with work already in progress")]
    Conflict(T),
}

impl<T> IntoResponse for HttpError<T>
where
    T: Debug,
{
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Self::Conflict(_) => StatusCode::CONFLICT.into_response(),
        }
    }
}
