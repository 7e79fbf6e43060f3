use std::fmt::Display;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::clients::storage::StorageError;
use crate::featuring::PromotionError;
use crate::filters::FilterError;
use crate::form::{FormError, FormReadError};
use crate::leasing::LeaseError;
use crate::photos::PhotoOrderError;
use crate::pricing::PricingError;

/// Error returned by every handler; renders as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    /// Maps an unexpected failure to a 500 reading `Error <action>: <cause>`.
    pub fn internal<E: Display>(action: &'static str) -> impl FnOnce(E) -> ApiError {
        move |err| {
            log::error!("Error {action}: {err}");
            ApiError::Internal(format!("Error {action}: {err}"))
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = self.to_string();
        HttpResponse::build(self.status_code()).json(ErrorBody { message: &message })
    }
}

macro_rules! bad_request_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for ApiError {
                fn from(err: $source) -> Self {
                    ApiError::BadRequest(err.to_string())
                }
            }
        )+
    };
}

bad_request_from!(
    PricingError,
    FilterError,
    FormError,
    PhotoOrderError,
    LeaseError,
    PromotionError,
);

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::BadRequest(format!("Validation failed: {err}"))
    }
}

impl From<FormReadError> for ApiError {
    fn from(err: FormReadError) -> Self {
        match err {
            FormReadError::Multipart(_) => ApiError::BadRequest(err.to_string()),
            FormReadError::FieldTooLarge { .. } | FormReadError::TooLarge(_) => {
                ApiError::PayloadTooLarge(err.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::internal("uploading photos")(err)
    }
}
