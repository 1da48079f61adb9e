use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;
use crate::storage::UploadError;

/// Response envelope used by every endpoint. Failures are signalled in-band
/// via `success: false`, not via the HTTP status line; clients depend on
/// status 200 for everything except unmatched routes.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Success envelope with a payload.
pub fn success<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        message: message.into(),
        data: Some(data),
    })
}

fn failure(message: String) -> HttpResponse {
    HttpResponse::Ok().json(Envelope::<serde_json::Value> {
        success: false,
        message,
        data: None,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    NotFound(String),
    #[error("file exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("only image uploads are allowed")]
    UnsupportedMedia,
    #[error("request timed out")]
    Timeout,
    #[error("internal server error")]
    Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound("resource not found".into()),
            RepoError::Conflict => ApiError::Conflict("resource already exists".into()),
            RepoError::Database(err) => {
                // Driver detail goes to the log, never to the client.
                log::error!("database error: {err}");
                ApiError::Internal
            }
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::UnsupportedMedia => ApiError::UnsupportedMedia,
            UploadError::TooLarge { limit } => ApiError::PayloadTooLarge(limit),
            UploadError::Io(err) => {
                log::error!("upload io error: {err}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        failure(self.to_string())
    }
}
