use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use worker::{Request, Response};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Database(String),

    #[error("Server configuration error")]
    Config,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Database(_) | ApiError::Config => 500,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn into_response(self) -> worker::Result<Response> {
        let status = self.status();
        if status >= 500 {
            error!(status, "{self}");
        } else {
            warn!(status, "{self}");
        }

        Ok(Response::from_json(&json!({ "error": self.to_string() }))?.with_status(status))
    }
}

impl From<worker::Error> for ApiError {
    fn from(e: worker::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid payload: {e}"))
    }
}

/// Turns a handler outcome into the response the router hands back.
pub fn finish(result: ApiResult<Response>) -> worker::Result<Response> {
    match result {
        Ok(response) => Ok(response),
        Err(e) => e.into_response(),
    }
}

/// Reads the request body as JSON, reporting a malformed body as a 400.
pub async fn read_json<T: DeserializeOwned>(req: &mut Request) -> ApiResult<T> {
    let body = req
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable body: {e}")))?;

    if body.trim().is_empty() {
        return Err(ApiError::bad_request("Request body is required"));
    }

    Ok(serde_json::from_str(&body)?)
}
