use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use portwatch_core::{PortId, ValidationError, VesselId};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cannot read fleet file {0}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("Fleet file {0} is not valid: {1}")]
    Decode(PathBuf, #[source] serde_json::Error),
    #[error("Vessel {0} does not exist in the store")]
    UnknownVessel(VesselId),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Vessel {0} not found")]
    VesselNotFound(VesselId),
    #[error("Port {0} not found")]
    PortNotFound(PortId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::VesselNotFound(_) | ApiError::PortNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::debug!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
