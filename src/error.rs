use askama::Template;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::services::{DataSourceError, RegistryError, SequencerError};

#[derive(Error, Debug)]
pub enum AppError {
    /// A backend call failed after routing picked it; the user gets one retry action
    #[error("{source}")]
    RequestFailed {
        source: DataSourceError,
        retry_to: &'static str,
    },

    #[error("No merchant apps selected")]
    EmptySelection,

    #[error("Provisioning already in progress")]
    AlreadyRunning,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl AppError {
    /// Wraps a data source failure with the page that retries it
    pub fn retry(source: DataSourceError, retry_to: &'static str) -> Self {
        match source {
            DataSourceError::NotFound(what) => AppError::NotFound(what),
            source => AppError::RequestFailed { source, retry_to },
        }
    }
}

impl From<SequencerError> for AppError {
    fn from(e: SequencerError) -> Self {
        match e {
            SequencerError::EmptySelection => AppError::EmptySelection,
            SequencerError::AlreadyRunning => AppError::AlreadyRunning,
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownApp(id) => AppError::NotFound(format!("merchant app {}", id)),
            RegistryError::NoToken(_) | RegistryError::NotPending(_) => {
                AppError::Conflict(e.to_string())
            }
            RegistryError::DataSource(source) => AppError::retry(source, "/manage-tokens"),
        }
    }
}

#[derive(Template)]
#[template(path = "error/retry.html")]
pub struct RetryTemplate {
    pub message: String,
    pub retry_to: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::RequestFailed { source, retry_to } => {
                tracing::warn!(error = %source, retry_to, "Backend request failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    RetryTemplate {
                        message: source.to_string(),
                        retry_to,
                    },
                )
                    .into_response()
            }
            AppError::EmptySelection => Redirect::to("/merchant-apps").into_response(),
            AppError::AlreadyRunning => Redirect::to("/loading-transition").into_response(),
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", what)).into_response()
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::Session(e) => {
                tracing::error!(error = %e, "Session store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
