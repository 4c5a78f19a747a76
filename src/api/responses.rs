//! API request and response structures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::TimerError, state::Timer};

/// Body of `POST /timers`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimerRequest {
    pub name: String,
    pub duration: u64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub halfway_alert: bool,
}

/// Query of `GET /timers`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimerQuery {
    pub category: Option<String>,
}

/// A timer together with its derived display values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    #[serde(flatten)]
    pub timer: Timer,
    pub progress: f64,
    pub remaining_display: String,
}

impl From<Timer> for TimerView {
    fn from(timer: Timer) -> Self {
        Self {
            progress: timer.progress(),
            remaining_display: timer.format_remaining(),
            timer,
        }
    }
}

/// Category summary entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub timers: usize,
}

/// Daemon status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timers: usize,
    pub running: usize,
    pub completed: usize,
    pub scheduler_active: bool,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
    pub warnings: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error body returned for failed operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(message: String) -> Self {
        Self {
            status: "error".to_string(),
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Engine error mapped onto an HTTP status
#[derive(Debug)]
pub struct ApiError(pub TimerError);

impl From<TimerError> for ApiError {
    fn from(error: TimerError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            TimerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TimerError::NotFound(_) => StatusCode::NOT_FOUND,
            TimerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            TimerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.0.to_string()))).into_response()
    }
}
