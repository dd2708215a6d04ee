use thiserror::Error;

use shared_calendar_service::RemoteError;
use shared_models::error::AppError;

use crate::models::DateRange;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schedule conflict: {message}")]
    Conflict {
        message: String,
        conflicting_range: Option<DateRange>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot definition was changed by someone else: {0}")]
    StaleWrite(String),

    #[error("Calendar service error: {0}")]
    RemoteService(String),
}

impl SchedulingError {
    pub fn conflict(message: impl Into<String>, conflicting_range: Option<DateRange>) -> Self {
        SchedulingError::Conflict {
            message: message.into(),
            conflicting_range,
        }
    }
}

impl From<RemoteError> for SchedulingError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Status { status: 404, body } => SchedulingError::NotFound(body),
            RemoteError::Status { status: 409, body } => SchedulingError::conflict(body, None),
            RemoteError::Status { status: 412, body } => SchedulingError::StaleWrite(body),
            other => SchedulingError::RemoteService(other.to_string()),
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(error: SchedulingError) -> Self {
        match error {
            SchedulingError::Validation(msg) => AppError::ValidationError(msg),
            SchedulingError::Conflict { message, .. } => AppError::Conflict(message),
            SchedulingError::NotFound(msg) => AppError::NotFound(msg),
            SchedulingError::StaleWrite(msg) => AppError::StaleWrite(msg),
            SchedulingError::RemoteService(msg) => AppError::ExternalService(msg),
        }
    }
}
