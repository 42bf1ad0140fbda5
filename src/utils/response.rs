use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::engine::ExchangeError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Application error type mapped onto HTTP responses.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl From<ExchangeError> for AppError {
    fn from(error: ExchangeError) -> Self {
        let (status, code) = match &error {
            ExchangeError::UnsupportedInstrument(_) | ExchangeError::InstrumentMissing(_) => {
                (StatusCode::NOT_FOUND, "UNSUPPORTED_INSTRUMENT")
            }
            ExchangeError::InstrumentAlreadyExists(_) => (StatusCode::CONFLICT, "INSTRUMENT_EXISTS"),
            ExchangeError::WrongCredentials(message) if message.ends_with("already exists") => {
                (StatusCode::CONFLICT, "ACCOUNT_EXISTS")
            }
            ExchangeError::WrongCredentials(_) => (StatusCode::NOT_FOUND, "UNKNOWN_ACCOUNT"),
            ExchangeError::AccountNotEmpty(_) => (StatusCode::CONFLICT, "ACCOUNT_NOT_EMPTY"),
            ExchangeError::IncorrectPrice => (StatusCode::BAD_REQUEST, "INCORRECT_PRICE"),
            ExchangeError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            ExchangeError::InsufficientFunds { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_FUNDS")
            }
            ExchangeError::WrongOrderId(_) => (StatusCode::NOT_FOUND, "UNKNOWN_ORDER"),
            ExchangeError::OrderCancellation(_) => (StatusCode::CONFLICT, "CANCELLATION_FAILED"),
            ExchangeError::OrderCreation(_) => (StatusCode::CONFLICT, "CREATION_FAILED"),
        };
        Self::new(status, code, &error.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: self.code,
                message: self.message,
            }),
            timestamp: chrono::Utc::now().timestamp(),
        };
        (self.status, Json(body)).into_response()
    }
}
