use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::LedgerError;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"error": "No pending transactions to mine"}))]
pub struct ErrorResponse {
    /// Human readable description of the failure
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse { error: error.into() }
    }
}

/// Maps a ledger error onto an HTTP status
///
/// Bad input is `400`, a sender without local keys `404`, a refused state
/// transition (including a replayed transaction) `409`.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidAddress(_)
        | LedgerError::SignatureMismatch(_)
        | LedgerError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
        LedgerError::UnknownSigner(_) => StatusCode::NOT_FOUND,
        LedgerError::DuplicateTransaction
        | LedgerError::NoPendingTransactions
        | LedgerError::ChainIntegrityViolation(_) => StatusCode::CONFLICT,
        LedgerError::PersistenceUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the JSON error response for a ledger error
pub fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    HttpResponse::build(status_for(err)).json(ErrorResponse::new(err.to_string()))
}

pub fn bad_request(error: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(error))
}

pub fn internal_error(error: impl Into<String>) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse::new(error))
}
