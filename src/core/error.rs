use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
///
/// Business-rule failures are recovered locally and returned to the caller
/// with no partial state change. The one exception is `PartiallyApplied`,
/// which marks a cross-aggregate sequence that stopped between the receipt
/// write and the collection credit and needs operator reconciliation.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found (or belongs to another school)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payment or receipt amount greater than the collection's current due
    #[error("Amount {attempted} exceeds due amount {due}")]
    ExceedsDue { due: Decimal, attempted: Decimal },

    /// A non-cancelled collection already exists for the billing tuple
    #[error("Duplicate billing: {0}")]
    DuplicateBilling(String),

    /// Conflicting operation (referenced structure, paid collection,
    /// already-cancelled receipt)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not legal from the record's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Receipt number generation exhausted its retries
    #[error("Receipt numbering collision: {0}")]
    NumberingCollision(String),

    /// Receipt persisted but the collection update did not land
    #[error("Partially applied: receipt {receipt_number} persisted but {detail}")]
    PartiallyApplied {
        receipt_number: String,
        detail: String,
    },

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": error_message,
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExceedsDue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateBilling(_) => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NumberingCollision(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PartiallyApplied { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl AppError {
    /// Stable machine-readable kind for response bodies and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::ExceedsDue { .. } => "exceeds_due",
            AppError::DuplicateBilling(_) => "duplicate_billing",
            AppError::Conflict(_) => "conflict",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NumberingCollision(_) => "numbering_collision",
            AppError::PartiallyApplied { .. } => "partially_applied",
            AppError::Database(_) => "database",
            AppError::Json(_) => "json",
            AppError::Configuration(_) => "configuration",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
