/// Application Error Handling
///
/// One error type, `AppError`, crosses every service boundary. It is layered:
/// 1. Domain-specific error enums (validation, auth, one-time tokens, roles, conflicts)
/// 2. The unified `AppError` wrapping them, plus not-found / timeout / internal
/// 3. A coarse `ErrorKind` taxonomy used for status mapping and assertions
/// 4. HTTP response mapping with structured logging

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

// ============================================================================
// 1. DOMAIN-SPECIFIC ERROR TYPES
// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Missing or malformed authorization header")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,
}

/// Failures when consuming an activation or password-reset token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OneTimeTokenError {
    #[error("Token not found")]
    NotFound,
    #[error("Token has expired")]
    Expired,
    #[error("Token has already been used")]
    AlreadyUsed,
}

/// Role transition failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleError {
    #[error("user is already an admin")]
    AlreadyAdmin,
    #[error("user is not an admin")]
    NotAdmin,
    #[error("user is unverified")]
    Unverified,
    #[error("admin can not demote themself")]
    CannotDemoteSelf,
    #[error("superadmin role cannot be changed")]
    Protected,
}

/// Uniqueness violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("username already taken")]
    UsernameTaken,
    #[error("email already exists")]
    EmailAlreadyExists,
    #[error("duplicate {0}")]
    Duplicate(String),
}

// ============================================================================
// 2. UNIFIED APPLICATION ERROR TYPE
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    OneTimeToken(#[from] OneTimeTokenError),
    #[error(transparent)]
    Role(#[from] RoleError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The coarse error taxonomy every `AppError` projects onto
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidCredentials,
    InvalidToken,
    Expired,
    AlreadyUsed,
    Unauthorized,
    Forbidden,
    Conflict,
    ValidationFailed,
    Internal,
    Timeout,
}

impl AppError {
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::ValidationFailed,
            AppError::Auth(AuthError::InvalidCredentials) => ErrorKind::InvalidCredentials,
            AppError::Auth(AuthError::InvalidToken) => ErrorKind::InvalidToken,
            AppError::Auth(AuthError::Unauthorized) => ErrorKind::Unauthorized,
            AppError::Auth(AuthError::Forbidden) => ErrorKind::Forbidden,
            AppError::OneTimeToken(OneTimeTokenError::NotFound) => ErrorKind::NotFound,
            AppError::OneTimeToken(OneTimeTokenError::Expired) => ErrorKind::Expired,
            AppError::OneTimeToken(OneTimeTokenError::AlreadyUsed) => ErrorKind::AlreadyUsed,
            AppError::Role(RoleError::AlreadyAdmin | RoleError::NotAdmin) => ErrorKind::Conflict,
            AppError::Role(
                RoleError::Unverified | RoleError::CannotDemoteSelf | RoleError::Protected,
            ) => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(AuthError::InvalidCredentials) => "INVALID_CREDENTIALS",
            AppError::Auth(AuthError::InvalidToken) => "TOKEN_INVALID",
            AppError::Auth(AuthError::Unauthorized) => "UNAUTHORIZED",
            AppError::Auth(AuthError::Forbidden) => "FORBIDDEN",
            AppError::OneTimeToken(OneTimeTokenError::NotFound) => "TOKEN_NOT_FOUND",
            AppError::OneTimeToken(OneTimeTokenError::Expired) => "TOKEN_EXPIRED",
            AppError::OneTimeToken(OneTimeTokenError::AlreadyUsed) => "TOKEN_ALREADY_USED",
            AppError::Role(RoleError::AlreadyAdmin) => "ALREADY_ADMIN",
            AppError::Role(RoleError::NotAdmin) => "NOT_ADMIN",
            AppError::Role(RoleError::Unverified) => "USER_UNVERIFIED",
            AppError::Role(RoleError::CannotDemoteSelf) => "CANNOT_DEMOTE_SELF",
            AppError::Role(RoleError::Protected) => "ROLE_PROTECTED",
            AppError::Conflict(ConflictError::UsernameTaken) => "USERNAME_TAKEN",
            AppError::Conflict(ConflictError::EmailAlreadyExists) => "EMAIL_EXISTS",
            AppError::Conflict(ConflictError::Duplicate(_)) => "DUPLICATE_ENTRY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Timeout(_) => "The request timed out, please try again later".to_string(),
            AppError::Auth(AuthError::InvalidToken) => "Invalid or expired token".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("record".to_string()),
            sqlx::Error::PoolTimedOut => AppError::Timeout("database pool".to_string()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                let constraint = db_err.constraint().unwrap_or("unique constraint").to_string();
                AppError::Conflict(ConflictError::Duplicate(constraint))
            }
            other => AppError::Internal(format!("database error: {}", other)),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationFailed | ErrorKind::Expired | ErrorKind::AlreadyUsed => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidCredentials | ErrorKind::InvalidToken | ErrorKind::Unauthorized => {
            StatusCode::UNAUTHORIZED
        }
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = status_for(self.kind());
        let response = ErrorResponse::new(
            request_id.to_string(),
            self.public_message(),
            self.code().to_string(),
            status.as_u16(),
        );
        (status, response)
    }

    fn log_error(&self, request_id: &str) {
        match self.kind() {
            ErrorKind::Internal | ErrorKind::Timeout => {
                tracing::error!(request_id = request_id, error = %self, "Request failed");
            }
            ErrorKind::InvalidCredentials | ErrorKind::InvalidToken | ErrorKind::Unauthorized => {
                tracing::warn!(request_id = request_id, error = %self, "Authentication error");
            }
            ErrorKind::Forbidden => {
                tracing::warn!(request_id = request_id, error = %self, "Authorization error");
            }
            _ => {
                tracing::info!(request_id = request_id, error = %self, "Request rejected");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn log_error(&self, error: &AppError) {
        match error.kind() {
            ErrorKind::Internal | ErrorKind::Timeout => tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                error = %error,
                "Operation failed"
            ),
            _ => tracing::warn!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                error = %error,
                "Operation rejected"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email");
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = ValidationError::InvalidFormat("username").into();
        assert_eq!(app_err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn test_role_errors_map_to_taxonomy() {
        assert_eq!(AppError::from(RoleError::AlreadyAdmin).kind(), ErrorKind::Conflict);
        assert_eq!(AppError::from(RoleError::NotAdmin).kind(), ErrorKind::Conflict);
        assert_eq!(AppError::from(RoleError::CannotDemoteSelf).kind(), ErrorKind::Forbidden);
        assert_eq!(AppError::from(RoleError::Unverified).kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ResponseError::status_code(&AppError::from(AuthError::InvalidToken)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ResponseError::status_code(&AppError::from(ConflictError::UsernameTaken)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ResponseError::status_code(&AppError::Timeout("users.find".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ResponseError::status_code(&AppError::from(OneTimeTokenError::Expired)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::internal("connection refused to 10.0.0.3");
        let (status, body) = ErrorHandler::error_response(&err, "req-1");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("10.0.0.3"));
        assert_eq!(body.code, "INTERNAL_ERROR");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id("user-123");
        assert_eq!(ctx_with_user.user_id, Some("user-123".to_string()));
    }
}
