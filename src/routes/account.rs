/// Account Routes
///
/// Activation links and the forgotten-password flow. None of these require
/// a signed-in user; possession of the emailed token is the proof.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AccountService;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// GET /api/v1/users/activate?token=...
///
/// # Errors
/// - 404: Unknown token
/// - 400: Token expired or already used
pub async fn activate(
    query: web::Query<TokenQuery>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.activate(&query.token).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Account activated")))
}

/// POST /api/v1/users/activation/resend
///
/// Always 202 for a well-formed request so callers cannot tell which emails exist.
pub async fn resend_activation(
    form: web::Json<EmailRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.resend_activation(&form.email).await?;
    Ok(HttpResponse::Accepted().json(MessageResponse::new(
        "If the account exists and is not active, an activation link was sent",
    )))
}

/// POST /api/v1/users/forgot-password
pub async fn forgot_password(
    form: web::Json<EmailRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.request_password_reset(&form.email).await?;
    Ok(HttpResponse::Accepted().json(MessageResponse::new(
        "If the account exists, a password reset link was sent",
    )))
}

/// POST /api/v1/users/reset-password
///
/// Sets the new password and signs the user out everywhere.
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts
        .confirm_password_reset(&form.token, &form.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password has been reset")))
}
