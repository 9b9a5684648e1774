/// Authentication Routes
///
/// Registration, login, token refresh, logout and the current user.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AccountService, AuthService, ProfileService, RegisterRequest, TokenPair};
use crate::error::{AppError, AuthError, ErrorContext, ErrorKind};
use crate::middleware::AuthenticatedUser;

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub message: String,
}

fn auth_response(pair: TokenPair, auth: &AuthService) -> AuthResponse {
    AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: auth.config().access_token_ttl.num_seconds(),
    }
}

/// POST /api/v1/user/register
///
/// Creates the account and sends the activation link. A failed send does not
/// fail the registration; the user can ask for the link again.
///
/// # Errors
/// - 400: Validation errors
/// - 409: Username or email already taken
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user_id = auth.register(form.into_inner()).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    if let Err(e) = accounts.send_activation(user_id).await {
        context.clone().with_user_id(user_id).log_error(&e);
    }

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(RegisterResponse {
        id: user_id.to_string(),
        message: "Check your inbox to activate the account".to_string(),
    }))
}

/// POST /api/v1/user/login
///
/// # Security Notes
/// - Unknown username and wrong password produce the same 401 body
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let pair = auth
        .login(&form.username, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            match e.kind() {
                ErrorKind::NotFound | ErrorKind::InvalidCredentials => {
                    AppError::from(AuthError::InvalidCredentials)
                }
                _ => e,
            }
        })?;

    Ok(HttpResponse::Ok().json(auth_response(pair, &auth)))
}

/// POST /api/v1/refresh
///
/// Rotates the refresh token: the presented one stops working.
///
/// # Errors
/// - 401: Invalid, expired, revoked or already rotated refresh token
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.refresh(&form.refresh_token).await?;
    Ok(HttpResponse::Ok().json(auth_response(pair, &auth)))
}

/// POST /api/v1/logout
///
/// Revokes every refresh token of the caller. Access tokens already issued
/// stay valid until they expire.
pub async fn logout(
    user: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(user.user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/user/me
pub async fn get_current_user(
    user: web::ReqData<AuthenticatedUser>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let me = profiles.current_user(user.user_id).await?;
    Ok(HttpResponse::Ok().json(me))
}
