/// Role Administration Routes
///
/// Mounted behind `JwtMiddleware::require_roles(&[Role::Superadmin])`, so the
/// handlers only see superadmin callers.

use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::{AppError, ValidationError};
use crate::middleware::AuthenticatedUser;
use crate::routes::account::MessageResponse;

fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidFormat("user id").into())
}

/// PATCH /api/v1/admin/users/{id}/promote
///
/// # Errors
/// - 404: Unknown user
/// - 409: Already an admin
/// - 403: Target is unverified or a superadmin
pub async fn promote(
    path: web::Path<String>,
    actor: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let target = parse_user_id(&path)?;
    auth.promote_to_admin(actor.user_id, target).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User promoted to admin".to_string(),
    }))
}

/// PATCH /api/v1/admin/users/{id}/demote
///
/// # Errors
/// - 403: Demoting yourself, or a superadmin
/// - 409: Target is not an admin
pub async fn demote(
    path: web::Path<String>,
    actor: web::ReqData<AuthenticatedUser>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let target = parse_user_id(&path)?;
    auth.demote_to_user(actor.user_id, target).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Admin demoted to user".to_string(),
    }))
}
