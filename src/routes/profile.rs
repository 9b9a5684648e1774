use actix_web::{web, HttpResponse};

use crate::auth::{ProfileService, UpdateProfileRequest};
use crate::error::AppError;
use crate::middleware::AuthenticatedUser;

/// GET /api/v1/user/profile
pub async fn get_profile(
    user: web::ReqData<AuthenticatedUser>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let profile = profiles.get_profile(user.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// PUT /api/v1/user/profile
///
/// Partial update; fields left out of the body are unchanged.
pub async fn update_profile(
    user: web::ReqData<AuthenticatedUser>,
    form: web::Json<UpdateProfileRequest>,
    profiles: web::Data<ProfileService>,
) -> Result<HttpResponse, AppError> {
    let profile = profiles
        .update_profile(user.user_id, form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(profile))
}
