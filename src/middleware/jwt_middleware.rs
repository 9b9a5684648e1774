/// JWT Authentication Middleware
///
/// Validates the bearer token from the Authorization header and injects the
/// caller's identity into request extensions for route handlers
/// (`web::ReqData<AuthenticatedUser>`). An optional role gate runs after
/// authentication.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth::jwt::validate_token;
use crate::auth::role::Role;
use crate::error::{AppError, AuthError};

/// Identity of the caller, valid for the current request only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

/// Parse `Bearer <token>` and validate the token
///
/// # Errors
/// `Unauthorized` for a missing or malformed header and for any token that
/// fails validation
pub fn authenticate(header: Option<&str>, secret: &str) -> Result<AuthenticatedUser, AppError> {
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            tracing::warn!("Missing or invalid Authorization header");
            AppError::from(AuthError::Unauthorized)
        })?;

    let claims = validate_token(token, secret).map_err(|e| {
        match e {
            AppError::Auth(AuthError::InvalidToken) => {
                tracing::warn!("Rejected invalid access token");
            }
            other => {
                tracing::warn!(error = %other, "Access token validation failed");
            }
        }
        AppError::from(AuthError::Unauthorized)
    })?;

    let user_id = claims.user_id().map_err(|_| {
        tracing::warn!(sub = %claims.sub, "Access token subject is not a user id");
        AppError::from(AuthError::Unauthorized)
    })?;

    Ok(AuthenticatedUser {
        user_id,
        username: claims.username,
        role: claims.role,
    })
}

/// Role gate: `Forbidden` unless the caller holds one of `allowed`
pub fn authorize(user: &AuthenticatedUser, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.user_id, role = %user.role, "Role not permitted for this route");
        Err(AuthError::Forbidden.into())
    }
}

/// JWT middleware for protecting routes
pub struct JwtMiddleware {
    secret: Rc<str>,
    allowed_roles: Option<Rc<[Role]>>,
}

impl JwtMiddleware {
    /// Any authenticated caller is let through
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Rc::from(secret),
            allowed_roles: None,
        }
    }

    /// Additionally require one of `roles`
    pub fn require_roles(mut self, roles: &[Role]) -> Self {
        self.allowed_roles = Some(Rc::from(roles));
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            secret: self.secret.clone(),
            allowed_roles: self.allowed_roles.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    secret: Rc<str>,
    allowed_roles: Option<Rc<[Role]>>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let checked = authenticate(header, &self.secret).and_then(|user| {
            match &self.allowed_roles {
                Some(roles) => authorize(&user, roles).map(|_| user),
                None => Ok(user),
            }
        });

        match checked {
            Ok(user) => {
                tracing::debug!(
                    user_id = %user.user_id,
                    role = %user.role,
                    "JWT validated successfully"
                );
                req.extensions_mut().insert(user);

                let service = self.service.clone();
                Box::pin(async move {
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                })
            }
            Err(e) => {
                let response = req.error_response(e).map_into_right_body();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}
