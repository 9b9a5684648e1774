/// Authentication Service
///
/// Registration, password and external-identity login, refresh-token rotation,
/// logout and role administration. Secrets and lifetimes come in through
/// `AuthConfig`; every storage call runs under the configured deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::jwt::{generate_token, validate_token};
use crate::auth::password::{hash_password_with_cost, verify_password};
use crate::auth::refresh_token::{RefreshTokenRecord, RefreshTokenStore};
use crate::auth::role::Role;
use crate::auth::token_hash::hash_token;
use crate::auth::user::{User, UserStore};
use crate::error::{AppError, AuthError, ConflictError, RoleError};
use crate::store::with_deadline;
use crate::validators::{is_valid_email, is_valid_name, is_valid_password, is_valid_username};

/// How the very first registered account starts out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstUserPolicy {
    /// Same as everyone else: unverified until activated
    #[default]
    Unverified,
    /// Activated superadmin, no activation step
    SuperadminBypass,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub hmac_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bcrypt_cost: u32,
    pub first_user_policy: FirstUserPolicy,
    pub storage_timeout: StdDuration,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Identity asserted by an external provider after a successful sign-in
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIdentity {
    pub email: String,
    #[serde(default, alias = "given_name")]
    pub first_name: String,
    #[serde(default, alias = "family_name")]
    pub last_name: String,
    #[serde(default, alias = "picture")]
    pub picture_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    config: AuthConfig,
    /// Verified against when there is no real hash, so a missing account
    /// costs the same bcrypt round as a wrong password
    dummy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        config: AuthConfig,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password_with_cost("dummy-password-value", config.bcrypt_cost)?;
        Ok(Self {
            users,
            refresh_tokens,
            config,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Claims of an access token minted by this service
    pub fn access_claims(&self, access_token: &str) -> Result<Claims, AppError> {
        validate_token(access_token, &self.config.access_token_secret)
    }

    async fn deadline<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        with_deadline(self.config.storage_timeout, op, fut).await
    }

    /// Register a new password identity and return its id
    ///
    /// Does not send anything; activation is the caller's job.
    pub async fn register(&self, request: RegisterRequest) -> Result<Uuid, AppError> {
        let username = is_valid_username(&request.username)?;
        let email = is_valid_email(&request.email)?;
        let first_name = is_valid_name("first_name", &request.first_name)?;
        let last_name = is_valid_name("last_name", &request.last_name)?;
        is_valid_password(&request.password)?;

        if self
            .deadline("users.find_by_username", self.users.find_by_username(&username))
            .await?
            .is_some()
        {
            return Err(ConflictError::UsernameTaken.into());
        }
        if self
            .deadline("users.find_by_email", self.users.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(ConflictError::EmailAlreadyExists.into());
        }

        let password_hash = hash_password_with_cost(&request.password, self.config.bcrypt_cost)?;
        let mut user = User::new(username, email, first_name, last_name, Some(password_hash));

        if self.config.first_user_policy == FirstUserPolicy::SuperadminBypass
            && self.deadline("users.count", self.users.count()).await? == 0
        {
            user.role = Role::Superadmin;
            user.activated = true;
            tracing::info!(user_id = %user.id, "First account registered as superadmin");
        }

        self.deadline("users.create", self.users.create(&user)).await?;

        tracing::info!(user_id = %user.id, username = %user.username, role = %user.role, "User registered");
        Ok(user.id)
    }

    /// Password login
    ///
    /// # Errors
    /// `NotFound` for an unknown username, `InvalidCredentials` for a wrong
    /// password or an identity without one
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .deadline("users.find_by_username", self.users.find_by_username(username.trim()))
            .await?;

        let user = match user {
            Some(user) => user,
            None => {
                verify_password(password, &self.dummy_hash);
                tracing::warn!(username = %username, "Login attempt for unknown username");
                return Err(AppError::not_found("user"));
            }
        };

        let verified = match user.password_hash.as_deref() {
            Some(hash) => verify_password(password, hash),
            None => {
                verify_password(password, &self.dummy_hash);
                false
            }
        };
        if !verified {
            tracing::warn!(user_id = %user.id, "Login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.issue_pair(&user).await?;
        self.touch_last_seen(user.id).await;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Sign in with an identity vouched for by an external provider,
    /// provisioning an activated `user` on first sight of the email
    pub async fn login_external(&self, identity: ExternalIdentity) -> Result<TokenPair, AppError> {
        let email = is_valid_email(&identity.email)?;

        let existing = self
            .deadline("users.find_by_email", self.users.find_by_email(&email))
            .await?;

        let user = match existing {
            Some(user) => user,
            None => {
                let mut user = User::new(
                    email.clone(),
                    email,
                    identity.first_name.trim().to_string(),
                    identity.last_name.trim().to_string(),
                    None,
                );
                user.role = Role::User;
                user.activated = true;
                user.profile.picture_url = identity.picture_url;
                user.last_seen = Some(user.created_at);

                self.deadline("users.create", self.users.create(&user)).await?;
                tracing::info!(user_id = %user.id, "Provisioned user from external identity");
                user
            }
        };

        let pair = self.issue_pair(&user).await?;
        self.touch_last_seen(user.id).await;

        tracing::info!(user_id = %user.id, "User logged in through external identity");
        Ok(pair)
    }

    /// Single-use rotation: the presented refresh token is consumed and a new
    /// pair minted from the identity's current state
    ///
    /// Every failure a client could cause surfaces as `InvalidToken`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = validate_token(refresh_token, &self.config.refresh_token_secret)?;
        let owner = claims.user_id()?;
        let token_hash = hash_token(refresh_token, &self.config.hmac_secret)?;

        let record = match self
            .deadline("refresh_tokens.find_by_hash", self.refresh_tokens.find_by_hash(&token_hash))
            .await
        {
            Ok(record) => record,
            Err(AppError::NotFound(_)) => {
                tracing::warn!(user_id = %owner, "Refresh token not on record");
                return Err(AuthError::InvalidToken.into());
            }
            Err(e) => return Err(e),
        };

        if record.user_id != owner || record.is_expired_at(Utc::now()) {
            tracing::warn!(user_id = %owner, "Refresh token record rejected");
            return Err(AuthError::InvalidToken.into());
        }

        let removed = self
            .deadline("refresh_tokens.delete_by_hash", self.refresh_tokens.delete_by_hash(&token_hash))
            .await?;
        if !removed {
            tracing::warn!(user_id = %owner, "Refresh token already consumed by a concurrent request");
            return Err(AuthError::InvalidToken.into());
        }

        let user = self
            .deadline("users.find_by_id", self.users.find_by_id(owner))
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %owner, "Refresh token owner no longer exists");
                AppError::from(AuthError::InvalidToken)
            })?;

        let pair = self.issue_pair(&user).await?;
        tracing::info!(user_id = %user.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Revoke every refresh token of `user_id`
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        let revoked = self
            .deadline(
                "refresh_tokens.delete_all_by_owner",
                self.refresh_tokens.delete_all_by_owner(user_id),
            )
            .await?;

        tracing::info!(user_id = %user_id, revoked = revoked, "User logged out");
        Ok(())
    }

    pub async fn promote_to_admin(&self, actor_id: Uuid, target_id: Uuid) -> Result<(), AppError> {
        let target = self.find_user(target_id).await?;

        match target.role {
            Role::User => {}
            Role::Admin => return Err(RoleError::AlreadyAdmin.into()),
            Role::Unverified => return Err(RoleError::Unverified.into()),
            Role::Superadmin => return Err(RoleError::Protected.into()),
        }

        self.deadline("users.update_role", self.users.update_role(target_id, Role::Admin, actor_id))
            .await?;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "User promoted to admin");
        Ok(())
    }

    pub async fn demote_to_user(&self, actor_id: Uuid, target_id: Uuid) -> Result<(), AppError> {
        if actor_id == target_id {
            return Err(RoleError::CannotDemoteSelf.into());
        }

        let target = self.find_user(target_id).await?;

        match target.role {
            Role::Admin => {}
            Role::Superadmin => return Err(RoleError::Protected.into()),
            Role::User | Role::Unverified => return Err(RoleError::NotAdmin.into()),
        }

        self.deadline("users.update_role", self.users.update_role(target_id, Role::User, actor_id))
            .await?;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "Admin demoted to user");
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<User, AppError> {
        self.deadline("users.find_by_id", self.users.find_by_id(id))
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    /// Mint an access/refresh pair and record the refresh token's digest
    async fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = generate_token(
            user,
            &self.config.access_token_secret,
            self.config.access_token_ttl,
        )?;
        let refresh_token = generate_token(
            user,
            &self.config.refresh_token_secret,
            self.config.refresh_token_ttl,
        )?;

        let record = RefreshTokenRecord::new(
            user.id,
            hash_token(&refresh_token, &self.config.hmac_secret)?,
            self.config.refresh_token_ttl,
        );
        self.deadline(
            "refresh_tokens.store",
            self.refresh_tokens.store_refresh_token(&record),
        )
        .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    async fn touch_last_seen(&self, user_id: Uuid) {
        let touched = self
            .deadline("users.touch_last_seen", self.users.touch_last_seen(user_id, Utc::now()))
            .await;
        if let Err(e) = touched {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record last seen");
        }
    }
}
