/// Account activation and password reset flows
///
/// Both flows issue a one-time token, deliver a link through the `Notifier`
/// and later consume the token. Delivery failures are logged and swallowed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use uuid::Uuid;

use crate::auth::one_time_token::{
    Activation, OneTimeTokenService, OneTimeTokenStore, PasswordReset, TokenKind,
};
use crate::auth::password::hash_password_with_cost;
use crate::auth::refresh_token::RefreshTokenStore;
use crate::auth::user::{User, UserStore};
use crate::error::AppError;
use crate::notifier::{Notification, Notifier};
use crate::store::with_deadline;
use crate::validators::is_valid_password;

#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Base of the links sent out, e.g. `https://blog.example.com`
    pub public_base_url: String,
    pub activation_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub bcrypt_cost: u32,
    pub storage_timeout: StdDuration,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    activation: OneTimeTokenService<Activation>,
    password_reset: OneTimeTokenService<PasswordReset>,
    notifier: Arc<dyn Notifier>,
    config: AccountConfig,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        one_time_tokens: Arc<dyn OneTimeTokenStore>,
        notifier: Arc<dyn Notifier>,
        config: AccountConfig,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            activation: OneTimeTokenService::new(one_time_tokens.clone(), config.storage_timeout),
            password_reset: OneTimeTokenService::new(one_time_tokens, config.storage_timeout),
            notifier,
            config,
        }
    }

    async fn deadline<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        with_deadline(self.config.storage_timeout, op, fut).await
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!(
            "{}/api/v1/users/{}?token={}",
            self.config.public_base_url.trim_end_matches('/'),
            path,
            token
        )
    }

    async fn deliver(&self, user: &User, kind: TokenKind, link: String) {
        let notification = Notification {
            kind,
            recipient: user.email.clone(),
            recipient_name: user.first_name.clone(),
            link,
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(user_id = %user.id, kind = kind.as_str(), error = %e, "Failed to deliver notification");
        }
    }

    /// Issue an activation token for `user_id` and send the link.
    /// Already activated accounts are left alone.
    pub async fn send_activation(&self, user_id: Uuid) -> Result<(), AppError> {
        let user = self
            .deadline("users.find_by_id", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        self.send_activation_to(&user).await
    }

    async fn send_activation_to(&self, user: &User) -> Result<(), AppError> {
        if user.activated {
            tracing::debug!(user_id = %user.id, "Account already active, no activation sent");
            return Ok(());
        }

        let token = self.activation.issue(user.id, self.config.activation_ttl).await?;
        self.deliver(user, TokenKind::Activation, self.link("activate", &token))
            .await;
        Ok(())
    }

    /// Send a fresh activation link. Unknown emails succeed silently.
    pub async fn resend_activation(&self, email: &str) -> Result<(), AppError> {
        match self
            .deadline("users.find_by_email", self.users.find_by_email(email.trim()))
            .await?
        {
            Some(user) => self.send_activation_to(&user).await,
            None => {
                tracing::info!("Activation resend requested for unknown email");
                Ok(())
            }
        }
    }

    /// Consume an activation token: `unverified` becomes `user`, higher roles
    /// keep their role, and the account is marked activated
    pub async fn activate(&self, token: &str) -> Result<Uuid, AppError> {
        let owner = self.activation.consume(token).await?;

        let user = self
            .deadline("users.find_by_id", self.users.find_by_id(owner))
            .await?
            .ok_or_else(|| AppError::not_found("user"))?;

        self.deadline(
            "users.set_activation",
            self.users.set_activation(owner, true, user.role.activated()),
        )
        .await?;

        tracing::info!(user_id = %owner, "Account activated");
        Ok(owner)
    }

    /// Send a reset link. Unknown emails succeed silently so existence does
    /// not leak.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let user = match self
            .deadline("users.find_by_email", self.users.find_by_email(email.trim()))
            .await?
        {
            Some(user) => user,
            None => {
                tracing::info!("Password reset requested for unknown email");
                return Ok(());
            }
        };

        let token = self
            .password_reset
            .issue(user.id, self.config.password_reset_ttl)
            .await?;
        self.deliver(&user, TokenKind::PasswordReset, self.link("reset-password", &token))
            .await;

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Set a new password with a reset token and revoke every session
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        // Reject a bad password before burning the token.
        is_valid_password(new_password)?;

        let owner = self.password_reset.consume(token).await?;
        let password_hash = hash_password_with_cost(new_password, self.config.bcrypt_cost)?;

        self.deadline(
            "users.update_password",
            self.users.update_password(owner, &password_hash),
        )
        .await?;

        let revoked = self
            .deadline(
                "refresh_tokens.delete_all_by_owner",
                self.refresh_tokens.delete_all_by_owner(owner),
            )
            .await?;

        tracing::info!(user_id = %owner, revoked = revoked, "Password reset completed");
        Ok(())
    }
}
