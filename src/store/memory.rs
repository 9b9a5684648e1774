//! In-process backend. Used by the test suites and `storage.backend = memory`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::one_time_token::{OneTimeToken, OneTimeTokenStore, TokenKind};
use crate::auth::refresh_token::{RefreshTokenRecord, RefreshTokenStore};
use crate::auth::role::Role;
use crate::auth::user::{User, UserProfile, UserStore};
use crate::error::{AppError, ConflictError};

#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    /// keyed by token hash
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
    one_time_tokens: RwLock<HashMap<(TokenKind, String), OneTimeToken>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify_user<F>(&self, id: Uuid, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| AppError::not_found("user"))?;
        f(user);
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(ConflictError::UsernameTaken.into());
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(ConflictError::EmailAlreadyExists.into());
        }
        if users.contains_key(&user.id) {
            return Err(ConflictError::Duplicate("users.id".to_string()).into());
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn update_role(&self, id: Uuid, role: Role, updated_by: Uuid) -> Result<(), AppError> {
        self.modify_user(id, |u| {
            u.role = role;
            u.updated_by = Some(updated_by);
        })
        .await
    }

    async fn set_activation(&self, id: Uuid, activated: bool, role: Role) -> Result<(), AppError> {
        self.modify_user(id, |u| {
            u.activated = activated;
            u.role = role;
        })
        .await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let hash = password_hash.to_string();
        self.modify_user(id, move |u| u.password_hash = Some(hash)).await
    }

    async fn update_profile(&self, id: Uuid, profile: &UserProfile) -> Result<(), AppError> {
        let profile = profile.clone();
        self.modify_user(id, move |u| u.profile = profile).await
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or_else(|| AppError::not_found("user"))?;
        user.last_seen = Some(at);
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        if tokens.contains_key(&record.token_hash) {
            tracing::error!(user_id = %record.user_id, "Refresh token hash collision");
            return Err(AppError::internal("refresh token hash collision"));
        }
        tokens.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<RefreshTokenRecord, AppError> {
        self.refresh_tokens
            .read()
            .await
            .get(token_hash)
            .cloned()
            .ok_or_else(|| AppError::not_found("refresh token"))
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, AppError> {
        Ok(self.refresh_tokens.write().await.remove(token_hash).is_some())
    }

    async fn delete_all_by_owner(&self, user_id: Uuid) -> Result<u64, AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, r| r.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tokens = self.refresh_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, r| !r.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[async_trait]
impl OneTimeTokenStore for InMemoryStore {
    async fn insert(&self, token: &OneTimeToken) -> Result<(), AppError> {
        let mut tokens = self.one_time_tokens.write().await;
        let key = (token.kind, token.token.clone());
        if tokens.contains_key(&key) {
            return Err(AppError::internal("one-time token collision"));
        }
        tokens.insert(key, token.clone());
        Ok(())
    }

    async fn find(&self, kind: TokenKind, token: &str) -> Result<Option<OneTimeToken>, AppError> {
        Ok(self
            .one_time_tokens
            .read()
            .await
            .get(&(kind, token.to_string()))
            .cloned())
    }

    async fn consume(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tokens = self.one_time_tokens.write().await;
        match tokens.get_mut(&(kind, token.to_string())) {
            Some(record) if record.is_valid_at(now) => {
                record.used = true;
                Ok(Some(record.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tokens = self.one_time_tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| now < t.expires_at);
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "Alice".to_string(),
            "Doe".to_string(),
            Some("hash".to_string()),
        )
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let store = InMemoryStore::new();
        store.create(&user("alice", "alice@x.com")).await.unwrap();

        let dup_name = store.create(&user("alice", "other@x.com")).await;
        assert!(matches!(
            dup_name,
            Err(AppError::Conflict(ConflictError::UsernameTaken))
        ));

        let dup_email = store.create(&user("bob", "alice@x.com")).await;
        assert!(matches!(
            dup_email,
            Err(AppError::Conflict(ConflictError::EmailAlreadyExists))
        ));

        // usernames are case-sensitive
        store.create(&user("Alice", "alice2@x.com")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_user_is_not_found() {
        let store = InMemoryStore::new();
        let result = store
            .update_role(Uuid::new_v4(), Role::Admin, Uuid::new_v4())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_refresh_token_lifecycle() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let record = RefreshTokenRecord::new(owner, "h1".to_string(), Duration::days(7));

        store.store_refresh_token(&record).await.unwrap();
        assert!(store.store_refresh_token(&record).await.is_err());
        assert_eq!(store.find_by_hash("h1").await.unwrap().user_id, owner);

        assert!(store.delete_by_hash("h1").await.unwrap());
        assert!(!store.delete_by_hash("h1").await.unwrap());
        assert!(matches!(
            store.find_by_hash("h1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_all_by_owner_leaves_others() {
        let store = InMemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for (owner, hash) in [(alice, "a1"), (alice, "a2"), (bob, "b1")] {
            store
                .store_refresh_token(&RefreshTokenRecord::new(owner, hash.to_string(), Duration::days(7)))
                .await
                .unwrap();
        }

        assert_eq!(store.delete_all_by_owner(alice).await.unwrap(), 2);
        assert_eq!(store.delete_all_by_owner(alice).await.unwrap(), 0);
        assert!(store.find_by_hash("b1").await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        store
            .store_refresh_token(&RefreshTokenRecord::new(owner, "old".to_string(), Duration::seconds(-1)))
            .await
            .unwrap();
        store
            .store_refresh_token(&RefreshTokenRecord::new(owner, "new".to_string(), Duration::days(1)))
            .await
            .unwrap();
        store
            .insert(&OneTimeToken::new(TokenKind::Activation, owner, Duration::seconds(-1)))
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(RefreshTokenStore::purge_expired(&store, now).await.unwrap(), 1);
        assert_eq!(OneTimeTokenStore::purge_expired(&store, now).await.unwrap(), 1);
        assert!(store.find_by_hash("new").await.is_ok());
    }

    #[tokio::test]
    async fn test_consume_is_conditional() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let token = OneTimeToken::new(TokenKind::PasswordReset, owner, Duration::hours(1));
        store.insert(&token).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            store.consume(TokenKind::PasswordReset, &token.token, now).await.unwrap(),
            Some(owner)
        );
        assert_eq!(
            store.consume(TokenKind::PasswordReset, &token.token, now).await.unwrap(),
            None
        );
        assert!(store
            .find(TokenKind::PasswordReset, &token.token)
            .await
            .unwrap()
            .unwrap()
            .used);
    }
}
