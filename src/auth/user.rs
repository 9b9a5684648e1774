//! Identity records and the storage interface for them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::role::Role;
use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub bio: String,
    pub picture_url: String,
    pub social_links: Vec<SocialLink>,
}

/// A registered identity.
///
/// `password_hash` is `None` for identities provisioned through an external
/// provider; those can only sign in through that provider.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub activated: bool,
    pub profile: UserProfile,
    pub last_seen: Option<DateTime<Utc>>,
    /// Who last changed this identity's role
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh identity in the `unverified` state
    pub fn new(
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            first_name,
            last_name,
            email,
            password_hash,
            role: Role::Unverified,
            activated: false,
            profile: UserProfile::default(),
            last_seen: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Document-store operations over the identities collection.
///
/// `username` and `email` are unique; `create` reports a violation as
/// `Conflict` (`UsernameTaken` / `EmailAlreadyExists`).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn count(&self) -> Result<u64, AppError>;
    async fn update_role(&self, id: Uuid, role: Role, updated_by: Uuid) -> Result<(), AppError>;
    async fn set_activation(&self, id: Uuid, activated: bool, role: Role) -> Result<(), AppError>;
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;
    async fn update_profile(&self, id: Uuid, profile: &UserProfile) -> Result<(), AppError>;
    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
}
