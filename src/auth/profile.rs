//! Profile reads and partial updates for the signed-in user.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::role::Role;
use crate::auth::user::{SocialLink, User, UserProfile, UserStore};
use crate::error::{AppError, ValidationError};
use crate::store::with_deadline;
use crate::validators::{is_valid_bio, is_valid_url};

const MAX_SOCIAL_LINKS: usize = 10;

/// Absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
    pub picture_url: Option<String>,
    pub social_links: Option<Vec<SocialLink>>,
}

/// Public view of an identity; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub activated: bool,
    pub profile: UserProfile,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            activated: user.activated,
            profile: user.profile,
            last_seen: user.last_seen,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct ProfileService {
    users: Arc<dyn UserStore>,
    timeout: StdDuration,
}

impl ProfileService {
    pub fn new(users: Arc<dyn UserStore>, timeout: StdDuration) -> Self {
        Self { users, timeout }
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<UserResponse, AppError> {
        self.load(user_id).await.map(UserResponse::from)
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, AppError> {
        self.load(user_id).await.map(|user| user.profile)
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, AppError> {
        let mut profile = self.load(user_id).await?.profile;

        if let Some(bio) = request.bio {
            profile.bio = is_valid_bio(&bio)?;
        }
        if let Some(picture_url) = request.picture_url {
            profile.picture_url = is_valid_url("picture_url", &picture_url)?;
        }
        if let Some(links) = request.social_links {
            if links.len() > MAX_SOCIAL_LINKS {
                return Err(ValidationError::TooLong("social_links", MAX_SOCIAL_LINKS).into());
            }
            profile.social_links = links
                .into_iter()
                .map(|link| {
                    let platform = link.platform.trim().to_string();
                    if platform.is_empty() {
                        return Err(ValidationError::EmptyField("social_links.platform"));
                    }
                    Ok(SocialLink {
                        platform,
                        url: is_valid_url("social_links.url", &link.url)?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }

        with_deadline(
            self.timeout,
            "users.update_profile",
            self.users.update_profile(user_id, &profile),
        )
        .await?;

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(profile)
    }

    async fn load(&self, user_id: Uuid) -> Result<User, AppError> {
        with_deadline(self.timeout, "users.find_by_id", self.users.find_by_id(user_id))
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::memory::InMemoryStore;

    async fn setup() -> (ProfileService, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let user = User::new(
            "alice".into(),
            "alice@x.com".into(),
            "Alice".into(),
            "Doe".into(),
            Some("$2b$04$hash".into()),
        );
        store.create(&user).await.unwrap();
        (ProfileService::new(store, StdDuration::from_secs(5)), user.id)
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let (service, id) = setup().await;

        service
            .update_profile(
                id,
                UpdateProfileRequest {
                    bio: Some("Writes about Rust".into()),
                    picture_url: Some("https://example.com/alice.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let profile = service
            .update_profile(
                id,
                UpdateProfileRequest {
                    social_links: Some(vec![SocialLink {
                        platform: "github".into(),
                        url: "https://github.com/alice".into(),
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.bio, "Writes about Rust");
        assert_eq!(profile.picture_url, "https://example.com/alice.png");
        assert_eq!(profile.social_links.len(), 1);
        assert_eq!(service.get_profile(id).await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_invalid_profile_is_rejected_untouched() {
        let (service, id) = setup().await;

        let err = service
            .update_profile(
                id,
                UpdateProfileRequest {
                    bio: Some("fine".into()),
                    picture_url: Some("ftp://example.com/a.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert_eq!(service.get_profile(id).await.unwrap().bio, "");
    }

    #[tokio::test]
    async fn test_current_user_hides_password_hash() {
        let (service, id) = setup().await;
        let me = service.current_user(id).await.unwrap();

        assert_eq!(me.username, "alice");
        let json = serde_json::to_string(&me).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("$2b$"));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (service, _) = setup().await;
        let err = service.get_profile(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
