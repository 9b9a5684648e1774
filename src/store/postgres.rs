//! PostgreSQL backend over `sqlx`. Schema lives in `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::one_time_token::{OneTimeToken, OneTimeTokenStore, TokenKind};
use crate::auth::refresh_token::{RefreshTokenRecord, RefreshTokenStore};
use crate::auth::role::Role;
use crate::auth::user::{SocialLink, User, UserProfile, UserStore};
use crate::error::{AppError, ConflictError};

const USER_COLUMNS: &str = r#"
    id, username, first_name, last_name, email, password_hash, role, activated,
    bio, picture_url, social_links, last_seen, updated_by, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    activated: bool,
    bio: String,
    picture_url: String,
    social_links: Json<Vec<SocialLink>>,
    last_seen: Option<DateTime<Utc>>,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|_| {
            tracing::error!(user_id = %row.id, role = %row.role, "Unknown role stored for user");
            AppError::internal(format!("unknown role '{}' stored for user", row.role))
        })?;

        Ok(User {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            activated: row.activated,
            profile: UserProfile {
                bio: row.bio,
                picture_url: row.picture_url,
                social_links: row.social_links.0,
            },
            last_seen: row.last_seen,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Apply every pending migration from `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        tracing::error!(error = %e, "Database migration failed");
        AppError::internal(format!("migration failed: {}", e))
    })
}

fn tokens_table(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Activation => "activation_tokens",
        TokenKind::PasswordReset => "password_reset_tokens",
    }
}

/// Name the unique constraint a failed insert tripped over
fn classify_user_conflict(err: sqlx::Error) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(ConflictError::Duplicate(constraint)) => {
            if constraint.contains("username") {
                ConflictError::UsernameTaken.into()
            } else if constraint.contains("email") {
                ConflictError::EmailAlreadyExists.into()
            } else {
                ConflictError::Duplicate(constraint).into()
            }
        }
        other => other,
    }
}

fn expect_one_user(rows_affected: u64) -> Result<(), AppError> {
    if rows_affected == 0 {
        Err(AppError::not_found("user"))
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, first_name, last_name, email, password_hash,
                               role, activated, bio, picture_url, social_links,
                               last_seen, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.activated)
        .bind(&user.profile.bio)
        .bind(&user.profile.picture_url)
        .bind(Json(&user.profile.social_links))
        .bind(user.last_seen)
        .bind(user.updated_by)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify_user_conflict)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn count(&self) -> Result<u64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn update_role(&self, id: Uuid, role: Role, updated_by: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET role = $2, updated_by = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(role.as_str())
        .bind(updated_by)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        expect_one_user(result.rows_affected())
    }

    async fn set_activation(&self, id: Uuid, activated: bool, role: Role) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET activated = $2, role = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(activated)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        expect_one_user(result.rows_affected())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        expect_one_user(result.rows_affected())
    }

    async fn update_profile(&self, id: Uuid, profile: &UserProfile) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET bio = $2, picture_url = $3, social_links = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&profile.bio)
        .bind(&profile.picture_url)
        .bind(Json(&profile.social_links))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        expect_one_user(result.rows_affected())
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET last_seen = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        expect_one_user(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                tracing::error!(user_id = %record.user_id, "Refresh token hash collision");
                AppError::internal("refresh token hash collision")
            }
            other => other,
        })?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<RefreshTokenRecord, AppError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let (id, user_id, token_hash, issued_at, expires_at) =
            row.ok_or_else(|| AppError::not_found("refresh token"))?;

        Ok(RefreshTokenRecord {
            id,
            user_id,
            token_hash,
            issued_at,
            expires_at,
        })
    }

    async fn delete_by_hash(&self, token_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_by_owner(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OneTimeTokenStore for PgStore {
    async fn insert(&self, token: &OneTimeToken) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, user_id, token, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            tokens_table(token.kind)
        ))
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.used)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::internal("one-time token collision"),
            other => other,
        })?;

        Ok(())
    }

    async fn find(&self, kind: TokenKind, token: &str) -> Result<Option<OneTimeToken>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, bool, DateTime<Utc>)>(
            &format!(
                "SELECT id, user_id, token, expires_at, used, created_at FROM {} WHERE token = $1",
                tokens_table(kind)
            ),
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, user_id, token, expires_at, used, created_at)| OneTimeToken {
            id,
            user_id,
            kind,
            token,
            expires_at,
            used,
            created_at,
        }))
    }

    async fn consume(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AppError> {
        let owner = sqlx::query_scalar::<_, Uuid>(&format!(
            r#"
            UPDATE {}
            SET used = TRUE
            WHERE token = $1 AND used = FALSE AND expires_at > $2
            RETURNING user_id
            "#,
            tokens_table(kind)
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut purged = 0;
        for kind in [TokenKind::Activation, TokenKind::PasswordReset] {
            let result = sqlx::query(&format!(
                "DELETE FROM {} WHERE expires_at <= $1",
                tokens_table(kind)
            ))
            .bind(now)
            .execute(&self.pool)
            .await?;
            purged += result.rows_affected();
        }
        Ok(purged)
    }
}
