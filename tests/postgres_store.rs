//! PostgreSQL backend against a live database
//!
//! Each test creates a throwaway database named by a fresh uuid and migrates it.

use anchor_blog::auth::one_time_token::{OneTimeToken, OneTimeTokenStore, TokenKind};
use anchor_blog::auth::refresh_token::{RefreshTokenRecord, RefreshTokenStore};
use anchor_blog::auth::user::{SocialLink, User, UserStore};
use anchor_blog::auth::Role;
use anchor_blog::configuration::{get_configuration, DatabaseSettings};
use anchor_blog::error::{AppError, ConflictError};
use anchor_blog::store::postgres::{run_migrations, PgStore};
use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    run_migrations(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn store() -> PgStore {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    PgStore::new(configure_database(&configuration.database).await)
}

fn user(username: &str, email: &str) -> User {
    User::new(
        username.to_string(),
        email.to_string(),
        "Alice".to_string(),
        "Doe".to_string(),
        Some("$2b$04$hash".to_string()),
    )
}

async fn saved_user(store: &PgStore) -> User {
    let alice = user("alice", "alice@x.com");
    store.create(&alice).await.expect("Failed to insert user");
    alice
}

// --- Identities ---

#[tokio::test]
async fn duplicate_username_and_email_are_named_conflicts() {
    let store = store().await;
    saved_user(&store).await;

    let same_name = store.create(&user("alice", "other@x.com")).await;
    assert!(matches!(
        same_name,
        Err(AppError::Conflict(ConflictError::UsernameTaken))
    ));

    let same_email = store.create(&user("bob", "alice@x.com")).await;
    assert!(matches!(
        same_email,
        Err(AppError::Conflict(ConflictError::EmailAlreadyExists))
    ));

    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn user_rows_round_trip() {
    let store = store().await;
    let alice = saved_user(&store).await;
    let actor = Uuid::new_v4();

    store.set_activation(alice.id, true, Role::User).await.unwrap();
    store.update_role(alice.id, Role::Admin, actor).await.unwrap();

    let mut profile = alice.profile.clone();
    profile.bio = "Writes about Rust".to_string();
    profile.social_links = vec![SocialLink {
        platform: "github".to_string(),
        url: "https://github.com/alice".to_string(),
    }];
    store.update_profile(alice.id, &profile).await.unwrap();

    let loaded = store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(loaded.id, alice.id);
    assert_eq!(loaded.role, Role::Admin);
    assert!(loaded.activated);
    assert_eq!(loaded.updated_by, Some(actor));
    assert_eq!(loaded.profile, profile);
    assert!(store.find_by_email("ghost@x.com").await.unwrap().is_none());

    let missing = store.update_password(Uuid::new_v4(), "hash").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

// --- Refresh tokens ---

#[tokio::test]
async fn refresh_token_delete_is_idempotent() {
    let store = store().await;
    let alice = saved_user(&store).await;
    let record = RefreshTokenRecord::new(alice.id, "digest-1".to_string(), Duration::days(7));

    store.store_refresh_token(&record).await.unwrap();
    let found = store.find_by_hash("digest-1").await.unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.user_id, alice.id);

    assert!(store.delete_by_hash("digest-1").await.unwrap());
    assert!(!store.delete_by_hash("digest-1").await.unwrap());
    assert!(matches!(
        store.find_by_hash("digest-1").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn refresh_token_hash_collision_is_internal() {
    let store = store().await;
    let alice = saved_user(&store).await;

    let first = RefreshTokenRecord::new(alice.id, "same".to_string(), Duration::days(7));
    let second = RefreshTokenRecord::new(alice.id, "same".to_string(), Duration::days(7));

    store.store_refresh_token(&first).await.unwrap();
    assert!(matches!(
        store.store_refresh_token(&second).await,
        Err(AppError::Internal(_))
    ));
}

#[tokio::test]
async fn logout_and_sweep_remove_refresh_tokens() {
    let store = store().await;
    let alice = saved_user(&store).await;

    for (hash, ttl) in [("a", Duration::days(1)), ("b", Duration::days(1)), ("old", Duration::seconds(-1))] {
        store
            .store_refresh_token(&RefreshTokenRecord::new(alice.id, hash.to_string(), ttl))
            .await
            .unwrap();
    }

    assert_eq!(RefreshTokenStore::purge_expired(&store, Utc::now()).await.unwrap(), 1);
    assert_eq!(store.delete_all_by_owner(alice.id).await.unwrap(), 2);
    assert_eq!(store.delete_all_by_owner(alice.id).await.unwrap(), 0);
}

// --- One-time tokens ---

#[tokio::test]
async fn one_time_token_is_consumed_once() {
    let store = store().await;
    let alice = saved_user(&store).await;
    let token = OneTimeToken::new(TokenKind::PasswordReset, alice.id, Duration::hours(1));
    store.insert(&token).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        store.consume(TokenKind::PasswordReset, &token.token, now).await.unwrap(),
        Some(alice.id)
    );
    assert_eq!(
        store.consume(TokenKind::PasswordReset, &token.token, now).await.unwrap(),
        None
    );

    let stored = store
        .find(TokenKind::PasswordReset, &token.token)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.used);
}

#[tokio::test]
async fn one_time_token_kinds_and_expiry_are_respected() {
    let store = store().await;
    let alice = saved_user(&store).await;

    let activation = OneTimeToken::new(TokenKind::Activation, alice.id, Duration::hours(1));
    let stale = OneTimeToken::new(TokenKind::Activation, alice.id, Duration::seconds(-1));
    store.insert(&activation).await.unwrap();
    store.insert(&stale).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        store.consume(TokenKind::PasswordReset, &activation.token, now).await.unwrap(),
        None
    );
    assert_eq!(
        store.consume(TokenKind::Activation, &stale.token, now).await.unwrap(),
        None
    );

    assert!(matches!(
        store.insert(&activation).await,
        Err(AppError::Internal(_))
    ));
    assert_eq!(OneTimeTokenStore::purge_expired(&store, now).await.unwrap(), 1);
}
