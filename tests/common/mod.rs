//! Shared harness for the HTTP integration tests

#![allow(dead_code)]

use std::sync::Arc;

use anchor_blog::auth::FirstUserPolicy;
use anchor_blog::configuration::{get_configuration, StorageBackend};
use anchor_blog::error::AppError;
use anchor_blog::notifier::{Notification, Notifier};
use anchor_blog::startup::Application;
use anchor_blog::store::Stores;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

pub const PASSWORD: &str = "secret1";

/// Keeps every notification instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Token from the last link sent to `email`
    pub async fn token_for(&self, email: &str) -> Option<String> {
        let sent = self.sent.lock().await;
        sent.iter()
            .rev()
            .find(|n| n.recipient == email)
            .and_then(|n| n.link.split("token=").nth(1))
            .map(str::to_string)
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub notifier: Arc<RecordingNotifier>,
    pub client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(FirstUserPolicy::Unverified).await
}

pub async fn spawn_app_with(policy: FirstUserPolicy) -> TestApp {
    let mut configuration = get_configuration().expect("Failed to read configuration");
    configuration.application.host = "127.0.0.1".to_string();
    configuration.application.port = 0;
    configuration.storage.backend = StorageBackend::Memory;
    configuration.auth.bcrypt_cost = 4;
    configuration.auth.first_user_policy = policy;
    configuration.email.enabled = false;
    configuration.oauth.google = None;
    configuration.validate().expect("Invalid test configuration");

    let notifier = Arc::new(RecordingNotifier::default());
    let application = Application::build(configuration, Stores::in_memory(), notifier.clone())
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", application.port());

    let _ = tokio::spawn(application.run_until_stopped());

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build HTTP client");

    TestApp {
        address,
        notifier,
        client,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.address, path)
    }

    pub async fn register(&self, username: &str, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/user/register"))
            .json(&json!({
                "username": username,
                "email": email,
                "password": PASSWORD,
                "first_name": "Alice",
                "last_name": "Doe",
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/user/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn activate(&self, token: &str) -> reqwest::Response {
        self.client
            .get(self.url("/users/activate"))
            .query(&[("token", token)])
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register, activate and log in; returns (user id, access, refresh)
    pub async fn signed_in_user(&self, username: &str, email: &str) -> (String, String, String) {
        let created: Value = self.register(username, email).await.json().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        if let Some(token) = self.notifier.token_for(email).await {
            assert_eq!(self.activate(&token).await.status().as_u16(), 200);
        }

        let tokens: Value = self.login(username, PASSWORD).await.json().await.unwrap();
        (
            id,
            tokens["access_token"].as_str().unwrap().to_string(),
            tokens["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}
