use std::time::Duration as StdDuration;

use config::ConfigError;

use crate::auth::password::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::auth::{AccountConfig, AuthConfig, FirstUserPolicy};

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    pub jwt: JwtSettings,
    pub hmac: HmacSettings,
    #[serde(default)]
    pub tokens: TokenSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub oauth: OAuthSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Prefix of links sent by email
    pub public_base_url: String,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Deadline for every storage call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Period of the expired-token sweep
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            timeout_ms: default_timeout_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl StorageSettings {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }

    pub fn cleanup_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.cleanup_interval_secs)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds
}

/// Key for refresh-token digests
#[derive(serde::Deserialize, Clone, Debug)]
pub struct HmacSettings {
    pub secret: String,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct TokenSettings {
    #[serde(default = "default_activation_expiry")]
    pub activation_expiry: i64, // seconds
    #[serde(default = "default_password_reset_expiry")]
    pub password_reset_expiry: i64, // seconds
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            activation_expiry: default_activation_expiry(),
            password_reset_expiry: default_password_reset_expiry(),
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub first_user_policy: FirstUserPolicy,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            bcrypt_cost: default_bcrypt_cost(),
            first_user_policy: FirstUserPolicy::default(),
        }
    }
}

/// Outbound email; when disabled links are only logged
#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct EmailSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub sender: String,
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct OAuthSettings {
    pub google: Option<GoogleOAuthSettings>,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Upper bound for every token lifetime: ten years
pub const MAX_EXPIRY_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_cleanup_interval_secs() -> u64 {
    3_600
}

fn default_access_token_expiry() -> i64 {
    60 * 60
}

fn default_refresh_token_expiry() -> i64 {
    60 * 60 * 24 * 7
}

fn default_activation_expiry() -> i64 {
    60 * 60 * 24
}

fn default_password_reset_expiry() -> i64 {
    60 * 60
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Settings {
    /// Reject settings the server must not start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secrets = [
            ("jwt.access_token_secret", &self.jwt.access_token_secret),
            ("jwt.refresh_token_secret", &self.jwt.refresh_token_secret),
            ("hmac.secret", &self.hmac.secret),
        ];
        for (name, value) in secrets {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{} must not be empty", name)));
            }
        }

        let expiries = [
            ("jwt.access_token_expiry", self.jwt.access_token_expiry),
            ("jwt.refresh_token_expiry", self.jwt.refresh_token_expiry),
            ("tokens.activation_expiry", self.tokens.activation_expiry),
            ("tokens.password_reset_expiry", self.tokens.password_reset_expiry),
        ];
        for (name, secs) in expiries {
            if !(1..=MAX_EXPIRY_SECS).contains(&secs) {
                return Err(ConfigError::Message(format!(
                    "{} must be between 1 and {} seconds",
                    name, MAX_EXPIRY_SECS
                )));
            }
        }

        if self.storage.timeout_ms == 0 || self.storage.cleanup_interval_secs == 0 {
            return Err(ConfigError::Message(
                "storage.timeout_ms and storage.cleanup_interval_secs must be positive"
                    .to_string(),
            ));
        }

        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "auth.bcrypt_cost must be between {} and {}",
                MIN_BCRYPT_COST,
                MAX_BCRYPT_COST
            )));
        }

        if self.email.enabled && (self.email.base_url.is_empty() || self.email.sender.is_empty()) {
            return Err(ConfigError::Message(
                "email.base_url and email.sender are required when email is enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            access_token_secret: self.jwt.access_token_secret.clone(),
            refresh_token_secret: self.jwt.refresh_token_secret.clone(),
            hmac_secret: self.hmac.secret.clone(),
            access_token_ttl: chrono::Duration::seconds(self.jwt.access_token_expiry),
            refresh_token_ttl: chrono::Duration::seconds(self.jwt.refresh_token_expiry),
            bcrypt_cost: self.auth.bcrypt_cost,
            first_user_policy: self.auth.first_user_policy,
            storage_timeout: self.storage.timeout(),
        }
    }

    pub fn account_config(&self) -> AccountConfig {
        AccountConfig {
            public_base_url: self.application.public_base_url.clone(),
            activation_ttl: chrono::Duration::seconds(self.tokens.activation_expiry),
            password_reset_ttl: chrono::Duration::seconds(self.tokens.password_reset_expiry),
            bcrypt_cost: self.auth.bcrypt_cost,
            storage_timeout: self.storage.timeout(),
        }
    }
}

/// `configuration.yaml` (optional) overlaid with `APP_*` environment
/// variables, `__` separating nested keys: `APP_JWT__ACCESS_TOKEN_SECRET`
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
