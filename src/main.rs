use std::sync::Arc;

use anchor_blog::configuration::{get_configuration, StorageBackend};
use anchor_blog::email_client::{EmailAddress, EmailClient};
use anchor_blog::notifier::{EmailNotifier, LogNotifier, Notifier};
use anchor_blog::startup::Application;
use anchor_blog::store::postgres::run_migrations;
use anchor_blog::store::Stores;
use anchor_blog::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, msg: &str) -> std::io::Error {
    std::io::Error::new(kind, msg.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Structured logging
    init_telemetry("info");

    tracing::info!("Starting application");

    // Load and check configuration
    let configuration = get_configuration()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| {
            tracing::error!("Failed to read configuration: {}", e);
            startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
    tracing::info!("Configuration loaded successfully");

    // Storage backend
    let stores = match configuration.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Stores::in_memory()
        }
        StorageBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(configuration.storage.timeout())
                .connect(&configuration.database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    startup_error(
                        std::io::ErrorKind::ConnectionRefused,
                        "Database connection error",
                    )
                })?;
            tracing::info!("Database connection pool created successfully");
            run_migrations(&pool).await.map_err(|e| {
                tracing::error!("Failed to migrate the database: {}", e);
                startup_error(std::io::ErrorKind::Other, "Database migration error")
            })?;
            Stores::postgres(pool)
        }
    };

    // Where activation and reset links go
    let notifier: Arc<dyn Notifier> = if configuration.email.enabled {
        let sender = EmailAddress::parse(&configuration.email.sender).map_err(|e| {
            tracing::error!("Invalid email sender: {}", e);
            startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
        let client = EmailClient::new(
            configuration.email.base_url.clone(),
            sender,
            reqwest::Client::new(),
        );
        Arc::new(EmailNotifier::new(client))
    } else {
        tracing::info!("Email disabled; links will be logged");
        Arc::new(LogNotifier)
    };

    let application = Application::build(configuration, stores, notifier).await?;
    tracing::info!(port = application.port(), "Server started successfully");

    application.run_until_stopped().await
}
