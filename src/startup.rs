use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AccountService, AuthService, ProfileService, Role};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::notifier::Notifier;
use crate::oauth::GoogleOAuthClient;
use crate::routes::{
    activate, demote, forgot_password, get_current_user, get_profile, google_callback,
    google_login, health_check, login, logout, promote, refresh, register, resend_activation,
    reset_password, update_profile,
};
use crate::store::cleanup::TokenSweeper;
use crate::store::Stores;

/// Services shared by every worker
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub accounts: AccountService,
    pub profiles: ProfileService,
    pub google: Option<GoogleOAuthClient>,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        stores: &Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        let auth = AuthService::new(
            stores.users.clone(),
            stores.refresh_tokens.clone(),
            settings.auth_config(),
        )?;
        let accounts = AccountService::new(
            stores.users.clone(),
            stores.refresh_tokens.clone(),
            stores.one_time_tokens.clone(),
            notifier,
            settings.account_config(),
        );
        let profiles = ProfileService::new(stores.users.clone(), settings.storage.timeout());
        let google = settings
            .oauth
            .google
            .clone()
            .map(|google| GoogleOAuthClient::new(google, reqwest::Client::new()));

        Ok(Self {
            auth,
            accounts,
            profiles,
            google,
        })
    }
}

/// A bound, not yet awaited, server
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(
        settings: Settings,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, std::io::Error> {
        let state = AppState::new(&settings, &stores, notifier).map_err(|e| {
            tracing::error!(error = %e, "Failed to build application state");
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;

        TokenSweeper::new(
            stores.refresh_tokens.clone(),
            stores.one_time_tokens.clone(),
            settings.storage.timeout(),
        )
        .spawn(settings.storage.cleanup_interval());

        let address = format!("{}:{}", settings.application.host, settings.application.port);
        let listener = TcpListener::bind(&address)?;
        let port = listener.local_addr()?.port();
        tracing::info!(address = %address, port = port, "Server listening");

        let server = run(listener, state)?;
        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let secret = state.auth.config().access_token_secret.clone();
    let auth = web::Data::new(state.auth);
    let accounts = web::Data::new(state.accounts);
    let profiles = web::Data::new(state.profiles);
    let google = web::Data::new(state.google);

    let server = HttpServer::new(move || {
        let signed_in = || JwtMiddleware::new(&secret);

        App::new()
            // Global middleware; %U leaves out the query, which can hold one-time tokens
            .wrap(Logger::new("%a \"%m %U\" %s %b %T"))
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(auth.clone())
            .app_data(accounts.clone())
            .app_data(profiles.clone())
            .app_data(google.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1")
                    // Public routes
                    .route("/user/register", web::post().to(register))
                    .route("/user/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/users/activate", web::get().to(activate))
                    .route("/users/activation/resend", web::post().to(resend_activation))
                    .route("/users/forgot-password", web::post().to(forgot_password))
                    .route("/users/reset-password", web::post().to(reset_password))
                    .route("/auth/google/login", web::get().to(google_login))
                    .route("/auth/google/callback", web::get().to(google_callback))
                    // Any signed-in user
                    .service(
                        web::resource("/logout")
                            .wrap(signed_in())
                            .route(web::post().to(logout)),
                    )
                    .service(
                        web::resource("/user/me")
                            .wrap(signed_in())
                            .route(web::get().to(get_current_user)),
                    )
                    .service(
                        web::resource("/user/profile")
                            .wrap(signed_in())
                            .route(web::get().to(get_profile))
                            .route(web::put().to(update_profile)),
                    )
                    // Superadmin only
                    .service(
                        web::scope("/admin")
                            .wrap(signed_in().require_roles(&[Role::Superadmin]))
                            .route("/users/{id}/promote", web::patch().to(promote))
                            .route("/users/{id}/demote", web::patch().to(demote)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
