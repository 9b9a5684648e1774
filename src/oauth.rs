//! Google sign-in: consent redirect, code exchange and userinfo lookup.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::{rngs::OsRng, RngCore};
use reqwest::Url;
use serde::Deserialize;

use crate::auth::ExternalIdentity;
use crate::configuration::GoogleOAuthSettings;
use crate::error::{AppError, AuthError};

/// Cookie holding the CSRF state between the redirect and the callback
pub const STATE_COOKIE: &str = "oauthstate";

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    email: String,
    #[serde(default = "verified_by_default")]
    verified_email: bool,
    #[serde(default)]
    given_name: String,
    #[serde(default)]
    family_name: String,
    #[serde(default)]
    picture: String,
}

fn verified_by_default() -> bool {
    true
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http_client: reqwest::Client,
    settings: GoogleOAuthSettings,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(settings: GoogleOAuthSettings, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            settings,
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    /// Point the token and userinfo calls somewhere else
    pub fn with_endpoints(mut self, token_url: String, userinfo_url: String) -> Self {
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }

    /// 128-bit random state for the consent round trip
    pub fn generate_state() -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE.encode(bytes)
    }

    pub fn authorize_url(&self, state: &str) -> Result<String, AppError> {
        let url = Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "online"),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::internal(format!("Invalid authorization URL: {}", e)))?;

        Ok(url.into())
    }

    /// Trade an authorization code for the caller's identity
    pub async fn fetch_identity(&self, code: &str) -> Result<ExternalIdentity, AppError> {
        let access_token = self.exchange_code(code).await?;
        let info = self.user_info(&access_token).await?;

        if !info.verified_email {
            tracing::warn!("Google account email is not verified");
            return Err(AuthError::Unauthorized.into());
        }

        Ok(ExternalIdentity {
            email: info.email,
            first_name: info.given_name,
            last_name: info.family_name,
            picture_url: info.picture,
        })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, AppError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Google token endpoint");
                AppError::internal("failed to exchange code for token")
            })?;

        if response.status().is_client_error() {
            tracing::warn!(status = %response.status(), "Google rejected the authorization code");
            return Err(AuthError::Unauthorized.into());
        }

        let token = response
            .error_for_status()
            .map_err(|e| AppError::internal(format!("token endpoint error: {}", e)))?
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::internal(format!("malformed token response: {}", e)))?;

        Ok(token.access_token)
    }

    async fn user_info(&self, access_token: &str) -> Result<GoogleUserInfo, AppError> {
        self.http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Google userinfo endpoint");
                AppError::internal("failed to get user info")
            })?
            .error_for_status()
            .map_err(|e| AppError::internal(format!("userinfo endpoint error: {}", e)))?
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| AppError::internal(format!("malformed user info: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::tests::service_with;
    use crate::auth::user::UserStore;
    use crate::auth::{FirstUserPolicy, Role};
    use crate::error::ErrorKind;
    use actix_web::http::{header::AUTHORIZATION, StatusCode};
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use std::net::TcpListener;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            GoogleOAuthSettings {
                client_id: "client-123".to_string(),
                client_secret: "shh".to_string(),
                redirect_uri: "http://localhost:8000/api/v1/auth/google/callback".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_state_is_random() {
        let state = GoogleOAuthClient::generate_state();
        assert_eq!(state.len(), 24);
        assert_ne!(state, GoogleOAuthClient::generate_state());
    }

    #[test]
    fn test_authorize_url_carries_parameters() {
        let url = Url::parse(&client().authorize_url("st@te").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["state"], "st@te");
        assert_eq!(params["response_type"], "code");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:8000/api/v1/auth/google/callback"
        );
        assert!(params["scope"].contains("userinfo.email"));
        // the secret never goes to the browser
        assert!(!url.as_str().contains("shh"));
    }

    /// Canned token and userinfo endpoints
    #[derive(Clone)]
    struct StubGoogle {
        token_status: u16,
        userinfo: &'static str,
    }

    async fn stub_token(stub: web::Data<StubGoogle>) -> HttpResponse {
        if stub.token_status == 200 {
            return HttpResponse::Ok().json(serde_json::json!({ "access_token": "stub-access" }));
        }
        let status = StatusCode::from_u16(stub.token_status).unwrap_or(StatusCode::BAD_REQUEST);
        HttpResponse::build(status).json(serde_json::json!({ "error": "invalid_grant" }))
    }

    async fn stub_userinfo(req: HttpRequest, stub: web::Data<StubGoogle>) -> HttpResponse {
        let authorized = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            == Some("Bearer stub-access");
        if !authorized {
            return HttpResponse::Unauthorized().finish();
        }
        HttpResponse::Ok()
            .content_type("application/json")
            .body(stub.userinfo)
    }

    /// Serve the stub on a random port and return a client pointed at it
    fn client_against(stub: StubGoogle) -> GoogleOAuthClient {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
        let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(stub.clone()))
                .route("/token", web::post().to(stub_token))
                .route("/userinfo", web::get().to(stub_userinfo))
        })
        .workers(1)
        .listen(listener)
        .expect("Failed to listen")
        .run();
        let _ = tokio::spawn(server);

        client().with_endpoints(format!("{}/token", address), format!("{}/userinfo", address))
    }

    const VERIFIED: &str = r#"{"email":"carol@x.com","verified_email":true,"given_name":"Carol","family_name":"Smith","picture":"https://example.com/carol.png"}"#;

    #[tokio::test]
    async fn test_verified_identity_signs_in_as_activated_user() {
        let google = client_against(StubGoogle {
            token_status: 200,
            userinfo: VERIFIED,
        });

        let identity = google.fetch_identity("auth-code").await.unwrap();
        assert_eq!(identity.email, "carol@x.com");
        assert_eq!(identity.first_name, "Carol");
        assert_eq!(identity.last_name, "Smith");
        assert_eq!(identity.picture_url, "https://example.com/carol.png");

        let (store, auth) = service_with(FirstUserPolicy::Unverified);
        let pair = auth.login_external(identity).await.unwrap();
        let claims = auth.access_claims(&pair.access_token).unwrap();
        assert_eq!(claims.role, Role::User);

        let carol = store.find_by_id(claims.user_id().unwrap()).await.unwrap().unwrap();
        assert!(carol.activated);
        assert_eq!(carol.role, Role::User);
    }

    #[tokio::test]
    async fn test_unverified_email_is_refused() {
        let google = client_against(StubGoogle {
            token_status: 200,
            userinfo: r#"{"email":"carol@x.com","verified_email":false}"#,
        });

        let err = google.fetch_identity("auth-code").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_rejected_code_is_unauthorized() {
        let google = client_against(StubGoogle {
            token_status: 400,
            userinfo: VERIFIED,
        });

        let err = google.fetch_identity("stale-code").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_malformed_userinfo_is_internal() {
        let google = client_against(StubGoogle {
            token_status: 200,
            userinfo: "{not json",
        });

        let err = google.fetch_identity("auth-code").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_user_info_defaults() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"email":"carol@x.com","given_name":"Carol"}"#).unwrap();
        assert!(info.verified_email);
        assert_eq!(info.family_name, "");
    }
}
