/// Google Sign-In Routes
///
/// The login route sets a random state in a short-lived cookie and redirects
/// to Google; the callback accepts the code only if the state it carries
/// matches the cookie.

use actix_web::cookie::{time::Duration, Cookie};
use actix_web::http::header::LOCATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::AuthService;
use crate::error::{AppError, ValidationError};
use crate::oauth::{GoogleOAuthClient, STATE_COOKIE};
use crate::routes::auth::AuthResponse;

const STATE_MAX_AGE_SECS: i64 = 3600;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

fn client(google: &Option<GoogleOAuthClient>) -> Result<&GoogleOAuthClient, AppError> {
    google
        .as_ref()
        .ok_or_else(|| AppError::not_found("google sign-in"))
}

/// GET /api/v1/auth/google/login
pub async fn google_login(
    google: web::Data<Option<GoogleOAuthClient>>,
) -> Result<HttpResponse, AppError> {
    let google = client(&google)?;

    let state = GoogleOAuthClient::generate_state();
    let url = google.authorize_url(&state)?;

    let cookie = Cookie::build(STATE_COOKIE, state)
        .path("/")
        .max_age(Duration::seconds(STATE_MAX_AGE_SECS))
        .http_only(true)
        .finish();

    Ok(HttpResponse::TemporaryRedirect()
        .cookie(cookie)
        .insert_header((LOCATION, url))
        .finish())
}

/// GET /api/v1/auth/google/callback?state=...&code=...
///
/// # Errors
/// - 400: Missing or mismatched state, or no code
/// - 401: Google refused the code
pub async fn google_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    google: web::Data<Option<GoogleOAuthClient>>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let google = client(&google)?;

    let expected = req.cookie(STATE_COOKIE).ok_or_else(|| {
        tracing::warn!("OAuth callback without state cookie");
        AppError::from(ValidationError::EmptyField("state cookie"))
    })?;
    let presented = query.state.as_deref().unwrap_or_default();

    if presented.is_empty() || expected.value() != presented {
        tracing::warn!("OAuth callback with mismatched state");
        return Err(ValidationError::InvalidFormat("state").into());
    }

    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(ValidationError::EmptyField("code"))?;

    let identity = google.fetch_identity(code).await?;
    let pair = auth.login_external(identity).await?;

    let mut spent = Cookie::build(STATE_COOKIE, "").path("/").finish();
    spent.make_removal();

    Ok(HttpResponse::Ok().cookie(spent).json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: auth.config().access_token_ttl.num_seconds(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::tests::service_with;
    use crate::auth::FirstUserPolicy;
    use crate::configuration::GoogleOAuthSettings;
    use actix_web::{test as actix_test, App};

    fn google() -> Option<GoogleOAuthClient> {
        Some(GoogleOAuthClient::new(
            GoogleOAuthSettings {
                client_id: "client-123".to_string(),
                client_secret: "shh".to_string(),
                redirect_uri: "http://localhost/api/v1/auth/google/callback".to_string(),
            },
            reqwest::Client::new(),
        ))
    }

    macro_rules! oauth_app {
        () => {{
            let (_, auth) = service_with(FirstUserPolicy::Unverified);
            actix_test::init_service(
                App::new()
                    .app_data(web::Data::new(google()))
                    .app_data(web::Data::new(auth))
                    .route("/login", web::get().to(google_login))
                    .route("/callback", web::get().to(google_callback)),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn test_login_redirects_with_state_cookie() {
        let app = oauth_app!();

        let resp =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/login").to_request())
                .await;

        assert_eq!(resp.status(), 307);
        let location = resp.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert!(location.starts_with("https://accounts.google.com/"));

        let cookie = resp
            .response()
            .cookies()
            .find(|c| c.name() == STATE_COOKIE)
            .expect("state cookie");
        assert!(cookie.http_only().unwrap_or(false));
        assert!(location.contains(&format!("state={}", cookie.value().replace('=', "%3D"))));
    }

    #[actix_web::test]
    async fn test_callback_requires_matching_state() {
        let app = oauth_app!();

        let no_cookie = actix_test::TestRequest::get()
            .uri("/callback?state=abc&code=xyz")
            .to_request();
        assert_eq!(actix_test::call_service(&app, no_cookie).await.status(), 400);

        let mismatch = actix_test::TestRequest::get()
            .uri("/callback?state=abc&code=xyz")
            .cookie(Cookie::new(STATE_COOKIE, "other"))
            .to_request();
        assert_eq!(actix_test::call_service(&app, mismatch).await.status(), 400);

        let no_code = actix_test::TestRequest::get()
            .uri("/callback?state=abc")
            .cookie(Cookie::new(STATE_COOKIE, "abc"))
            .to_request();
        assert_eq!(actix_test::call_service(&app, no_code).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_not_configured_is_404() {
        let (_, auth) = service_with(FirstUserPolicy::Unverified);
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(None::<GoogleOAuthClient>))
                .app_data(web::Data::new(auth))
                .route("/login", web::get().to(google_login)),
        )
        .await;

        let resp =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/login").to_request())
                .await;
        assert_eq!(resp.status(), 404);
    }
}
