// OAuth2 endpoints: start, callback, userinfo, sign-out and health
use crate::session::{AuthOutcome, SessionManager};
use crate::settings::Settings;
use crate::utils::crypto::generate_nonce;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub user: String,
}

/// Redirect the user agent to the provider's login page
///
/// # Errors
/// Never fails; the `Result` is what actix expects from a handler
pub async fn oauth_start(
    settings: web::Data<Settings>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let state = generate_nonce(24);
    let login_url = session_manager
        .provider()
        .login_url(&settings.get_callback_url(), &state);

    info!(
        "Redirecting to {} login",
        session_manager.provider().data().provider_name
    );
    Ok(HttpResponse::Found()
        .append_header(("Location", login_url))
        .finish())
}

/// Redeem the authorization code and start a session
///
/// # Errors
/// Never fails; provider and store errors become error responses
pub async fn oauth_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    settings: web::Data<Settings>,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    if let Some(err) = &query.error {
        warn!("Provider returned an error on callback: {err}");
        return Ok(HttpResponse::Forbidden().body(format!("Login failed: {err}")));
    }

    let code = query.code.as_deref().unwrap_or_default();
    if query.state.is_none() {
        warn!("OAuth callback without state parameter");
    }

    match session_manager
        .complete_login(&req, &settings.get_callback_url(), code)
        .await
    {
        Ok((_, cookie)) => Ok(HttpResponse::Found()
            .cookie(cookie)
            .append_header(("Location", "/"))
            .finish()),
        Err(e) => {
            error!("Failed to complete login: {e}");
            Ok(HttpResponse::InternalServerError().body("Login failed"))
        }
    }
}

/// Return the authenticated principal, refreshing the session when needed
///
/// # Errors
/// Never fails; an unusable session yields 401
pub async fn oauth_userinfo(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    match session_manager.authenticate(&req).await {
        AuthOutcome::Authenticated { session, cookie } => {
            let mut response = HttpResponse::Ok();
            if let Some(cookie) = cookie {
                response.cookie(cookie);
            }
            Ok(response.json(UserInfo {
                email: session.email,
                user: session.user,
            }))
        }
        AuthOutcome::Unauthenticated { cookie } => {
            let mut response = HttpResponse::Unauthorized();
            if let Some(cookie) = cookie {
                response.cookie(cookie);
            }
            Ok(response.finish())
        }
    }
}

/// Clear the session and redirect home
///
/// # Errors
/// Never fails; store errors still redirect
pub async fn oauth_sign_out(
    req: HttpRequest,
    session_manager: web::Data<SessionManager>,
) -> Result<HttpResponse> {
    let mut response = HttpResponse::Found();
    match session_manager.sign_out(&req).await {
        Ok(cookie) => {
            response.cookie(cookie);
            info!("User signed out and session cleared");
        }
        Err(e) => error!("Failed to clear session: {e}"),
    }
    Ok(response.append_header(("Location", "/")).finish())
}

/// Health check
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

/// Register the OAuth2 routes
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(ping))
        .route("/oauth2/start", web::get().to(oauth_start))
        .route("/oauth2/callback", web::get().to(oauth_callback))
        .route("/oauth2/userinfo", web::get().to(oauth_userinfo))
        .route("/oauth2/sign_out", web::get().to(oauth_sign_out))
        .route("/oauth2/sign_out", web::post().to(oauth_sign_out));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RefreshFailurePolicy;
    use crate::testing::mock::MockProvider;
    use crate::testing::TestFixtures;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    fn app_data() -> (web::Data<Settings>, web::Data<SessionManager>) {
        let manager = SessionManager::new(
            TestFixtures::cookie_store(),
            Arc::new(MockProvider::new()),
            RefreshFailurePolicy::default(),
        );
        (
            web::Data::new(TestFixtures::settings()),
            web::Data::new(manager),
        )
    }

    #[actix_web::test]
    async fn test_ping() {
        let app = test::init_service(App::new().configure(configure_services)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_start_redirects_to_provider() {
        let (settings, manager) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(settings)
                .app_data(manager)
                .configure(configure_services),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/oauth2/start").to_request()).await;

        assert_eq!(resp.status(), StatusCode::FOUND);
        let location = resp.headers().get("Location").unwrap().to_str().unwrap();
        assert!(location.starts_with("https://login.example.com/authorize?"));
        assert!(location.contains("state="));
    }

    #[actix_web::test]
    async fn test_login_then_userinfo_then_sign_out() {
        let (settings, manager) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(settings)
                .app_data(manager)
                .configure(configure_services),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/oauth2/callback?code=abc&state=xyz")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let cookie = resp.response().cookies().next().unwrap().into_owned();

        let req = test::TestRequest::get()
            .uri("/oauth2/userinfo")
            .cookie(cookie.clone())
            .to_request();
        let info: UserInfo = test::call_and_read_body_json(&app, req).await;
        assert_eq!(info.email, MockProvider::EMAIL);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/oauth2/sign_out")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let removal = resp.response().cookies().next().unwrap();
        assert_eq!(removal.value(), "");
    }

    #[actix_web::test]
    async fn test_userinfo_without_session() {
        let (settings, manager) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(settings)
                .app_data(manager)
                .configure(configure_services),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/oauth2/userinfo").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_callback_error_parameter() {
        let (settings, manager) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(settings)
                .app_data(manager)
                .configure(configure_services),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/oauth2/callback?error=access_denied")
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_callback_without_code_fails() {
        let (settings, manager) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(settings)
                .app_data(manager)
                .configure(configure_services),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/oauth2/callback?state=xyz").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
