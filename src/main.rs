#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use sessionvault::{
    configure_services,
    oauth::AzureProvider,
    session::{new_session_store, SessionManager},
    settings::Settings,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = Settings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let session_manager = build_session_manager(&settings).map_err(std::io::Error::other)?;

    start_server(session_manager, settings).await
}

/// Build the session store and provider from settings
///
/// # Errors
///
/// Returns an error if the store type, refresh policy or provider configuration is invalid
fn build_session_manager(settings: &Settings) -> anyhow::Result<SessionManager> {
    let store = new_session_store(settings.store_options().map_err(anyhow::Error::msg)?)?;
    let provider = AzureProvider::new(
        settings.provider_data(),
        &settings.provider.tenant,
        settings.http_timeout(),
    )?;
    let policy = settings
        .refresh_failure_policy()
        .map_err(anyhow::Error::msg)?;

    Ok(SessionManager::new(store, Arc::new(provider), policy))
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(session_manager: SessionManager, settings: Settings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings, &session_manager);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(settings.clone()))
            .app_data(web::Data::new(session_manager.clone()))
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &Settings, session_manager: &SessionManager) {
    println!("Starting sessionvault on http://{bind_address}");
    println!("Session store: {}", settings.session.store_type);
    println!("Refresh failure policy: {:?}", session_manager.policy());
    println!();
    println!("OAuth2 endpoints:");
    println!("  GET  /oauth2/start     - Redirect to provider login");
    println!("  GET  /oauth2/callback  - OAuth callback");
    println!("  GET  /oauth2/userinfo  - Current principal (refreshes expired tokens)");
    println!("  GET|POST /oauth2/sign_out - Clear session");
    println!();
    println!("OAuth callback URL for the identity provider:");
    println!("  {}", settings.get_callback_url());
    println!();
    println!("System endpoints:");
    println!("  GET  /ping             - Health check");
}
