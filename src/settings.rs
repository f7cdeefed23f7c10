use crate::oauth::azure::DEFAULT_HTTP_TIMEOUT;
use crate::oauth::ProviderData;
use crate::session::cookie::{CookieOptions, COOKIE_NAME};
use crate::session::manager::RefreshFailurePolicy;
use crate::session::store::StoreOptions;
use crate::utils::crypto::{Cipher, FieldCipher};
use actix_web::cookie::SameSite;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub provider: ProviderSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub redirect_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session store backend: "cookie" or "cache"
    pub store_type: String,
    /// Signs session cookies and, when `encrypt_tokens` is set, keys the field cipher
    pub cookie_secret: String,
    /// Without encryption only the principal's identity is persisted
    pub encrypt_tokens: bool,
    /// Cookie and cached session lifetime in hours
    pub expire_hours: u64,
    /// Interval of the cache store's expiry sweep
    pub cache_sweep_seconds: u64,
    /// "reauthenticate" or "keep_stale"
    pub refresh_failure_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub name: String,
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
    // Empty endpoint values fall back to the Azure defaults
    pub login_url: String,
    pub redeem_url: String,
    pub profile_url: String,
    pub protected_resource: String,
    pub scope: String,
    pub approval_prompt: String,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4180,
            redirect_base_url: "http://localhost:4180".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            store_type: "cookie".to_string(),
            cookie_secret: String::new(), // Will be generated if empty
            encrypt_tokens: true,
            expire_hours: 168,
            cache_sweep_seconds: 60,
            refresh_failure_policy: "reauthenticate".to_string(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: COOKIE_NAME.to_string(),
            domain: None,
            path: "/".to_string(),
            secure: true, // Default to secure cookies
            http_only: true,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            login_url: String::new(),
            redeem_url: String::new(),
            profile_url: String::new(),
            protected_resource: String::new(),
            scope: String::new(),
            approval_prompt: String::new(),
            http_timeout_seconds: DEFAULT_HTTP_TIMEOUT.as_secs(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings file cannot be read or parsed
    /// - TOML parsing fails
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        // Load base settings from TOML or defaults
        let mut settings = Self::load_base_settings()?;

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut settings);

        Self::initialize_logging(&settings.logging);
        Ok(settings)
    }

    /// Initialize `env_logger`, defaulting to the configured level when `RUST_LOG` is unset
    fn initialize_logging(logging_settings: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(logging_settings.level.as_str());
        if env_logger::Builder::from_env(env).try_init().is_err() {
            log::debug!("Logger already initialized");
        }
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `SESSIONVAULT_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_file(default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("SESSIONVAULT_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ SESSIONVAULT_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse a TOML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings TOML
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(store_type) = std::env::var("SESSION_STORE_TYPE") {
            session_settings.store_type = store_type;
        }
        if let Ok(policy) = std::env::var("REFRESH_FAILURE_POLICY") {
            session_settings.refresh_failure_policy = policy;
        }
        if let Ok(encrypt) = std::env::var("SESSION_ENCRYPT_TOKENS") {
            if let Ok(encrypt) = encrypt.parse::<bool>() {
                session_settings.encrypt_tokens = encrypt;
            }
        }
        Self::apply_numeric_env_override("SESSION_EXPIRE_HOURS", &mut session_settings.expire_hours);
        Self::apply_numeric_env_override(
            "CACHE_SWEEP_SECONDS",
            &mut session_settings.cache_sweep_seconds,
        );

        Self::handle_cookie_secret_override(session_settings);
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Helper function to handle cookie secret environment override and generation
    fn handle_cookie_secret_override(session_settings: &mut SessionSettings) {
        let env_secret_set = std::env::var("COOKIE_SECRET").is_ok_and(|secret| {
            if secret.is_empty() {
                false
            } else {
                session_settings.cookie_secret = secret;
                true
            }
        });

        if !env_secret_set && session_settings.cookie_secret.is_empty() {
            session_settings.cookie_secret = Self::generate_random_cookie_secret();
            Self::warn_about_generated_secret();
        }
    }

    /// Generate 32 bytes (256 bits) of entropy for AES-256 compatibility
    fn generate_random_cookie_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    fn warn_about_generated_secret() {
        eprintln!("⚠️  WARNING: Using auto-generated cookie secret");
        eprintln!("🔒 For production use, set the COOKIE_SECRET environment variable");
        eprintln!("   or configure session.cookie_secret in Settings.toml");
        eprintln!("💡 Sessions will not survive a restart unless the secret is configured");
    }

    fn apply_cookie_env_overrides(cookie_settings: &mut CookieSettings) {
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                cookie_settings.secure = cookie_secure;
            }
        }
        if let Ok(name) = std::env::var("COOKIE_NAME") {
            cookie_settings.name = name;
        }
        if let Ok(domain) = std::env::var("COOKIE_DOMAIN") {
            cookie_settings.domain = (!domain.is_empty()).then_some(domain);
        }
    }

    fn apply_provider_env_overrides(provider_settings: &mut ProviderSettings) {
        if let Ok(tenant) = std::env::var("AZURE_TENANT") {
            provider_settings.tenant = tenant;
        }
        if let Ok(client_id) = std::env::var("CLIENT_ID") {
            provider_settings.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("CLIENT_SECRET") {
            provider_settings.client_secret = client_secret;
        }
        if let Ok(approval_prompt) = std::env::var("APPROVAL_PROMPT") {
            provider_settings.approval_prompt = approval_prompt;
        }
        Self::apply_numeric_env_override(
            "HTTP_TIMEOUT_SECONDS",
            &mut provider_settings.http_timeout_seconds,
        );
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if line.trim_start().starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// OAuth2 callback URL registered with the provider
    #[must_use]
    pub fn get_callback_url(&self) -> String {
        format!(
            "{}/oauth2/callback",
            self.application.redirect_base_url.trim_end_matches('/')
        )
    }

    /// Session lifetime as configured
    #[must_use]
    pub fn session_lifetime(&self) -> chrono::Duration {
        let hours = i64::try_from(self.session.expire_hours).unwrap_or(i64::MAX / 3600);
        chrono::Duration::hours(hours)
    }

    /// Cookie options for session cookies
    #[must_use]
    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            name: self.cookies.name.clone(),
            secret: self.session.cookie_secret.as_bytes().to_vec(),
            domain: self.cookies.domain.clone(),
            path: self.cookies.path.clone(),
            expire: self.session_lifetime(),
            secure: self.cookies.secure,
            http_only: self.cookies.http_only,
            same_site: SameSite::Lax,
        }
    }

    /// Field cipher keyed with the cookie secret, or `None` when encryption is off
    #[must_use]
    pub fn cipher(&self) -> Option<Arc<dyn FieldCipher>> {
        if !self.session.encrypt_tokens {
            return None;
        }
        let cipher: Arc<dyn FieldCipher> = Arc::new(Cipher::new(self.session.cookie_secret.as_bytes()));
        Some(cipher)
    }

    /// Everything the session store factory needs
    ///
    /// # Errors
    ///
    /// Returns an error if no cookie secret is configured
    pub fn store_options(&self) -> Result<StoreOptions, String> {
        if self.session.cookie_secret.is_empty() {
            return Err("a cookie secret is required to sign session cookies".to_string());
        }
        Ok(StoreOptions {
            kind: self.session.store_type.clone(),
            cookie: self.cookie_options(),
            cipher: self.cipher(),
            sweep_interval: Duration::from_secs(self.session.cache_sweep_seconds.max(1)),
        })
    }

    /// Provider configuration; empty values are filled with provider defaults later
    #[must_use]
    pub fn provider_data(&self) -> ProviderData {
        ProviderData {
            provider_name: String::new(),
            client_id: self.provider.client_id.clone(),
            client_secret: self.provider.client_secret.clone(),
            login_url: self.provider.login_url.clone(),
            redeem_url: self.provider.redeem_url.clone(),
            profile_url: self.provider.profile_url.clone(),
            protected_resource: self.provider.protected_resource.clone(),
            scope: self.provider.scope.clone(),
            approval_prompt: self.provider.approval_prompt.clone(),
        }
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.http_timeout_seconds)
    }

    /// Parsed refresh failure policy
    ///
    /// # Errors
    ///
    /// Returns an error if the configured policy name is unknown
    pub fn refresh_failure_policy(&self) -> Result<RefreshFailurePolicy, String> {
        self.session.refresh_failure_policy.parse()
    }
}
