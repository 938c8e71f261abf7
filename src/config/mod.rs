use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    Postgres,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub data_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the token issuer, e.g. https://tenant.auth0.com/
    pub issuer_base_url: Option<String>,
    /// Expected audience claim on incoming tokens
    pub audience: Option<String>,
    /// When set, tokens are verified locally with HS256 instead of JWKS.
    /// Development and test deployments only.
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        // Explicit STORAGE_BACKEND wins; otherwise infer from DATABASE_URL presence
        let backend = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("postgres") | Ok("pg") => StorageBackend::Postgres,
            Ok("file") | Ok("json") => StorageBackend::File,
            _ if database_url.is_some() => StorageBackend::Postgres,
            _ => StorageBackend::File,
        };

        let data_file = env::var("DATA_FILE").unwrap_or_else(|_| "./data/data.json".to_string());

        let auth = AuthConfig {
            issuer_base_url: env::var("AUTH_ISSUER_BASE_URL").ok().filter(|s| !s.is_empty()),
            audience: env::var("AUTH_AUDIENCE").ok().filter(|s| !s.is_empty()),
            shared_secret: env::var("AUTH_SHARED_SECRET").ok().filter(|s| !s.is_empty()),
        };

        let cors_origins = parse_origins(env::var("ALLOWED_ORIGINS").as_deref().unwrap_or("*"));

        Self {
            environment,
            server: ServerConfig { port },
            storage: StorageConfig {
                backend,
                database_url,
                data_file,
            },
            auth,
            security: SecurityConfig { cors_origins },
        }
    }
}

/// Comma-separated origin list; "*" allows any origin.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
