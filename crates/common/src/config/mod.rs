//! Layered gateway configuration
//!
//! Later sources win: built-in defaults, `config/default`, `config/{APP_ENV}`,
//! `config/local`, then `APP__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Manuscript storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,

    /// Bootstrap admin account
    #[serde(default)]
    pub admin: AdminConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,

    /// Allowed CORS origin (any when unset)
    pub client_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL, or "memory" for the in-process store
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Run embedded migrations on startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret for token signing
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Length of passwords generated for auto-provisioned authors
    #[serde(default = "default_generated_password_len")]
    pub generated_password_len: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage provider: local, cloudinary
    #[serde(default = "default_storage_provider")]
    pub provider: String,

    /// Directory for the local provider
    #[serde(default = "default_local_dir")]
    pub local_dir: String,

    /// Base URL under which local files are served
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Folder (prefix) for uploaded manuscripts
    #[serde(default = "default_storage_folder")]
    pub folder: String,

    /// Cloudinary cloud name
    pub cloud_name: Option<String>,

    /// Cloudinary API key
    pub api_key: Option<String>,

    /// Cloudinary API secret
    pub api_secret: Option<String>,

    /// Upload timeout in seconds
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// Mail provider: log, http
    #[serde(default = "default_mail_provider")]
    pub provider: String,

    /// Endpoint of the transactional mail API
    pub api_url: Option<String>,

    /// Bearer key for the mail API
    pub api_key: Option<String>,

    /// Sender address
    #[serde(default = "default_mail_from")]
    pub from: String,

    /// Portal URL used in email links
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Display name for the seeded admin
    pub name: Option<String>,

    /// Email of the admin created on first start
    pub email: Option<String>,

    /// Password of the admin created on first start
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "peerdesk=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_upload() -> usize { 20 * 1024 * 1024 }
fn default_database_url() -> String { "postgres://localhost/peerdesk".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_jwt_expiration() -> u64 { 86_400 }
fn default_generated_password_len() -> usize { 16 }
fn default_storage_provider() -> String { "local".to_string() }
fn default_local_dir() -> String { "uploads".to_string() }
fn default_public_base_url() -> String { "http://localhost:5000/uploads".to_string() }
fn default_storage_folder() -> String { "research_papers".to_string() }
fn default_upload_timeout() -> u64 { 60 }
fn default_mail_provider() -> String { "log".to_string() }
fn default_mail_from() -> String { "Research Portal <no-reply@localhost>".to_string() }
fn default_portal_url() -> String { "http://localhost:5173".to_string() }
fn default_mail_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "peerdesk".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Read every layer for the current `APP_ENV` (default "development")
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let files = [
            "config/default".to_string(),
            format!("config/{}", env),
            "config/local".to_string(),
        ];

        files
            .iter()
            .fold(Config::builder(), |builder, name| {
                builder.add_source(File::with_name(name).required(false))
            })
            // e.g. APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Whether the in-process store was requested instead of Postgres
    pub fn uses_memory_store(&self) -> bool {
        self.database.url == "memory"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload(),
            client_url: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            generated_password_len: default_generated_password_len(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            local_dir: default_local_dir(),
            public_base_url: default_public_base_url(),
            folder: default_storage_folder(),
            cloud_name: None,
            api_key: None,
            api_secret: None,
            timeout_secs: default_upload_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            api_url: None,
            api_key: None,
            from: default_mail_from(),
            portal_url: default_portal_url(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
