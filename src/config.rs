// src/config.rs

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

/// Default JWT lifetime: one day.
pub const DEFAULT_JWT_EXPIRATION: u64 = 86_400;

/// Minimum and maximum number of choices per question.
pub const MIN_CHOICES: usize = 2;
pub const MAX_CHOICES: usize = 4;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    /// Optional instructor account created at start-up.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Directory where generated certificates and QR codes are written.
    pub media_root: PathBuf,
    /// Externally reachable base URL, encoded into certificate QR codes.
    pub public_url: String,
    /// Optional SVG template overriding the built-in certificate layout.
    pub certificate_template: Option<PathBuf>,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let media_root = env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("media"));

        let public_url = env::var("PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            media_root,
            public_url: public_url.trim_end_matches('/').to_string(),
            certificate_template: env::var("CERTIFICATE_TEMPLATE").ok().map(PathBuf::from),
            bind_addr,
        }
    }
}
