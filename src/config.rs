// src/config.rs - Configuration: TOML file, .env, then environment overrides
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use anyhow::{Context, Result};

/// Development-only secret; rejected in production.
pub const DEV_JWT_SECRET: &str = "hygie-development-secret-change-me-0123456789";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:hygie.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_minutes: 60,
            refresh_token_days: 7,
            bcrypt_cost: 12,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_request_size: 1024 * 1024,
            require_https: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads `.env`, the optional `CONFIG_FILE`, then the process environment.
    pub fn load() -> Result<Self> {
        load_env_file()?;

        let mut config = match env::var("CONFIG_FILE") {
            Ok(config_file) => {
                let config_str = fs::read_to_string(Path::new(&config_file))
                    .with_context(|| format!("Failed to read config file: {}", config_file))?;
                Self::from_toml_str(&config_str)
                    .with_context(|| format!("Failed to parse config file: {}", config_file))?
            }
            Err(_) => Config::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate().context("Configuration validation failed")?;

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies `KEY=value` overrides; unparsable numbers are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                    None
                }
            }
        }

        if let Some(host) = lookup("HYGIE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parsed("HYGIE_PORT", lookup("HYGIE_PORT")) {
            self.server.port = port;
        }
        if let Some(workers) = parsed("HYGIE_WORKERS", lookup("HYGIE_WORKERS")) {
            self.server.workers = Some(workers);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = parsed("DATABASE_MAX_CONNECTIONS", lookup("DATABASE_MAX_CONNECTIONS")) {
            self.database.max_connections = max;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(minutes) = parsed("ACCESS_TOKEN_MINUTES", lookup("ACCESS_TOKEN_MINUTES")) {
            self.auth.access_token_minutes = minutes;
        }
        if let Some(days) = parsed("REFRESH_TOKEN_DAYS", lookup("REFRESH_TOKEN_DAYS")) {
            self.auth.refresh_token_days = days;
        }
        if let Some(cost) = parsed("BCRYPT_COST", lookup("BCRYPT_COST")) {
            self.auth.bcrypt_cost = cost;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.security.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            );
        }
        if self.database.max_connections < self.database.min_connections {
            anyhow::bail!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            );
        }
        if self.auth.access_token_minutes <= 0 || self.auth.refresh_token_days <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            anyhow::bail!("bcrypt cost must be between 4 and 31 (current: {})", self.auth.bcrypt_cost);
        }
        Ok(())
    }

    pub fn validate_production(&self) -> Result<()> {
        if self.auth.jwt_secret == DEV_JWT_SECRET {
            anyhow::bail!("Development JWT secret in production! Set JWT_SECRET.");
        }
        if self.security.allowed_origins.iter().any(|o| o == "*") {
            anyhow::bail!("Wildcard CORS origins not allowed in production!");
        }
        Ok(())
    }

    pub fn environment() -> String {
        env::var("HYGIE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    pub fn is_production() -> bool {
        Self::environment() == "production"
    }

    pub fn print_startup_info(&self) {
        log::info!("Hygie starting up ({})", Self::environment());
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!("Database: {}", self.database.url);
        log::info!(
            "Auth: JWT (access {} min, refresh {} days)",
            self.auth.access_token_minutes,
            self.auth.refresh_token_days
        );
        if !Self::is_production() {
            log::warn!("Running in development mode");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
