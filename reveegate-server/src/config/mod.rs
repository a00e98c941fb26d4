//! Configuration module for reveegate-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables, and turns it into the explicit runtime
//! objects handed to the core constructors.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::RuntimeConfig;
use reveegate_core::processors::IngressConfig;
use reveegate_core::providers::{MidtransConfig, XenditConfig};
use reveegate_core::realtime::{ConnectionConfig, HubConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("REDIS_URL environment variable not set")]
    MissingRedisUrl,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides, validate and convert.
    pub fn load(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        build_runtime_config(file_config)
    }
}

/// Validate a parsed file and convert it into runtime objects.
pub fn build_runtime_config(file_config: FileConfig) -> Result<RuntimeConfig, ConfigError> {
    if file_config.auth.jwt_secret.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.jwt_secret must not be empty".into(),
        ));
    }
    if file_config.midtrans.is_none() && file_config.xendit.is_none() {
        return Err(ConfigError::ValidationError(
            "at least one of [midtrans] or [xendit] must be configured".into(),
        ));
    }

    let midtrans = match file_config.midtrans {
        Some(m) if m.server_key.trim().is_empty() => {
            return Err(ConfigError::ValidationError(
                "midtrans.server_key must not be empty".into(),
            ));
        }
        Some(m) => Some(MidtransConfig {
            server_key: m.server_key,
            is_production: m.is_production,
            base_url: m.base_url,
        }),
        None => None,
    };

    let xendit = match file_config.xendit {
        Some(x) if x.webhook_token.trim().is_empty() => {
            return Err(ConfigError::ValidationError(
                "xendit.webhook_token must not be empty".into(),
            ));
        }
        Some(x) => Some(XenditConfig {
            webhook_token: x.webhook_token,
            secret_key: x.secret_key,
            base_url: x.base_url,
        }),
        None => None,
    };

    let realtime = &file_config.realtime;
    let connection = ConnectionConfig::new(
        Duration::from_secs(realtime.write_wait_secs),
        Duration::from_secs(realtime.pong_wait_secs),
        realtime.max_message_size,
        realtime.send_buffer,
    );
    connection
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("realtime: {e}")))?;

    if file_config.idempotency.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "idempotency.ttl_secs must be greater than zero".into(),
        ));
    }

    Ok(RuntimeConfig {
        listen: file_config.server.listen,
        midtrans,
        xendit,
        jwt_secret: file_config.auth.jwt_secret,
        min_overlay_token_len: file_config.auth.min_overlay_token_len,
        connection,
        hub: HubConfig {
            admin_donation_feed: realtime.admin_donation_feed,
        },
        ingress: IngressConfig {
            idempotency_ttl: Duration::from_secs(file_config.idempotency.ttl_secs),
            fail_closed: file_config.idempotency.fail_closed,
        },
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

/// Get the Redis URL from the environment.
pub fn get_redis_url() -> Result<String, ConfigError> {
    std::env::var("REDIS_URL").map_err(|_| ConfigError::MissingRedisUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn builds_runtime_objects() {
        let runtime = build_runtime_config(parse(
            r#"
[midtrans]
server_key = "SB-Mid-server-abc"

[auth]
jwt_secret = "jwt-secret"

[realtime]
pong_wait_secs = 30
"#,
        ))
        .unwrap();
        assert!(runtime.midtrans.is_some());
        assert!(runtime.xendit.is_none());
        assert_eq!(runtime.connection.ping_period, Duration::from_secs(27));
        assert_eq!(runtime.ingress.idempotency_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_missing_providers() {
        let err = build_runtime_config(parse(
            r#"
[auth]
jwt_secret = "jwt-secret"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_empty_secrets() {
        let err = build_runtime_config(parse(
            r#"
[xendit]
webhook_token = ""
secret_key = "k"

[auth]
jwt_secret = "jwt-secret"
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("webhook_token"));
    }

    #[test]
    fn rejects_zero_pong_wait() {
        let err = build_runtime_config(parse(
            r#"
[midtrans]
server_key = "SB-Mid-server-abc"

[auth]
jwt_secret = "jwt-secret"

[realtime]
pong_wait_secs = 0
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().starts_with("validation error: realtime"));
    }
}
