//! Server configuration from environment variables

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Origins allowed by the CORS layer; `*` allows any.
    pub allowed_origins: Vec<String>,
    /// HS256 secret for the default JWT verifier.
    pub jwt_secret: String,
    /// Maximum concurrent WebSocket connections per user.
    pub max_connections_per_user: usize,
    /// Per-IP request budget for the HTTP surface.
    pub rate_limit_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("SERVER_PORT", 8080),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            max_connections_per_user: env_parse("MAX_CONNECTIONS_PER_USER", 5),
            rate_limit_per_minute: env_parse("RATE_LIMIT_MAX_REQUESTS", 500),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let config = Config::from_env();
        assert!(config.port > 0);
        assert!(config.max_connections_per_user > 0);
    }
}
