use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

/// Fallback signing secret for local development. Operators must set
/// JWT_SECRET before exposing the service.
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://dev.db".into());
        let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, falling back to the development secret");
            DEV_JWT_SECRET.into()
        });
        let ttl_days = match std::env::var("JWT_TTL_DAYS") {
            Ok(v) => v
                .parse::<i64>()
                .context("JWT_TTL_DAYS must be an integer number of days")?,
            Err(_) => 7,
        };
        Ok(Self {
            database_url,
            jwt: JwtConfig { secret, ttl_days },
        })
    }
}
