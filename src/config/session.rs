use anyhow::Result;
use std::env;

pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
pub const OAUTH_STATE_TTL_SECONDS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Signs the OAuth `state` parameter.
    pub secret: String,
    pub ttl_seconds: u64,
}

impl SessionConfig {
    pub fn from_env() -> Result<Self> {
        let secret = env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET environment variable must be set"))?;

        Self::new(secret, env::var("SESSION_TTL_SECONDS").ok())
    }

    fn new(secret: String, ttl_raw: Option<String>) -> Result<Self> {
        if secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "SESSION_SECRET must be at least 32 characters"
            ));
        }

        let ttl_seconds = ttl_raw
            .and_then(|s| s.parse().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);

        Ok(Self {
            secret,
            ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_rejected() {
        assert!(SessionConfig::new("short".into(), None).is_err());
    }

    #[test]
    fn ttl_defaults_to_a_week() {
        let cfg = SessionConfig::new("x".repeat(32), Some("garbage".into())).unwrap();
        assert_eq!(cfg.ttl_seconds, 604_800);

        let cfg = SessionConfig::new("x".repeat(32), Some("60".into())).unwrap();
        assert_eq!(cfg.ttl_seconds, 60);
    }
}
