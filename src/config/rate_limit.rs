use super::parse_bool_env;
use std::{env, str::FromStr};
use thiserror::Error;

/// Token bucket settings for one route group: refill rate and bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub per_second: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(per_second: u64, burst_size: u32) -> Self {
        Self {
            per_second,
            burst_size,
        }
    }
}

impl FromStr for RateLimitRule {
    type Err = RateLimitParseError;

    /// Parses `per_second:burst`, both strictly positive.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || RateLimitParseError::Rule(raw.to_string());
        let (rate, burst) = raw.split_once(':').ok_or_else(malformed)?;
        let per_second: u64 = rate.trim().parse().map_err(|_| malformed())?;
        let burst_size: u32 = burst.trim().parse().map_err(|_| malformed())?;
        if per_second == 0 || burst_size == 0 {
            return Err(RateLimitParseError::Zero(raw.to_string()));
        }
        Ok(Self::new(per_second, burst_size))
    }
}

/// The three router groups that get their own limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    /// Discord sign-in, callback and logout.
    Auth,
    /// Anonymous catalogue, comments, ratings, pages and leaderboard reads.
    Public,
    /// Everything behind a session: downloads, uploads, tickets, admin.
    Protected,
}

impl FromStr for RouteGroup {
    type Err = RateLimitParseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "auth" | "login" => Ok(Self::Auth),
            "public" | "public_read" | "public-read" => Ok(Self::Public),
            "protected" | "user" => Ok(Self::Protected),
            other => Err(RateLimitParseError::Group(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("RATE_LIMIT_CONFIG is empty")]
    Empty,
    #[error("'{0}' is not a per_second:burst rule")]
    Rule(String),
    #[error("'{0}' must use non-zero rate and burst")]
    Zero(String),
    #[error("unknown route group '{0}', expected auth, public or protected")]
    Group(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth: RateLimitRule,
    pub public_read: RateLimitRule,
    pub protected: RateLimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: RateLimitRule::new(5, 10),
            public_read: RateLimitRule::new(30, 60),
            protected: RateLimitRule::new(10, 20),
        }
    }
}

impl RateLimitConfig {
    /// `RATE_LIMIT_ENABLED` toggles the limiter. `RATE_LIMIT_CONFIG` is either a
    /// single rule for every group (`12:24`) or a list of group overrides
    /// (`auth=5:10,public=30:60`). A malformed value keeps the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = parse_bool_env("RATE_LIMIT_ENABLED", cfg.enabled);

        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            match parse_overrides(&raw) {
                Ok(overrides) => cfg.apply(&overrides),
                Err(err) => tracing::warn!("Ignoring RATE_LIMIT_CONFIG '{}': {}", raw, err),
            }
        }
        cfg
    }

    pub fn rule(&self, group: RouteGroup) -> RateLimitRule {
        match group {
            RouteGroup::Auth => self.auth,
            RouteGroup::Public => self.public_read,
            RouteGroup::Protected => self.protected,
        }
    }

    fn set(&mut self, group: RouteGroup, rule: RateLimitRule) {
        match group {
            RouteGroup::Auth => self.auth = rule,
            RouteGroup::Public => self.public_read = rule,
            RouteGroup::Protected => self.protected = rule,
        }
    }

    fn apply(&mut self, overrides: &[(RouteGroup, RateLimitRule)]) {
        for (group, rule) in overrides {
            self.set(*group, *rule);
        }
    }
}

const ALL_GROUPS: [RouteGroup; 3] = [RouteGroup::Auth, RouteGroup::Public, RouteGroup::Protected];

/// Later entries win when a group is named twice.
fn parse_overrides(raw: &str) -> Result<Vec<(RouteGroup, RateLimitRule)>, RateLimitParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RateLimitParseError::Empty);
    }

    if !raw.contains('=') {
        let rule: RateLimitRule = raw.parse()?;
        return Ok(ALL_GROUPS.iter().map(|g| (*g, rule)).collect());
    }

    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| -> Result<(RouteGroup, RateLimitRule), RateLimitParseError> {
            let (group, rule) = item
                .split_once('=')
                .ok_or_else(|| RateLimitParseError::Rule(item.to_string()))?;
            Ok((group.parse()?, rule.trim().parse()?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(raw: &str) -> RateLimitConfig {
        let mut cfg = RateLimitConfig::default();
        cfg.apply(&parse_overrides(raw).unwrap());
        cfg
    }

    #[test]
    fn single_rule_applies_to_every_group() {
        let cfg = configured("12:24");
        for group in ALL_GROUPS {
            assert_eq!(cfg.rule(group), RateLimitRule::new(12, 24));
        }
    }

    #[test]
    fn group_overrides_keep_other_defaults() {
        let cfg = configured("auth=2:4, public-read=8:16");
        assert_eq!(cfg.auth, RateLimitRule::new(2, 4));
        assert_eq!(cfg.public_read, RateLimitRule::new(8, 16));
        assert_eq!(cfg.protected, RateLimitRule::new(10, 20));
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            parse_overrides("0:5"),
            Err(RateLimitParseError::Zero("0:5".to_string()))
        );
        assert_eq!(
            parse_overrides("auth=abc"),
            Err(RateLimitParseError::Rule("abc".to_string()))
        );
        assert!(matches!(
            parse_overrides("downloads=1:1"),
            Err(RateLimitParseError::Group(_))
        ));
        assert_eq!(parse_overrides("  "), Err(RateLimitParseError::Empty));
    }
}
