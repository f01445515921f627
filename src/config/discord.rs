use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub client_id: String,
    pub client_secret: String,
    pub site_url: String,
    pub api_base: String,
    pub cdn_base: String,
}

impl DiscordConfig {
    pub fn from_env() -> Result<Self> {
        let client_id = env::var("DISCORD_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("DISCORD_CLIENT_ID environment variable must be set"))?;
        let client_secret = env::var("DISCORD_CLIENT_SECRET").map_err(|_| {
            anyhow::anyhow!("DISCORD_CLIENT_SECRET environment variable must be set")
        })?;
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let api_base =
            env::var("DISCORD_API_BASE").unwrap_or_else(|_| "https://discord.com/api".to_string());
        let cdn_base =
            env::var("DISCORD_CDN_BASE").unwrap_or_else(|_| "https://cdn.discordapp.com".to_string());

        Ok(Self {
            client_id,
            client_secret,
            site_url: site_url.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/api/auth/discord/callback", self.site_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_is_under_site_url() {
        let cfg = DiscordConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            site_url: "https://fivehub.example".into(),
            api_base: "https://discord.com/api".into(),
            cdn_base: "https://cdn.discordapp.com".into(),
        };
        assert_eq!(
            cfg.redirect_uri(),
            "https://fivehub.example/api/auth/discord/callback"
        );
    }
}
