use crate::config::discord::DiscordConfig;
use anyhow::Context;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

const OAUTH_SCOPES: &str = "identify email";

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl DiscordProfile {
    pub fn display_name(&self) -> String {
        self.global_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
            .to_string()
    }

    pub fn avatar_url(&self, cdn_base: &str) -> Option<String> {
        self.avatar.as_ref().map(|hash| {
            let ext = if hash.starts_with("a_") { "gif" } else { "png" };
            format!("{}/avatars/{}/{}.{}", cdn_base, self.id, hash, ext)
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Thin client for the three Discord calls the login flow needs.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    config: DiscordConfig,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building Discord HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    pub fn authorize_url(&self, state: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/oauth2/authorize", self.config.api_base),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri().as_str()),
                ("response_type", "code"),
                ("scope", OAUTH_SCOPES),
                ("state", state),
            ],
        )
        .context("building Discord authorize URL")?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> anyhow::Result<String> {
        let redirect_uri = self.config.redirect_uri();
        let resp = self
            .http
            .post(format!("{}/oauth2/token", self.config.api_base))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await
            .context("requesting Discord token")?
            .error_for_status()
            .context("Discord token endpoint rejected the code")?;

        let token: TokenResponse = resp.json().await.context("decoding Discord token")?;
        Ok(token.access_token)
    }

    pub async fn fetch_profile(&self, access_token: &str) -> anyhow::Result<DiscordProfile> {
        let profile = self
            .http
            .get(format!("{}/users/@me", self.config.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .context("requesting Discord profile")?
            .error_for_status()
            .context("Discord profile request failed")?
            .json::<DiscordProfile>()
            .await
            .context("decoding Discord profile")?;
        Ok(profile)
    }
}
