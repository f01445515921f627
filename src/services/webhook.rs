use crate::services::site_config::SiteSettings;
use serde_json::json;
use std::time::Duration;

/// Best-effort Discord webhook poster. Delivery happens in the background and
/// failures are only logged.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { http })
    }

    pub fn resource_uploaded(&self, settings: &SiteSettings, title: &str, slug: &str, author: &str) {
        if !settings.notify_on_new_resource {
            return;
        }
        if let Some(url) = &settings.discord_webhook {
            self.post(
                url.clone(),
                format!("New resource **{}** by {} (`{}`)", title, author, slug),
            );
        }
    }

    pub fn user_registered(&self, settings: &SiteSettings, username: &str) {
        if !settings.notify_on_new_user {
            return;
        }
        if let Some(url) = &settings.discord_webhook {
            self.post(url.clone(), format!("Welcome **{}** to the community!", username));
        }
    }

    fn post(&self, url: String, content: String) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let result = http
                .post(&url)
                .json(&json!({ "content": content }))
                .send()
                .await
                .and_then(|resp| resp.error_for_status());
            if let Err(e) = result {
                tracing::warn!("Discord webhook delivery failed: {}", e);
            }
        });
    }
}
