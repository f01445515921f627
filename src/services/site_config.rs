use crate::{
    error::{AppError, AppResult},
    models::{site_config, SiteConfig},
    services::cache::CacheService,
};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

const CACHE_KEY: &str = "site_config";
const CACHE_TTL_SECS: u64 = 300;

/// Every known key with its default value and a short description.
pub const DEFAULTS: &[(&str, &str, &str)] = &[
    ("default_download_limit", "10", "Daily downloads for new accounts"),
    ("referral_bonus_downloads", "5", "Extra daily downloads per referral"),
    ("max_referral_bonus", "0", "Optional cap on referral bonus (0 = uncapped)"),
    ("auto_approve_resources", "false", "Publish uploads without moderation"),
    ("max_file_size", "100", "Maximum archive size in MB"),
    ("allowed_file_types", ".zip,.rar,.7z", "Accepted archive extensions"),
    ("resource_expiration_days", "0", "Days before a resource expires (0 = never)"),
    ("registration_enabled", "true", "Allow new accounts"),
    ("maintenance_mode", "false", "Show the maintenance banner"),
    ("discord_webhook", "", "Webhook URL for notifications"),
    ("notify_on_new_resource", "true", "Post a webhook message on upload"),
    ("notify_on_new_user", "true", "Post a webhook message on signup"),
];

/// Typed view over the key/value table, with defaults for anything missing or malformed.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSettings {
    pub default_download_limit: i32,
    pub referral_bonus_downloads: i32,
    pub max_referral_bonus: i32,
    pub auto_approve_resources: bool,
    pub max_file_size_bytes: u64,
    pub allowed_file_types: Vec<String>,
    pub resource_expiration_days: i64,
    pub registration_enabled: bool,
    pub maintenance_mode: bool,
    pub discord_webhook: Option<String>,
    pub notify_on_new_resource: bool,
    pub notify_on_new_user: bool,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl SiteSettings {
    pub fn from_map(values: &HashMap<String, String>) -> Self {
        let raw = |key: &str| lookup(values, key).to_string();
        let int = |key: &str| -> i64 {
            lookup(values, key)
                .trim()
                .parse()
                .ok()
                .or_else(|| default_for(key).and_then(|d| d.parse().ok()))
                .unwrap_or(0)
        };
        let flag = |key: &str| -> bool {
            crate::config::parse_bool(lookup(values, key))
                .or_else(|| default_for(key).and_then(crate::config::parse_bool))
                .unwrap_or(false)
        };

        let allowed_file_types = raw("allowed_file_types")
            .split(',')
            .map(|ext| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();

        let discord_webhook = Some(raw("discord_webhook").trim().to_string())
            .filter(|url| !url.is_empty());

        Self {
            default_download_limit: int("default_download_limit").clamp(0, i32::MAX as i64) as i32,
            referral_bonus_downloads: int("referral_bonus_downloads").clamp(0, i32::MAX as i64)
                as i32,
            max_referral_bonus: int("max_referral_bonus").clamp(0, i32::MAX as i64) as i32,
            auto_approve_resources: flag("auto_approve_resources"),
            max_file_size_bytes: int("max_file_size").max(0) as u64 * 1024 * 1024,
            allowed_file_types,
            resource_expiration_days: int("resource_expiration_days").max(0),
            registration_enabled: flag("registration_enabled"),
            maintenance_mode: flag("maintenance_mode"),
            discord_webhook,
            notify_on_new_resource: flag("notify_on_new_resource"),
            notify_on_new_user: flag("notify_on_new_user"),
        }
    }
}

fn lookup<'a>(values: &'a HashMap<String, String>, key: &str) -> &'a str {
    values
        .get(key)
        .map(String::as_str)
        .or_else(|| default_for(key))
        .unwrap_or("")
}

fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, v, _)| *v)
}

/// `"true"`/`"false"` become booleans, numeric strings become numbers, the rest stays a string.
pub fn typed_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() && !raw.trim().is_empty() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}

pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub struct SiteConfigService {
    db: DatabaseConnection,
    cache: CacheService,
}

impl SiteConfigService {
    pub fn new(db: DatabaseConnection, cache: CacheService) -> Self {
        Self { db, cache }
    }

    /// Defaults merged with stored rows.
    pub async fn load_map(&self) -> AppResult<HashMap<String, String>> {
        if let Some(cached) = self.cache.get::<HashMap<String, String>>(CACHE_KEY).await {
            return Ok(cached);
        }

        let mut values: HashMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v, _)| (k.to_string(), v.to_string()))
            .collect();
        for row in SiteConfig::find().all(&self.db).await? {
            values.insert(row.key, row.value);
        }

        self.cache.set(CACHE_KEY, &values, CACHE_TTL_SECS).await;
        Ok(values)
    }

    pub async fn settings(&self) -> AppResult<SiteSettings> {
        Ok(SiteSettings::from_map(&self.load_map().await?))
    }

    pub async fn typed(&self) -> AppResult<Map<String, Value>> {
        let mut entries: Vec<(String, String)> = self.load_map().await?.into_iter().collect();
        entries.sort();
        Ok(entries
            .into_iter()
            .map(|(k, v)| {
                let typed = typed_value(&v);
                (k, typed)
            })
            .collect())
    }

    /// Upserts every entry, stringifying the values. Returns the number of keys written.
    pub async fn upsert(&self, values: &Map<String, Value>) -> AppResult<usize> {
        if values.is_empty() {
            return Err(AppError::Validation("No configuration values provided".to_string()));
        }
        if let Some(bad) = values.keys().find(|k| !is_valid_key(k)) {
            return Err(AppError::Validation(format!(
                "Invalid configuration key '{}'",
                bad
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;
        for (key, value) in values {
            let row = site_config::ActiveModel {
                key: Set(key.clone()),
                value: Set(stringify_value(value)),
                description: Set(DEFAULTS
                    .iter()
                    .find(|(k, _, _)| *k == key.as_str())
                    .map(|(_, _, d)| d.to_string())),
                updated_at: Set(now),
            };
            SiteConfig::insert(row)
                .on_conflict(
                    OnConflict::column(site_config::Column::Key)
                        .update_columns([site_config::Column::Value, site_config::Column::UpdatedAt])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        self.cache.invalidate(CACHE_KEY).await;
        tracing::info!(keys = values.len(), "Site configuration updated");
        Ok(values.len())
    }
}
