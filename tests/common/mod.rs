#![allow(dead_code)]

use axum::{
    extract::Form,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use fivehub::app::{create_app, AppContext};
use fivehub::config::discord::DiscordConfig;
use fivehub::config::rate_limit::RateLimitConfig;
use fivehub::config::session::SessionConfig;
use fivehub::models::{resource, ResourceCategory, ResourceStatus, Role};
use fivehub::services::bootstrap_admin::BootstrapAdminConfig;
use fivehub::services::cache::CacheService;
use fivehub::services::discord::DiscordClient;
use fivehub::services::resource::{NewResource, ResourceService};
use fivehub::services::session::SessionService;
use fivehub::services::site_config::SiteSettings;
use fivehub::services::upload::UploadConfig;
use fivehub::services::user::{NewUser, UserService};
use fivehub::services::webhook::WebhookNotifier;
use reqwest::{redirect, Client};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TEST_SESSION_SECRET: &str = "integration_test_session_secret_at_least_32_chars";
pub const SESSION_TTL_SECONDS: u64 = 3600;

static APP_COUNTER: AtomicUsize = AtomicUsize::new(0);
static USER_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct TestApp {
    pub addr: String,
    pub db: DatabaseConnection,
    /// Does not follow redirects so OAuth hops can be inspected.
    pub client: Client,
    pub upload: UploadConfig,
    pub site_url: String,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.addr, path)
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(BootstrapAdminConfig::default()).await
}

pub async fn spawn_app_with(bootstrap: BootstrapAdminConfig) -> TestApp {
    // One pooled connection keeps the in-memory database alive and shared.
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("Failed to open in-memory database");
    fivehub::migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let n = APP_COUNTER.fetch_add(1, Ordering::SeqCst);
    let root: PathBuf = std::env::temp_dir().join(format!(
        "fivehub-test-{}-{}",
        std::process::id(),
        n
    ));
    let upload = UploadConfig {
        upload_dir: root.join("uploads").display().to_string(),
        archive_dir: root.join("archives").display().to_string(),
    };
    std::fs::create_dir_all(&upload.upload_dir).unwrap();
    std::fs::create_dir_all(&upload.archive_dir).unwrap();

    let discord_base = spawn_mock_discord().await;
    let site_url = "http://fivehub.test".to_string();
    let discord = DiscordClient::new(DiscordConfig {
        client_id: "test-client".into(),
        client_secret: "test-secret".into(),
        site_url: site_url.clone(),
        api_base: discord_base,
        cdn_base: "https://cdn.discordapp.com".into(),
    })
    .unwrap();

    let app = create_app(AppContext {
        db: db.clone(),
        cache: CacheService::disabled(),
        upload: upload.clone(),
        discord,
        session: SessionConfig {
            secret: TEST_SESSION_SECRET.to_string(),
            ttl_seconds: SESSION_TTL_SECONDS,
        },
        webhook: WebhookNotifier::new().unwrap(),
        bootstrap,
        rate_limit: RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        },
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr: format!("http://{}", addr),
        db,
        client,
        upload,
        site_url,
    }
}

/// Minimal stand-in for the Discord API.
///
/// The authorization code doubles as the access token, and a token of the
/// form `id:username` describes the profile returned by `/users/@me`.
/// The code `bad` is rejected by the token endpoint.
async fn spawn_mock_discord() -> String {
    async fn token(
        Form(form): Form<HashMap<String, String>>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        let code = form.get("code").cloned().unwrap_or_default();
        if code == "bad" || form.get("grant_type").map(String::as_str) != Some("authorization_code")
        {
            return Err(StatusCode::BAD_REQUEST);
        }
        Ok(Json(json!({ "access_token": code, "token_type": "Bearer" })))
    }

    async fn me(headers: HeaderMap) -> Result<Json<serde_json::Value>, StatusCode> {
        let token = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let (id, username) = token.split_once(':').ok_or(StatusCode::UNAUTHORIZED)?;
        Ok(Json(json!({
            "id": id,
            "username": username,
            "global_name": null,
            "email": format!("{}@discord.test", username),
            "avatar": "abc123",
        })))
    }

    let router = Router::new()
        .route("/oauth2/token", post(token))
        .route("/users/@me", get(me));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock Discord port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Create a user directly and return (user_id, session token).
pub async fn create_test_user(app: &TestApp, username_prefix: &str) -> (i32, String) {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let username = format!("{}_{}", username_prefix, counter);

    let user = UserService::new(app.db.clone())
        .create(
            NewUser {
                discord_id: format!("9000{}", counter),
                username: username.clone(),
                email: Some(format!("{}@test.com", username)),
                avatar: None,
                role: Role::User,
            },
            None,
            &SiteSettings::default(),
        )
        .await
        .expect("Failed to create user");

    let token = SessionService::new(app.db.clone())
        .create(user.id, SESSION_TTL_SECONDS)
        .await
        .expect("Failed to create session");
    (user.id, token)
}

pub async fn make_role(db: &DatabaseConnection, user_id: i32, role: Role) {
    fivehub::models::User::update_many()
        .col_expr(fivehub::models::user::Column::Role, Expr::value(role))
        .filter(fivehub::models::user::Column::Id.eq(user_id))
        .exec(db)
        .await
        .expect("Failed to change role");
}

pub async fn make_admin(db: &DatabaseConnection, user_id: i32) {
    make_role(db, user_id, Role::Admin).await;
}

pub async fn set_download_limit(db: &DatabaseConnection, user_id: i32, limit: i32) {
    fivehub::models::User::update_many()
        .col_expr(fivehub::models::user::Column::DownloadLimit, Expr::value(limit))
        .filter(fivehub::models::user::Column::Id.eq(user_id))
        .exec(db)
        .await
        .expect("Failed to change download limit");
}

/// Insert an approved resource with an archive on disk. Returns (id, slug).
pub async fn create_approved_resource(app: &TestApp, author_id: i32, title: &str) -> (i32, String) {
    let counter = USER_COUNTER.fetch_add(1, Ordering::SeqCst);
    let slug = format!("{}-{}", fivehub::utils::slugify(title), counter);
    let file_name = format!("{}.zip", slug);
    let archive = b"PK\x03\x04fivehub-test-archive".to_vec();
    std::fs::write(
        PathBuf::from(&app.upload.archive_dir).join(&file_name),
        &archive,
    )
    .unwrap();

    let settings = SiteSettings {
        auto_approve_resources: true,
        ..SiteSettings::default()
    };
    let created = ResourceService::new(app.db.clone())
        .create(
            author_id,
            NewResource {
                slug: slug.clone(),
                title: title.to_string(),
                description: format!("{} description", title),
                long_description: "# Install\n\nDrop it in `resources/`.".to_string(),
                category: ResourceCategory::Script,
                version: "1.0.0".to_string(),
                tags: vec!["esx".to_string()],
                file_name,
                file_size: archive.len() as i64,
                thumbnail: None,
                images: Vec::new(),
            },
            &settings,
        )
        .await
        .expect("Failed to create resource");
    assert_eq!(created.status, ResourceStatus::Approved);
    (created.id, slug)
}

pub async fn set_resource_status(db: &DatabaseConnection, resource_id: i32, status: ResourceStatus) {
    fivehub::models::Resource::update_many()
        .col_expr(resource::Column::Status, Expr::value(status))
        .filter(resource::Column::Id.eq(resource_id))
        .exec(db)
        .await
        .expect("Failed to change resource status");
}

/// Value of a cookie set by `resp`, skipping cookies that are being cleared.
pub fn set_cookie_value(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

pub fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Starts the OAuth flow and returns (state, nonce cookie).
pub async fn begin_login(app: &TestApp, referral: Option<&str>) -> (String, String) {
    let mut req = app.client.get(app.url("/auth/discord"));
    if let Some(code) = referral {
        req = req.query(&[("ref", code)]);
    }
    let resp = req.send().await.unwrap();
    assert_eq!(resp.status(), 303);

    let authorize = reqwest::Url::parse(&location(&resp)).unwrap();
    let state = authorize
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("authorize URL without state");
    let nonce = set_cookie_value(&resp, "oauth_state").expect("no oauth_state cookie");
    (state, nonce)
}

/// Full Discord round trip against the mock provider. Returns the callback response.
pub async fn discord_login(
    app: &TestApp,
    discord_id: &str,
    username: &str,
    referral: Option<&str>,
) -> reqwest::Response {
    let (state, nonce) = begin_login(app, referral).await;
    let code = format!("{}:{}", discord_id, username);
    app.client
        .get(app.url("/auth/discord/callback"))
        .query(&[("code", code.as_str()), ("state", state.as_str())])
        .header(reqwest::header::COOKIE, format!("oauth_state={}", nonce))
        .send()
        .await
        .unwrap()
}

/// Logs in through Discord and returns the session token.
pub async fn login_token(app: &TestApp, discord_id: &str, username: &str) -> String {
    let resp = discord_login(app, discord_id, username, None).await;
    assert_eq!(location(&resp), format!("{}/dashboard", app.site_url));
    set_cookie_value(&resp, "session").expect("no session cookie")
}
