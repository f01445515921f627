use crate::config::session::{SessionConfig, OAUTH_STATE_TTL_SECONDS};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{Role, UserModel, UserStatus};
use crate::response::ApiResponse;
use crate::services::bootstrap_admin::BootstrapAdminConfig;
use crate::services::cache::CacheService;
use crate::services::discord::{DiscordClient, DiscordProfile};
use crate::services::quota::{QuotaDecision, QuotaState};
use crate::services::session::SessionService;
use crate::services::site_config::SiteConfigService;
use crate::services::user::{NewUser, UserService};
use crate::services::webhook::WebhookNotifier;
use crate::utils::cookie::{
    build_auth_cookie, build_clear_cookie, extract_cookie, extract_session_token,
    OAUTH_STATE_COOKIE, SESSION_COOKIE,
};
use crate::utils::oauth_state::{encode_state, verify_state};
use crate::utils::token::generate_nonce;
use anyhow::anyhow;
use axum::{
    extract::Query,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub discord_id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub download_limit: i32,
    pub referral_code: String,
    pub referral_bonus: i32,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<UserModel> for UserResponse {
    fn from(user: UserModel) -> Self {
        Self {
            id: user.id,
            discord_id: user.discord_id,
            username: user.username,
            email: user.email,
            avatar: user.avatar,
            role: user.role,
            status: user.status,
            download_limit: user.download_limit,
            referral_code: user.referral_code,
            referral_bonus: user.referral_bonus,
            last_login: user.last_login.map(|t| t.to_string()),
            created_at: user.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: UserResponse,
    pub quota: QuotaDecision,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiscordLoginQuery {
    /// Referral code of the inviting user
    #[serde(rename = "ref")]
    pub referral: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiscordCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/auth/discord",
    params(DiscordLoginQuery),
    responses(
        (status = 303, description = "Redirect to the Discord consent screen"),
    ),
    tag = "auth"
)]
pub async fn discord_login(
    Extension(discord): Extension<DiscordClient>,
    Extension(session_config): Extension<SessionConfig>,
    Query(query): Query<DiscordLoginQuery>,
) -> AppResult<impl IntoResponse> {
    let nonce = generate_nonce()?;
    let state = encode_state(
        &session_config.secret,
        &nonce,
        query.referral.as_deref(),
        OAUTH_STATE_TTL_SECONDS,
    )?;
    let url = discord.authorize_url(&state)?;

    let mut response = Redirect::to(&url).into_response();
    append_set_cookie(
        &mut response,
        &build_auth_cookie(OAUTH_STATE_COOKIE, &nonce, OAUTH_STATE_TTL_SECONDS),
    )?;
    Ok(response)
}

/// How a callback that did not produce a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    Denied,
    NoCode,
    Failed,
    RegistrationClosed,
    Banned,
}

impl LoginFailure {
    fn code(self) -> &'static str {
        match self {
            LoginFailure::Denied => "auth_denied",
            LoginFailure::NoCode => "no_code",
            LoginFailure::Failed => "auth_failed",
            LoginFailure::RegistrationClosed => "registration_disabled",
            LoginFailure::Banned => "banned",
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/discord/callback",
    params(DiscordCallbackQuery),
    responses(
        (status = 303, description = "Redirect to /dashboard with a session cookie, or to /?error=..."),
    ),
    tag = "auth"
)]
#[allow(clippy::too_many_arguments)]
pub async fn discord_callback(
    Extension(db): Extension<DatabaseConnection>,
    Extension(cache): Extension<CacheService>,
    Extension(discord): Extension<DiscordClient>,
    Extension(session_config): Extension<SessionConfig>,
    Extension(webhook): Extension<WebhookNotifier>,
    Extension(bootstrap): Extension<BootstrapAdminConfig>,
    headers: HeaderMap,
    Query(query): Query<DiscordCallbackQuery>,
) -> AppResult<impl IntoResponse> {
    let site_url = discord.config().site_url.clone();

    let outcome = if query.error.is_some() {
        Err(LoginFailure::Denied)
    } else {
        match query.code.as_deref().filter(|c| !c.is_empty()) {
            None => Err(LoginFailure::NoCode),
            Some(code) => {
                let login = CallbackLogin {
                    db: &db,
                    cache: &cache,
                    discord: &discord,
                    session_config: &session_config,
                    webhook: &webhook,
                    bootstrap: &bootstrap,
                };
                login
                    .complete(code, query.state.as_deref(), &headers)
                    .await
            }
        }
    };

    let mut response = match &outcome {
        Ok(_) => Redirect::to(&format!("{}/dashboard", site_url)).into_response(),
        Err(failure) => {
            Redirect::to(&format!("{}/?error={}", site_url, failure.code())).into_response()
        }
    };

    append_set_cookie(&mut response, &build_clear_cookie(OAUTH_STATE_COOKIE))?;
    if let Ok(token) = outcome {
        append_set_cookie(
            &mut response,
            &build_auth_cookie(SESSION_COOKIE, &token, session_config.ttl_seconds),
        )?;
    }
    Ok(response)
}

struct CallbackLogin<'a> {
    db: &'a DatabaseConnection,
    cache: &'a CacheService,
    discord: &'a DiscordClient,
    session_config: &'a SessionConfig,
    webhook: &'a WebhookNotifier,
    bootstrap: &'a BootstrapAdminConfig,
}

impl CallbackLogin<'_> {
    /// Verifies the state, signs the user in (creating the account on first
    /// login) and returns a fresh session token.
    async fn complete(
        &self,
        code: &str,
        state: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<String, LoginFailure> {
        let nonce = extract_cookie(headers, OAUTH_STATE_COOKIE).ok_or_else(|| {
            tracing::warn!("OAuth callback without state cookie");
            LoginFailure::Failed
        })?;
        let claims = verify_state(&self.session_config.secret, state.unwrap_or_default(), &nonce)
            .map_err(|e| {
                tracing::warn!("OAuth state rejected: {}", e);
                LoginFailure::Failed
            })?;

        let profile = self.fetch_profile(code).await.map_err(|e| {
            tracing::warn!("Discord login failed: {:#}", e);
            LoginFailure::Failed
        })?;

        self.sign_in(profile, claims.referral.as_deref())
            .await
            .map_err(|e| match e {
                AppError::Forbidden => LoginFailure::Banned,
                AppError::Validation(_) => LoginFailure::RegistrationClosed,
                other => {
                    tracing::error!("Login could not be completed: {}", other);
                    LoginFailure::Failed
                }
            })
    }

    async fn fetch_profile(&self, code: &str) -> anyhow::Result<DiscordProfile> {
        let access_token = self.discord.exchange_code(code).await?;
        self.discord.fetch_profile(&access_token).await
    }

    async fn sign_in(
        &self,
        profile: DiscordProfile,
        referral: Option<&str>,
    ) -> AppResult<String> {
        let users = UserService::new(self.db.clone());
        let is_bootstrap_admin = self.bootstrap.contains(&profile.id);
        let avatar = profile.avatar_url(&self.discord.config().cdn_base);

        let user = match users.find_by_discord_id(&profile.id).await? {
            Some(existing) => {
                if existing.status == UserStatus::Banned {
                    return Err(AppError::Forbidden);
                }
                users
                    .record_login(
                        existing,
                        profile.display_name(),
                        profile.email.clone(),
                        avatar,
                        is_bootstrap_admin,
                    )
                    .await?
            }
            None => {
                let settings = SiteConfigService::new(self.db.clone(), self.cache.clone())
                    .settings()
                    .await?;
                if !settings.registration_enabled && !is_bootstrap_admin {
                    return Err(AppError::Validation("Registration is closed".to_string()));
                }

                let role = if is_bootstrap_admin {
                    Role::Admin
                } else {
                    Role::User
                };
                let created = users
                    .create(
                        NewUser {
                            discord_id: profile.id.clone(),
                            username: profile.display_name(),
                            email: profile.email.clone(),
                            avatar,
                            role,
                        },
                        referral,
                        &settings,
                    )
                    .await?;
                self.webhook.user_registered(&settings, &created.username);
                created
            }
        };

        let token = SessionService::new(self.db.clone())
            .create(user.id, self.session_config.ttl_seconds)
            .await?;
        tracing::info!(user_id = user.id, "User signed in");
        Ok(token)
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/logout",
    responses(
        (status = 303, description = "Session revoked, redirect to /"),
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(db): Extension<DatabaseConnection>,
    Extension(discord): Extension<DiscordClient>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    if let Some(token) = extract_session_token(&headers) {
        SessionService::new(db).revoke(&token).await?;
    }

    let mut response = Redirect::to(&format!("{}/", discord.config().site_url)).into_response();
    append_set_cookie(&mut response, &build_clear_cookie(SESSION_COOKIE))?;
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    security(("session" = [])),
    responses(
        (status = 200, description = "Current user and today's quota", body = MeResponse),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "auth"
)]
pub async fn get_current_user(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let user = UserService::new(db).get_by_id(auth_user.user_id).await?;
    let quota = QuotaState::from_user(&user).evaluate(chrono::Utc::now().date_naive());

    Ok(ApiResponse::ok(MeResponse {
        user: UserResponse::from(user),
        quota,
    }))
}

fn append_set_cookie(response: &mut Response, cookie_value: &str) -> AppResult<()> {
    let value = HeaderValue::from_str(cookie_value).map_err(|e| {
        AppError::Internal(anyhow!("Failed to build Set-Cookie header value: {}", e))
    })?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
