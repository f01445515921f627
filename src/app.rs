use crate::config::rate_limit::RateLimitConfig;
use crate::config::session::SessionConfig;
use crate::middleware::security::security_headers_middleware;
use crate::routes;
use crate::services::bootstrap_admin::BootstrapAdminConfig;
use crate::services::cache::CacheService;
use crate::services::discord::DiscordClient;
use crate::services::upload::UploadConfig;
use crate::services::webhook::WebhookNotifier;
use axum::{extract::Extension, response::IntoResponse, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde_json::json;
use std::env;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        // Auth
        crate::handlers::auth::discord_login,
        crate::handlers::auth::discord_callback,
        crate::handlers::auth::logout,
        crate::handlers::auth::get_current_user,
        // Resources
        crate::handlers::resource::list_resources,
        crate::handlers::resource::get_resource,
        crate::handlers::resource::upload_resource,
        crate::handlers::resource::delete_resource,
        crate::handlers::resource::download_resource,
        // Ratings
        crate::handlers::rating::list_ratings,
        crate::handlers::rating::rate_resource,
        // Comments
        crate::handlers::comment::list_comments,
        crate::handlers::comment::create_comment,
        crate::handlers::comment::delete_comment,
        // Favorites
        crate::handlers::favorite::toggle_favorite,
        crate::handlers::favorite::list_favorites,
        // Tickets
        crate::handlers::ticket::list_tickets,
        crate::handlers::ticket::create_ticket,
        crate::handlers::ticket::get_ticket,
        crate::handlers::ticket::update_ticket,
        // Dashboard
        crate::handlers::user::list_downloads,
        crate::handlers::user::get_stats,
        crate::handlers::user::list_uploads,
        crate::handlers::leaderboard::get_leaderboard,
        // Pages
        crate::handlers::page::get_published_page,
        crate::handlers::page::list_pages,
        crate::handlers::page::get_page,
        crate::handlers::page::create_page,
        crate::handlers::page::update_page,
        crate::handlers::page::delete_page,
        // Admin
        crate::handlers::admin::get_stats,
        crate::handlers::admin::get_config,
        crate::handlers::admin::update_config,
        crate::handlers::admin::list_users,
        crate::handlers::admin::update_user,
        crate::handlers::admin::delete_user,
        crate::handlers::admin::list_resources,
        crate::handlers::admin::moderate_resource,
    ),
    components(
        schemas(
            crate::response::ApiResponse<serde_json::Value>,
            crate::response::PaginatedResponse<serde_json::Value>,
            crate::response::PaginationQuery,
            crate::error::AppError,
            crate::models::Role,
            crate::models::UserStatus,
            crate::models::ResourceCategory,
            crate::models::ResourceStatus,
            crate::models::TicketStatus,
            crate::models::TicketPriority,
            crate::models::TicketCategory,
            // Auth
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::MeResponse,
            crate::services::quota::QuotaDecision,
            // Resources
            crate::handlers::resource::AuthorSummary,
            crate::handlers::resource::ResourceResponse,
            crate::handlers::resource::ResourceDetailResponse,
            crate::handlers::resource::UploadResponse,
            // Ratings
            crate::handlers::rating::RateRequest,
            crate::handlers::rating::RatingResponse,
            crate::handlers::rating::RatingListResponse,
            crate::handlers::rating::RateResponse,
            // Comments
            crate::handlers::comment::CommentTreeNode,
            crate::handlers::comment::CreateCommentRequest,
            // Favorites
            crate::handlers::favorite::ToggleFavoriteRequest,
            crate::handlers::favorite::FavoriteToggleResponse,
            // Tickets
            crate::handlers::ticket::CreateTicketRequest,
            crate::handlers::ticket::UpdateTicketRequest,
            crate::handlers::ticket::TicketResponse,
            crate::handlers::ticket::TicketMessageResponse,
            crate::handlers::ticket::TicketDetailResponse,
            // Dashboard
            crate::handlers::user::DownloadHistoryEntry,
            crate::services::user::UserStats,
            crate::services::leaderboard::Leaderboard,
            crate::services::leaderboard::LeaderboardEntry,
            // Pages
            crate::handlers::page::CreatePageRequest,
            crate::handlers::page::UpdatePageRequest,
            crate::handlers::page::PageSummaryResponse,
            crate::handlers::page::PageResponse,
            // Admin
            crate::services::admin::AdminStats,
            crate::handlers::admin::UpdateUserRequest,
            crate::handlers::admin::ModerateResourceRequest,
            crate::handlers::admin::ConfigUpdateResponse,
        )
    ),
    modifiers(&SessionSecurity),
    tags(
        (name = "auth", description = "Discord sign-in and sessions"),
        (name = "resources", description = "Resource catalogue, uploads and downloads"),
        (name = "ratings", description = "Resource reviews"),
        (name = "comments", description = "Threaded resource comments"),
        (name = "favorites", description = "Saved resources"),
        (name = "tickets", description = "Support tickets"),
        (name = "users", description = "Personal dashboard"),
        (name = "leaderboard", description = "Top uploaders and referrers"),
        (name = "pages", description = "Static content pages"),
        (name = "admin", description = "Administrative operations"),
    )
)]
pub struct ApiDoc;

struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session"))),
            );
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Everything the handlers pull out of request extensions.
#[derive(Clone)]
pub struct AppContext {
    pub db: DatabaseConnection,
    pub cache: CacheService,
    pub upload: UploadConfig,
    pub discord: DiscordClient,
    pub session: SessionConfig,
    pub webhook: WebhookNotifier,
    pub bootstrap: BootstrapAdminConfig,
    pub rate_limit: RateLimitConfig,
}

pub fn create_app(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .merge(routes::create_routes(&ctx.rate_limit))
        .nest_service("/uploads", ServeDir::new(&ctx.upload.upload_dir))
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .layer(Extension(ctx.db))
        .layer(Extension(ctx.cache))
        .layer(Extension(ctx.upload))
        .layer(Extension(ctx.discord))
        .layer(Extension(ctx.session))
        .layer(Extension(ctx.webhook))
        .layer(Extension(ctx.bootstrap))
}

fn build_cors_layer() -> CorsLayer {
    use axum::http::{header, HeaderName, HeaderValue, Method};

    let origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-downloads-remaining"),
        ]);

    if origins_str == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        // Session cookies only travel cross-origin to an explicit allow-list.
        let origins: Vec<HeaderValue> = origins_str
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(origins).allow_credentials(true)
    }
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Health check successful", body = serde_json::Value)
    )
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let db_ok = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    let status = if db_ok { "ok" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "FiveHub API",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}
