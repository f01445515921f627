use crate::config::rate_limit::{RateLimitConfig, RateLimitRule, RouteGroup};
use crate::handlers;
use crate::middleware::auth::auth_middleware;
use axum::{extract::DefaultBodyLimit, middleware, routing, Router};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Upper bound for a multipart upload (archive plus screenshots).
pub const MAX_UPLOAD_BODY_BYTES: usize = 512 * 1024 * 1024;

pub fn create_routes(rate_limit_config: &RateLimitConfig) -> Router {
    Router::new().nest("/api", api_routes(rate_limit_config))
}

fn api_routes(rate_limit_config: &RateLimitConfig) -> Router {
    let auth = auth_routes(rate_limit_config);
    let public_read = public_read_routes(rate_limit_config);
    let protected =
        protected_routes(rate_limit_config).layer(middleware::from_fn(auth_middleware));

    auth.merge(public_read).merge(protected)
}

/// Discord OAuth round trip and logout.
fn auth_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        .route("/auth/discord", routing::get(handlers::discord_login))
        .route(
            "/auth/discord/callback",
            routing::get(handlers::discord_callback),
        )
        .route("/auth/logout", routing::get(handlers::logout));

    with_optional_rate_limit(router, config.enabled, config.rule(RouteGroup::Auth))
}

/// Public read routes: catalogue, reviews, comments, leaderboard, pages.
fn public_read_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Resources
        .route(
            "/resources",
            routing::get(handlers::resource::list_resources),
        )
        .route(
            "/resources/{id}",
            routing::get(handlers::resource::get_resource),
        )
        .route(
            "/resources/{id}/ratings",
            routing::get(handlers::rating::list_ratings),
        )
        .route(
            "/resources/{id}/comments",
            routing::get(handlers::comment::list_comments),
        )
        // Leaderboard
        .route(
            "/leaderboard",
            routing::get(handlers::leaderboard::get_leaderboard),
        )
        // Pages
        .route(
            "/pages/{slug}",
            routing::get(handlers::page::get_published_page),
        )
        .route("/admin/pages", routing::get(handlers::page::list_pages))
        .route("/admin/pages/{id}", routing::get(handlers::page::get_page));

    with_optional_rate_limit(router, config.enabled, config.rule(RouteGroup::Public))
}

/// Protected routes: everything that needs a session.
fn protected_routes(config: &RateLimitConfig) -> Router {
    let router = Router::new()
        // Auth
        .route("/auth/me", routing::get(handlers::get_current_user))
        // Resources
        .route(
            "/resources",
            routing::post(handlers::resource::upload_resource)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route(
            "/resources/{id}",
            routing::delete(handlers::resource::delete_resource),
        )
        .route(
            "/resources/{id}/download",
            routing::get(handlers::resource::download_resource),
        )
        .route(
            "/resources/{id}/ratings",
            routing::post(handlers::rating::rate_resource),
        )
        .route(
            "/resources/{id}/comments",
            routing::post(handlers::comment::create_comment)
                .delete(handlers::comment::delete_comment),
        )
        // Favorites
        .route(
            "/favorites",
            routing::get(handlers::favorite::list_favorites)
                .post(handlers::favorite::toggle_favorite),
        )
        // Tickets
        .route(
            "/tickets",
            routing::get(handlers::ticket::list_tickets).post(handlers::ticket::create_ticket),
        )
        .route(
            "/tickets/{id}",
            routing::get(handlers::ticket::get_ticket).patch(handlers::ticket::update_ticket),
        )
        // Dashboard
        .route(
            "/user/downloads",
            routing::get(handlers::user::list_downloads),
        )
        .route("/user/stats", routing::get(handlers::user::get_stats))
        .route("/user/uploads", routing::get(handlers::user::list_uploads))
        // Admin
        .route("/admin/stats", routing::get(handlers::admin::get_stats))
        .route(
            "/admin/config",
            routing::get(handlers::admin::get_config).post(handlers::admin::update_config),
        )
        .route("/admin/users", routing::get(handlers::admin::list_users))
        .route(
            "/admin/users/{id}",
            routing::patch(handlers::admin::update_user).delete(handlers::admin::delete_user),
        )
        .route(
            "/admin/resources",
            routing::get(handlers::admin::list_resources),
        )
        .route(
            "/admin/resources/{id}",
            routing::patch(handlers::admin::moderate_resource),
        )
        .route("/admin/pages", routing::post(handlers::page::create_page))
        .route(
            "/admin/pages/{id}",
            routing::patch(handlers::page::update_page).delete(handlers::page::delete_page),
        );

    with_optional_rate_limit(router, config.enabled, config.rule(RouteGroup::Protected))
}

fn with_optional_rate_limit(router: Router, enabled: bool, rule: RateLimitRule) -> Router {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
    {
        Some(governor_conf) => router.layer(GovernorLayer::new(governor_conf)),
        None => {
            tracing::warn!(?rule, "Invalid rate limit rule, serving without rate limiting");
            router
        }
    }
}
