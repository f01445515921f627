use crate::error::AppResult;
use crate::handlers::resource::ResourceResponse;
use crate::middleware::AuthUser;
use crate::models::ResourceCategory;
use crate::response::ApiResponse;
use crate::services::resource::ResourceService;
use crate::services::user::{UserService, UserStats};
use axum::{response::IntoResponse, Extension};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadHistoryEntry {
    pub id: i64,
    pub resource_id: i32,
    /// `None` once the resource has been removed
    pub title: Option<String>,
    pub slug: Option<String>,
    pub category: Option<ResourceCategory>,
    pub thumbnail: Option<String>,
    pub downloaded_at: String,
}

#[utoipa::path(
    get,
    path = "/api/user/downloads",
    security(("session" = [])),
    responses(
        (status = 200, description = "The 50 most recent downloads", body = Vec<DownloadHistoryEntry>),
        (status = 401, description = "Unauthorized", body = crate::error::AppError),
    ),
    tag = "users"
)]
pub async fn list_downloads(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let rows = UserService::new(db)
        .recent_downloads(auth_user.user_id)
        .await?;

    let entries: Vec<DownloadHistoryEntry> = rows
        .into_iter()
        .map(|(download, resource)| DownloadHistoryEntry {
            id: download.id,
            resource_id: download.resource_id,
            title: resource.as_ref().map(|r| r.title.clone()),
            slug: resource.as_ref().map(|r| r.slug.clone()),
            category: resource.as_ref().map(|r| r.category),
            thumbnail: resource.and_then(|r| r.thumbnail),
            downloaded_at: download.downloaded_at.to_string(),
        })
        .collect();

    Ok(ApiResponse::ok(entries))
}

#[utoipa::path(
    get,
    path = "/api/user/stats",
    security(("session" = [])),
    responses(
        (status = 200, description = "Totals, referrals and today's quota", body = UserStats),
        (status = 401, description = "Unauthorized", body = crate::error::AppError),
    ),
    tag = "users"
)]
pub async fn get_stats(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let stats = UserService::new(db).stats(auth_user.user_id).await?;
    Ok(ApiResponse::ok(stats))
}

#[utoipa::path(
    get,
    path = "/api/user/uploads",
    security(("session" = [])),
    responses(
        (status = 200, description = "Own resources in every status", body = Vec<ResourceResponse>),
        (status = 401, description = "Unauthorized", body = crate::error::AppError),
    ),
    tag = "users"
)]
pub async fn list_uploads(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let resources = UserService::new(db.clone())
        .uploads(auth_user.user_id)
        .await?;
    let authors = ResourceService::new(db).authors_for(&resources).await?;

    Ok(ApiResponse::ok(ResourceResponse::with_authors(resources, &authors)))
}
