use crate::error::AppResult;
use crate::handlers::resource::ResourceResponse;
use crate::middleware::AuthUser;
use crate::response::ApiResponse;
use crate::services::favorite::{FavoriteAction, FavoriteService};
use crate::services::resource::ResourceService;
use axum::{response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFavoriteRequest {
    #[serde(alias = "resource_id")]
    pub resource_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FavoriteToggleResponse {
    pub action: FavoriteAction,
    pub favorited: bool,
}

#[utoipa::path(
    post,
    path = "/api/favorites",
    security(("session" = [])),
    request_body = ToggleFavoriteRequest,
    responses(
        (status = 200, description = "Favorite toggled", body = FavoriteToggleResponse),
        (status = 401, description = "Unauthorized", body = crate::error::AppError),
        (status = 404, description = "Resource not found", body = crate::error::AppError),
    ),
    tag = "favorites"
)]
pub async fn toggle_favorite(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<ToggleFavoriteRequest>,
) -> AppResult<impl IntoResponse> {
    let action = FavoriteService::new(db)
        .toggle(auth_user.user_id, payload.resource_id)
        .await?;

    Ok(ApiResponse::ok(FavoriteToggleResponse {
        action,
        favorited: action == FavoriteAction::Added,
    }))
}

#[utoipa::path(
    get,
    path = "/api/favorites",
    security(("session" = [])),
    responses(
        (status = 200, description = "Favorite resources", body = Vec<ResourceResponse>),
        (status = 401, description = "Unauthorized", body = crate::error::AppError),
    ),
    tag = "favorites"
)]
pub async fn list_favorites(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let resources = FavoriteService::new(db.clone())
        .list(auth_user.user_id)
        .await?;
    let authors = ResourceService::new(db).authors_for(&resources).await?;

    Ok(ApiResponse::ok(ResourceResponse::with_authors(resources, &authors)))
}
