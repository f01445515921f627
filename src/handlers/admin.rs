use crate::error::{AppError, AppResult};
use crate::handlers::auth::UserResponse;
use crate::handlers::resource::ResourceResponse;
use crate::middleware::AuthUser;
use crate::models::{ResourceStatus, Role, UserStatus};
use crate::policy::{authorize, Action};
use crate::response::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::services::admin::{AdminService, AdminStats, UserFilter, UserUpdate};
use crate::services::cache::CacheService;
use crate::services::resource::{decode_list, ResourceService};
use crate::services::site_config::SiteConfigService;
use crate::services::upload::{UploadConfig, UploadService};
use axum::{extract::Path, extract::Query, response::IntoResponse, Extension, Json};
use sea_orm::{ActiveEnum, DatabaseConnection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const DEFAULT_USERS_PER_PAGE: u64 = 20;
const MAX_USERS_PER_PAGE: u64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserListQuery {
    /// Matches username, email or exact Discord id
    pub search: Option<String>,
    /// user | moderator | admin | all
    pub role: Option<String>,
    /// active | banned | all
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// `all` and blank mean no filter.
fn parse_filter<T: ActiveEnum<Value = String>>(raw: Option<&str>, what: &str) -> AppResult<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => T::try_from_value(&value.to_string())
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Unknown {} '{}'", what, value))),
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    #[serde(alias = "downloadLimit")]
    #[validate(range(min = 0, max = 100000))]
    pub download_limit: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResourceModerationQuery {
    /// pending | approved | rejected | all (default pending)
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerateResourceRequest {
    pub status: Option<ResourceStatus>,
    #[serde(alias = "is_featured")]
    pub is_featured: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigUpdateResponse {
    pub updated: usize,
    pub config: Map<String, Value>,
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    security(("session" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = AdminStats),
        (status = 403, description = "Staff only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn get_stats(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ViewDashboard)?;
    let stats = AdminService::new(db).get_stats().await?;
    Ok(ApiResponse::ok(stats))
}

#[utoipa::path(
    get,
    path = "/api/admin/config",
    security(("session" = [])),
    responses(
        (status = 200, description = "Typed site configuration", body = Object),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn get_config(
    Extension(db): Extension<DatabaseConnection>,
    Extension(cache): Extension<CacheService>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManageSiteConfig)?;
    let config = SiteConfigService::new(db, cache).typed().await?;
    Ok(ApiResponse::ok(config))
}

#[utoipa::path(
    post,
    path = "/api/admin/config",
    security(("session" = [])),
    request_body = Object,
    responses(
        (status = 200, description = "Configuration saved", body = ConfigUpdateResponse),
        (status = 400, description = "Body is not an object or has an invalid key", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_config(
    Extension(db): Extension<DatabaseConnection>,
    Extension(cache): Extension<CacheService>,
    auth_user: AuthUser,
    Json(payload): Json<Value>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManageSiteConfig)?;
    let values = payload
        .as_object()
        .ok_or_else(|| AppError::Validation("Expected a JSON object".to_string()))?;

    let service = SiteConfigService::new(db, cache);
    let updated = service.upsert(values).await?;
    let config = service.typed().await?;

    Ok(ApiResponse::with_message(
        ConfigUpdateResponse { updated, config },
        "Configuration saved",
    ))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    security(("session" = [])),
    params(UserListQuery),
    responses(
        (status = 200, description = "Users", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Admin only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_users(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Query(query): Query<UserListQuery>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManageUsers)?;

    let filter = UserFilter {
        search: query.search.clone(),
        role: parse_filter::<Role>(query.role.as_deref(), "role")?,
        status: parse_filter::<UserStatus>(query.status.as_deref(), "status")?,
    };
    let (page, per_page) = PaginationQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_USERS_PER_PAGE, MAX_USERS_PER_PAGE);

    let (users, total) = AdminService::new(db)
        .list_users(&filter, page, per_page)
        .await?;
    let items: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 400, description = "Nothing to update", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn update_user(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let actor = auth_user.actor();
    authorize(&actor, Action::ManageUsers)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = AdminService::new(db)
        .update_user(
            &actor,
            id,
            UserUpdate {
                role: payload.role,
                status: payload.status,
                download_limit: payload.download_limit,
            },
        )
        .await?;

    Ok(ApiResponse::with_message(UserResponse::from(user), "User updated"))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = String),
        (status = 400, description = "Cannot delete yourself", body = AppError),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "User not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn delete_user(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let actor = auth_user.actor();
    authorize(&actor, Action::ManageUsers)?;

    let uploads = AdminService::new(db).delete_user(&actor, id).await?;
    for resource in uploads {
        let mut media = decode_list(&resource.images);
        media.extend(resource.thumbnail);
        UploadService::remove_resource_files(&config, &resource.file_path, &media).await;
    }

    Ok(ApiResponse::ok("User deleted"))
}

#[utoipa::path(
    get,
    path = "/api/admin/resources",
    security(("session" = [])),
    params(ResourceModerationQuery),
    responses(
        (status = 200, description = "Resources awaiting or past moderation", body = PaginatedResponse<ResourceResponse>),
        (status = 403, description = "Staff only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn list_resources(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Query(query): Query<ResourceModerationQuery>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ModerateResources)?;

    let status = match query.status.as_deref() {
        None => Some(ResourceStatus::Pending),
        other => parse_filter::<ResourceStatus>(other, "status")?,
    };
    let (page, per_page) = PaginationQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_USERS_PER_PAGE, MAX_USERS_PER_PAGE);

    let service = ResourceService::new(db);
    let (resources, total) = service.admin_list(status, page, per_page).await?;
    let authors = service.authors_for(&resources).await?;
    let items = ResourceResponse::with_authors(resources, &authors);

    Ok(ApiResponse::ok(PaginatedResponse::new(items, total, page, per_page)))
}

#[utoipa::path(
    patch,
    path = "/api/admin/resources/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Resource ID")),
    request_body = ModerateResourceRequest,
    responses(
        (status = 200, description = "Resource moderated", body = ResourceResponse),
        (status = 400, description = "Nothing to update", body = AppError),
        (status = 403, description = "Staff only", body = AppError),
        (status = 404, description = "Resource not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn moderate_resource(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ModerateResourceRequest>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ModerateResources)?;

    let resource = ResourceService::new(db)
        .moderate(id, payload.status, payload.is_featured)
        .await?;

    Ok(ApiResponse::ok(ResourceResponse::build(resource, None)))
}
