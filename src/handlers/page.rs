use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::PageModel;
use crate::policy::{authorize, Action};
use crate::response::ApiResponse;
use crate::services::page::{PageInput, PageService};
use crate::utils::render_markdown;
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 100))]
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub show_in_nav: bool,
    pub order: Option<i32>,
}

/// Every field is optional; only the ones present are changed.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub slug: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
    pub show_in_nav: Option<bool>,
    pub order: Option<i32>,
}

/// Listing entry without the body.
#[derive(Debug, Serialize, ToSchema)]
pub struct PageSummaryResponse {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub is_published: bool,
    pub show_in_nav: bool,
    pub sort_order: i32,
    pub updated_at: String,
}

impl From<PageModel> for PageSummaryResponse {
    fn from(p: PageModel) -> Self {
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            is_published: p.is_published,
            show_in_nav: p.show_in_nav,
            sort_order: p.sort_order,
            updated_at: p.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PageResponse {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub content_html: String,
    pub is_published: bool,
    pub show_in_nav: bool,
    pub sort_order: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PageModel> for PageResponse {
    fn from(p: PageModel) -> Self {
        let content_html = render_markdown(&p.content);
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            content: p.content,
            content_html,
            is_published: p.is_published,
            show_in_nav: p.show_in_nav,
            sort_order: p.sort_order,
            created_at: p.created_at.to_string(),
            updated_at: p.updated_at.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/pages/{slug}",
    params(("slug" = String, Path, description = "Page slug")),
    responses(
        (status = 200, description = "Published page with rendered HTML", body = PageResponse),
        (status = 404, description = "No published page with this slug", body = AppError),
    ),
    tag = "pages"
)]
pub async fn get_published_page(
    Extension(db): Extension<DatabaseConnection>,
    Path(slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    let page = PageService::new(db).get_published(&slug).await?;
    Ok(ApiResponse::ok(PageResponse::from(page)))
}

#[utoipa::path(
    get,
    path = "/api/admin/pages",
    responses(
        (status = 200, description = "All pages in navigation order", body = Vec<PageSummaryResponse>),
    ),
    tag = "pages"
)]
pub async fn list_pages(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    let pages = PageService::new(db).list().await?;
    let items: Vec<PageSummaryResponse> = pages.into_iter().map(PageSummaryResponse::from).collect();
    Ok(ApiResponse::ok(items))
}

#[utoipa::path(
    get,
    path = "/api/admin/pages/{id}",
    params(("id" = String, Path, description = "Page ID or slug")),
    responses(
        (status = 200, description = "Page", body = PageResponse),
        (status = 404, description = "Page not found", body = AppError),
    ),
    tag = "pages"
)]
pub async fn get_page(
    Extension(db): Extension<DatabaseConnection>,
    Path(id_or_slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    let page = PageService::new(db).get(&id_or_slug).await?;
    Ok(ApiResponse::ok(PageResponse::from(page)))
}

#[utoipa::path(
    post,
    path = "/api/admin/pages",
    security(("session" = [])),
    request_body = CreatePageRequest,
    responses(
        (status = 200, description = "Page created", body = PageResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 409, description = "Slug already in use", body = AppError),
    ),
    tag = "pages"
)]
pub async fn create_page(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePageRequest>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManagePages)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let page = PageService::new(db)
        .create(PageInput {
            title: Some(payload.title),
            slug: payload.slug,
            content: Some(payload.content),
            is_published: Some(payload.is_published),
            show_in_nav: Some(payload.show_in_nav),
            sort_order: payload.order,
        })
        .await?;

    Ok(ApiResponse::with_message(PageResponse::from(page), "Page created"))
}

#[utoipa::path(
    patch,
    path = "/api/admin/pages/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Page ID")),
    request_body = UpdatePageRequest,
    responses(
        (status = 200, description = "Page updated", body = PageResponse),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Page not found", body = AppError),
        (status = 409, description = "Slug already in use", body = AppError),
    ),
    tag = "pages"
)]
pub async fn update_page(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePageRequest>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManagePages)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let page = PageService::new(db)
        .update(
            id,
            PageInput {
                title: payload.title,
                slug: payload.slug,
                content: payload.content,
                is_published: payload.is_published,
                show_in_nav: payload.show_in_nav,
                sort_order: payload.order,
            },
        )
        .await?;

    Ok(ApiResponse::ok(PageResponse::from(page)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/pages/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Page ID")),
    responses(
        (status = 200, description = "Page deleted", body = String),
        (status = 403, description = "Admin only", body = AppError),
        (status = 404, description = "Page not found", body = AppError),
    ),
    tag = "pages"
)]
pub async fn delete_page(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    authorize(&auth_user.actor(), Action::ManagePages)?;
    PageService::new(db).delete(id).await?;
    Ok(ApiResponse::ok("Page deleted"))
}
