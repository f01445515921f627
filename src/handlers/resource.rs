use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{ResourceCategory, ResourceModel, ResourceStatus, Role, UserModel};
use crate::response::{ApiResponse, PaginatedResponse};
use crate::services::cache::CacheService;
use crate::services::quota::QuotaService;
use crate::services::resource::{
    decode_list, parse_categories, NewResource, ResourceQuery, ResourceService, ResourceSort,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::services::site_config::SiteConfigService;
use crate::services::upload::{UploadConfig, UploadService};
use crate::services::user::UserService;
use crate::services::webhook::WebhookNotifier;
use crate::utils::{render_markdown, resource_slug};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use sea_orm::{ActiveEnum, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

const MAX_GALLERY_IMAGES: usize = 5;
const MAX_TITLE_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorSummary {
    pub id: i32,
    pub username: String,
    pub avatar: Option<String>,
    pub role: Role,
}

impl From<&UserModel> for AuthorSummary {
    fn from(user: &UserModel) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceResponse {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub category: ResourceCategory,
    pub version: String,
    pub file_size: i64,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub status: ResourceStatus,
    pub is_featured: bool,
    pub download_count: i32,
    pub view_count: i32,
    pub average_rating: f64,
    pub rating_count: i32,
    pub author: Option<AuthorSummary>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ResourceResponse {
    pub fn build(resource: ResourceModel, author: Option<&UserModel>) -> Self {
        Self {
            id: resource.id,
            images: decode_list(&resource.images),
            tags: decode_list(&resource.tags),
            title: resource.title,
            slug: resource.slug,
            description: resource.description,
            category: resource.category,
            version: resource.version,
            file_size: resource.file_size,
            thumbnail: resource.thumbnail,
            status: resource.status,
            is_featured: resource.is_featured,
            download_count: resource.download_count,
            view_count: resource.view_count,
            average_rating: resource.average_rating,
            rating_count: resource.rating_count,
            author: author.map(AuthorSummary::from),
            expires_at: resource.expires_at.map(|t| t.to_string()),
            created_at: resource.created_at.to_string(),
            updated_at: resource.updated_at.to_string(),
        }
    }

    pub fn with_authors(
        resources: Vec<ResourceModel>,
        authors: &HashMap<i32, UserModel>,
    ) -> Vec<Self> {
        resources
            .into_iter()
            .map(|r| {
                let author = authors.get(&r.author_id);
                Self::build(r, author)
            })
            .collect()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResourceDetailResponse {
    #[serde(flatten)]
    pub resource: ResourceResponse,
    pub long_description: String,
    pub long_description_html: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResourceListQuery {
    /// Comma-separated categories, e.g. `script,mapping`
    pub category: Option<String>,
    pub search: Option<String>,
    /// newest | popular | top_rated | most_downloaded
    #[serde(alias = "sortBy")]
    pub sort: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ResourceListQuery {
    fn into_query(self) -> AppResult<ResourceQuery> {
        let categories = match self.category.as_deref() {
            Some(raw) => parse_categories(raw)?,
            None => Vec::new(),
        };
        Ok(ResourceQuery {
            categories,
            search: self.search,
            sort: ResourceSort::parse(self.sort.as_deref()),
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub slug: String,
    pub resource: ResourceResponse,
}

#[utoipa::path(
    get,
    path = "/api/resources",
    params(ResourceListQuery),
    responses(
        (status = 200, description = "Approved resources", body = PaginatedResponse<ResourceResponse>),
        (status = 400, description = "Unknown category", body = AppError),
    ),
    tag = "resources"
)]
pub async fn list_resources(
    Extension(db): Extension<DatabaseConnection>,
    Query(query): Query<ResourceListQuery>,
) -> AppResult<impl IntoResponse> {
    let query = query.into_query()?;
    let service = ResourceService::new(db);
    let (resources, total) = service.list_public(&query).await?;
    let authors = service.authors_for(&resources).await?;

    let items = ResourceResponse::with_authors(resources, &authors);
    Ok(ApiResponse::ok(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.per_page,
    )))
}

#[utoipa::path(
    get,
    path = "/api/resources/{id}",
    params(("id" = String, Path, description = "Resource ID or slug")),
    responses(
        (status = 200, description = "Resource detail", body = ResourceDetailResponse),
        (status = 404, description = "Resource not found", body = AppError),
    ),
    tag = "resources"
)]
pub async fn get_resource(
    Extension(db): Extension<DatabaseConnection>,
    Path(id_or_slug): Path<String>,
) -> AppResult<impl IntoResponse> {
    let service = ResourceService::new(db.clone());
    let resource = service.get_public(&id_or_slug).await?;
    let author = UserService::new(db).get_by_id(resource.author_id).await.ok();

    let long_description = resource.long_description.clone();
    Ok(ApiResponse::ok(ResourceDetailResponse {
        resource: ResourceResponse::build(resource, author.as_ref()),
        long_description_html: render_markdown(&long_description),
        long_description,
    }))
}

/// Form fields collected from the upload request before anything touches disk.
#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    description: Option<String>,
    long_description: Option<String>,
    category: Option<String>,
    version: Option<String>,
    tags: Option<String>,
    archive: Option<(String, Vec<u8>)>,
    thumbnail: Option<(String, Vec<u8>)>,
    images: Vec<(String, Vec<u8>)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();

            match name.as_str() {
                "resourceFile" | "file" => {
                    let data = read_bytes(field).await?;
                    form.archive = Some((file_name, data));
                }
                "thumbnail" => {
                    let data = read_bytes(field).await?;
                    if !data.is_empty() {
                        form.thumbnail = Some((content_type, data));
                    }
                }
                n if n.starts_with("image") => {
                    let data = read_bytes(field).await?;
                    if !data.is_empty() && form.images.len() < MAX_GALLERY_IMAGES {
                        form.images.push((content_type, data));
                    }
                }
                _ => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read field '{}': {}", name, e))
                    })?;
                    match name.as_str() {
                        "title" => form.title = Some(text),
                        "description" => form.description = Some(text),
                        "longDescription" | "long_description" => {
                            form.long_description = Some(text)
                        }
                        "category" => form.category = Some(text),
                        "version" => form.version = Some(text),
                        "tags" => form.tags = Some(text),
                        _ => {}
                    }
                }
            }
        }

        Ok(form)
    }
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> AppResult<Vec<u8>> {
    field
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| AppError::Validation(format!("Failed to read file data: {}", e)))
}

fn required(value: Option<String>, field: &str, max_chars: usize) -> AppResult<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max_chars {
        return Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max_chars
        )));
    }
    Ok(value)
}

/// Tags arrive as `a, b, c`; blanks and duplicates are dropped.
fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.unwrap_or_default().split(',').map(str::trim) {
        if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

#[utoipa::path(
    post,
    path = "/api/resources",
    security(("session" = [])),
    request_body(content_type = "multipart/form-data", description = "title, description, longDescription, category, version, tags, resourceFile, thumbnail, image_0..image_4"),
    responses(
        (status = 200, description = "Resource uploaded", body = UploadResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 413, description = "File too large", body = AppError),
    ),
    tag = "resources"
)]
pub async fn upload_resource(
    Extension(db): Extension<DatabaseConnection>,
    Extension(cache): Extension<CacheService>,
    Extension(config): Extension<UploadConfig>,
    Extension(webhook): Extension<WebhookNotifier>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = UploadForm::read(multipart).await?;

    let title = required(form.title, "Title", MAX_TITLE_CHARS)?;
    let description = required(form.description, "Description", MAX_DESCRIPTION_CHARS)?;
    let category_raw = required(form.category, "Category", 32)?;
    let category = ResourceCategory::try_from_value(&category_raw)
        .map_err(|_| AppError::Validation(format!("Unknown category '{}'", category_raw)))?;
    let (archive_name, archive_data) = form
        .archive
        .ok_or_else(|| AppError::Validation("Resource file is required".to_string()))?;

    let settings = SiteConfigService::new(db.clone(), cache).settings().await?;
    let slug = resource_slug(&title, chrono::Utc::now().timestamp_millis());

    let stored = UploadService::save_archive(
        &config,
        &archive_data,
        &archive_name,
        &slug,
        &settings.allowed_file_types,
        settings.max_file_size_bytes,
    )
    .await?;

    let mut media = Vec::new();
    let thumbnail = match &form.thumbnail {
        Some((content_type, data)) => {
            let url = UploadService::save_image(&config, data, content_type, "thumbnails").await;
            Some(track_media(url, &mut media, &config, &stored.file_name).await?)
        }
        None => None,
    };

    let mut images = Vec::with_capacity(form.images.len());
    for (content_type, data) in &form.images {
        let url = UploadService::save_image(&config, data, content_type, "images").await;
        images.push(track_media(url, &mut media, &config, &stored.file_name).await?);
    }

    let new = NewResource {
        slug: slug.clone(),
        title,
        description,
        long_description: form.long_description.unwrap_or_default(),
        category,
        version: form
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "1.0.0".to_string()),
        tags: parse_tags(form.tags.as_deref()),
        file_name: stored.file_name.clone(),
        file_size: stored.size,
        thumbnail,
        images,
    };

    let created = match ResourceService::new(db.clone())
        .create(auth_user.user_id, new, &settings)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            UploadService::remove_resource_files(&config, &stored.file_name, &media).await;
            return Err(e);
        }
    };

    let author = UserService::new(db).get_by_id(auth_user.user_id).await?;
    webhook.resource_uploaded(&settings, &created.title, &created.slug, &author.username);

    Ok(ApiResponse::ok(UploadResponse {
        slug: created.slug.clone(),
        resource: ResourceResponse::build(created, Some(&author)),
    }))
}

/// Records a stored media URL, or cleans up everything saved so far when storing failed.
async fn track_media(
    result: AppResult<String>,
    media: &mut Vec<String>,
    config: &UploadConfig,
    archive: &str,
) -> AppResult<String> {
    match result {
        Ok(url) => {
            media.push(url.clone());
            Ok(url)
        }
        Err(e) => {
            UploadService::remove_resource_files(config, archive, media).await;
            Err(e)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/resources/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Resource deleted", body = String),
        (status = 403, description = "Not the owner", body = AppError),
        (status = 404, description = "Resource not found", body = AppError),
    ),
    tag = "resources"
)]
pub async fn delete_resource(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let deleted = ResourceService::new(db)
        .delete(&auth_user.actor(), id)
        .await?;

    let mut media = decode_list(&deleted.images);
    media.extend(deleted.thumbnail.clone());
    UploadService::remove_resource_files(&config, &deleted.file_path, &media).await;

    Ok(ApiResponse::ok("Resource deleted"))
}

#[utoipa::path(
    get,
    path = "/api/resources/{id}/download",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Archive bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 404, description = "Resource not found", body = AppError),
        (status = 429, description = "Daily download quota exhausted", body = AppError),
    ),
    tag = "resources"
)]
pub async fn download_resource(
    Extension(db): Extension<DatabaseConnection>,
    Extension(config): Extension<UploadConfig>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let resource = ResourceService::new(db.clone()).get_downloadable(id).await?;

    // Read before charging the quota so a missing file never costs a download.
    let path = config.archive_path(&resource.file_path);
    let data = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(resource_id = id, "Archive missing at {}: {}", path.display(), e);
        AppError::NotFound
    })?;

    let grant = QuotaService::new(db)
        .attempt_download(auth_user.user_id, resource.id)
        .await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        resource.file_path.replace('"', "")
    ))
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid file name: {}", e)))?;

    let mut response = Response::new(Body::from(data));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert("x-downloads-remaining", HeaderValue::from(grant.remaining));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        assert_eq!(
            parse_tags(Some(" esx, QBCore ,esx,, qbcore ")),
            vec!["esx".to_string(), "QBCore".to_string()]
        );
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn required_fields_are_trimmed_and_bounded() {
        assert_eq!(required(Some("  Car pack ".into()), "Title", 20).unwrap(), "Car pack");
        assert!(required(None, "Title", 20).is_err());
        assert!(required(Some("x".repeat(21)), "Title", 20).is_err());
    }

    #[test]
    fn list_query_clamps_paging() {
        let query = ResourceListQuery {
            category: Some("script, mapping".into()),
            search: None,
            sort: Some("top_rated".into()),
            page: Some(0),
            limit: Some(1000),
        }
        .into_query()
        .unwrap();
        assert_eq!(query.categories.len(), 2);
        assert_eq!(query.sort, ResourceSort::TopRated);
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, MAX_PAGE_SIZE);
    }
}
