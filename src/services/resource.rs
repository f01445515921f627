use crate::{
    error::{AppError, AppResult},
    models::{resource, user, Resource, ResourceCategory, ResourceModel, ResourceStatus, User, UserModel},
    policy::{authorize, Action, Actor},
    services::site_config::SiteSettings,
};
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Select,
};
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: u64 = 12;
pub const MAX_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceSort {
    #[default]
    Newest,
    Popular,
    TopRated,
    MostDownloaded,
}

impl ResourceSort {
    /// Unknown values fall back to newest first.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("popular") => Self::Popular,
            Some("top_rated") => Self::TopRated,
            Some("most_downloaded") => Self::MostDownloaded,
            _ => Self::Newest,
        }
    }

    fn apply(self, select: Select<Resource>) -> Select<Resource> {
        let select = match self {
            Self::Newest => select.order_by_desc(resource::Column::CreatedAt),
            Self::Popular => select.order_by_desc(resource::Column::ViewCount),
            Self::TopRated => select
                .order_by_desc(resource::Column::AverageRating)
                .order_by_desc(resource::Column::RatingCount),
            Self::MostDownloaded => select.order_by_desc(resource::Column::DownloadCount),
        };
        select.order_by_desc(resource::Column::Id)
    }
}

/// Parses a comma-separated category filter such as `script,mapping`.
pub fn parse_categories(raw: &str) -> AppResult<Vec<ResourceCategory>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ResourceCategory::try_from_value(&s.to_string())
                .map_err(|_| AppError::Validation(format!("Unknown category '{}'", s)))
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    pub categories: Vec<ResourceCategory>,
    pub search: Option<String>,
    pub sort: ResourceSort,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub long_description: String,
    pub category: ResourceCategory,
    pub version: String,
    pub tags: Vec<String>,
    pub file_name: String,
    pub file_size: i64,
    pub thumbnail: Option<String>,
    pub images: Vec<String>,
}

/// Condition for resources the public may see: approved and not expired.
fn visible(now: chrono::NaiveDateTime) -> Condition {
    Condition::all()
        .add(resource::Column::Status.eq(ResourceStatus::Approved))
        .add(
            Condition::any()
                .add(resource::Column::ExpiresAt.is_null())
                .add(resource::Column::ExpiresAt.gt(now)),
        )
}

pub fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub struct ResourceService {
    db: DatabaseConnection,
}

impl ResourceService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_public(&self, query: &ResourceQuery) -> AppResult<(Vec<ResourceModel>, u64)> {
        let now = chrono::Utc::now().naive_utc();
        let mut select = Resource::find().filter(visible(now));

        if !query.categories.is_empty() {
            select = select.filter(resource::Column::Category.is_in(query.categories.clone()));
        }

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(resource::Column::Title.contains(term))
                    .add(resource::Column::Description.contains(term)),
            );
        }

        let paginator = query.sort.apply(select).paginate(&self.db, query.per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(query.page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<ResourceModel> {
        Resource::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Public detail lookup by numeric id or slug. Counts a view.
    pub async fn get_public(&self, id_or_slug: &str) -> AppResult<ResourceModel> {
        let now = chrono::Utc::now().naive_utc();
        let key = match id_or_slug.parse::<i32>() {
            Ok(id) => resource::Column::Id.eq(id),
            Err(_) => resource::Column::Slug.eq(id_or_slug),
        };

        let mut found = Resource::find()
            .filter(key)
            .filter(visible(now))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        Resource::update_many()
            .col_expr(
                resource::Column::ViewCount,
                Expr::col(resource::Column::ViewCount).add(1),
            )
            .filter(resource::Column::Id.eq(found.id))
            .exec(&self.db)
            .await?;
        found.view_count += 1;

        Ok(found)
    }

    /// Resources that may be downloaded right now.
    pub async fn get_downloadable(&self, id: i32) -> AppResult<ResourceModel> {
        let now = chrono::Utc::now().naive_utc();
        Resource::find_by_id(id)
            .filter(visible(now))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn create(
        &self,
        author_id: i32,
        new: NewResource,
        settings: &SiteSettings,
    ) -> AppResult<ResourceModel> {
        let now = chrono::Utc::now().naive_utc();
        let status = if settings.auto_approve_resources {
            ResourceStatus::Approved
        } else {
            ResourceStatus::Pending
        };
        let expires_at = (settings.resource_expiration_days > 0)
            .then(|| now + chrono::Duration::days(settings.resource_expiration_days));

        let created = resource::ActiveModel {
            title: Set(new.title),
            slug: Set(new.slug),
            description: Set(new.description),
            long_description: Set(new.long_description),
            category: Set(new.category),
            version: Set(new.version),
            author_id: Set(author_id),
            file_path: Set(new.file_name),
            file_size: Set(new.file_size),
            thumbnail: Set(new.thumbnail),
            images: Set(serde_json::to_string(&new.images).map_err(anyhow::Error::from)?),
            tags: Set(serde_json::to_string(&new.tags).map_err(anyhow::Error::from)?),
            status: Set(status),
            is_featured: Set(false),
            download_count: Set(0),
            view_count: Set(0),
            average_rating: Set(0.0),
            rating_count: Set(0),
            expires_at: Set(expires_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(|e| AppError::from_insert(e, "A resource with this slug"))?;

        tracing::info!(resource_id = created.id, author_id, status = ?created.status, "Resource uploaded");
        Ok(created)
    }

    /// Deletes a resource owned by `actor` (staff may delete any). Returns the removed row.
    pub async fn delete(&self, actor: &Actor, id: i32) -> AppResult<ResourceModel> {
        let existing = self.get_by_id(id).await?;
        authorize(
            actor,
            Action::DeleteResource {
                author_id: existing.author_id,
            },
        )?;

        Resource::delete_by_id(id).exec(&self.db).await?;
        tracing::info!(resource_id = id, by = actor.user_id, "Resource deleted");
        Ok(existing)
    }

    pub async fn admin_list(
        &self,
        status: Option<ResourceStatus>,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<ResourceModel>, u64)> {
        let mut select = Resource::find();
        if let Some(status) = status {
            select = select.filter(resource::Column::Status.eq(status));
        }

        let paginator = select
            .order_by_desc(resource::Column::CreatedAt)
            .order_by_desc(resource::Column::Id)
            .paginate(&self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn moderate(
        &self,
        id: i32,
        status: Option<ResourceStatus>,
        is_featured: Option<bool>,
    ) -> AppResult<ResourceModel> {
        if status.is_none() && is_featured.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        let existing = self.get_by_id(id).await?;
        let mut active: resource::ActiveModel = existing.into();
        if let Some(status) = status {
            active.status = Set(status);
        }
        if let Some(featured) = is_featured {
            active.is_featured = Set(featured);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        let updated = active.update(&self.db).await?;
        tracing::info!(resource_id = id, status = ?updated.status, featured = updated.is_featured, "Resource moderated");
        Ok(updated)
    }

    /// Authors for a batch of resources, keyed by user id.
    pub async fn authors_for(&self, resources: &[ResourceModel]) -> AppResult<HashMap<i32, UserModel>> {
        let mut ids: Vec<i32> = resources.iter().map(|r| r.author_id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = User::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}
