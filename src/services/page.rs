use crate::{
    error::{AppError, AppResult},
    models::{page, Page, PageModel},
    utils::slug::{is_valid_slug, slugify},
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

#[derive(Debug, Clone, Default)]
pub struct PageInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
    pub show_in_nav: Option<bool>,
    pub sort_order: Option<i32>,
}

fn resolve_slug(raw: Option<&str>, title: &str) -> AppResult<String> {
    let slug = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.to_ascii_lowercase(),
        None => slugify(title),
    };
    if !is_valid_slug(&slug) {
        return Err(AppError::Validation(
            "Slug may only contain lowercase letters, digits and hyphens".to_string(),
        ));
    }
    Ok(slug)
}

fn required_title(raw: &str) -> AppResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    Ok(title.to_string())
}

pub struct PageService {
    db: DatabaseConnection,
}

impl PageService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// All pages in navigation order.
    pub async fn list(&self) -> AppResult<Vec<PageModel>> {
        Ok(Page::find()
            .order_by_asc(page::Column::SortOrder)
            .order_by_asc(page::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Numeric keys are ids, anything else is a slug.
    pub async fn get(&self, id_or_slug: &str) -> AppResult<PageModel> {
        let select = match id_or_slug.parse::<i32>() {
            Ok(id) => Page::find_by_id(id),
            Err(_) => Page::find().filter(page::Column::Slug.eq(id_or_slug)),
        };
        select.one(&self.db).await?.ok_or(AppError::NotFound)
    }

    pub async fn get_published(&self, slug: &str) -> AppResult<PageModel> {
        Page::find()
            .filter(page::Column::Slug.eq(slug))
            .filter(page::Column::IsPublished.eq(true))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn create(&self, input: PageInput) -> AppResult<PageModel> {
        let title = required_title(input.title.as_deref().unwrap_or_default())?;
        let slug = resolve_slug(input.slug.as_deref(), &title)?;
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;

        let taken = Page::find()
            .filter(page::Column::Slug.eq(slug.as_str()))
            .one(&txn)
            .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("A page with this slug already exists".to_string()));
        }

        let sort_order = match input.sort_order {
            Some(order) => order,
            None => {
                let max: Option<Option<i32>> = Page::find()
                    .select_only()
                    .column_as(Expr::col(page::Column::SortOrder).max(), "max_order")
                    .into_tuple()
                    .one(&txn)
                    .await?;
                max.flatten().map_or(0, |m| m + 1)
            }
        };

        let created = page::ActiveModel {
            title: Set(title),
            slug: Set(slug),
            content: Set(input.content.unwrap_or_default()),
            is_published: Set(input.is_published.unwrap_or(false)),
            show_in_nav: Set(input.show_in_nav.unwrap_or(false)),
            sort_order: Set(sort_order),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::from_insert(e, "Page"))?;

        txn.commit().await?;
        tracing::info!(page_id = created.id, slug = %created.slug, "Page created");
        Ok(created)
    }

    pub async fn update(&self, id: i32, input: PageInput) -> AppResult<PageModel> {
        let existing = Page::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: page::ActiveModel = existing.clone().into();

        if let Some(title) = input.title.as_deref() {
            active.title = Set(required_title(title)?);
        }
        if let Some(raw) = input.slug.as_deref() {
            let slug = resolve_slug(Some(raw), &existing.title)?;
            if slug != existing.slug {
                let taken = Page::find()
                    .filter(page::Column::Slug.eq(slug.as_str()))
                    .filter(page::Column::Id.ne(id))
                    .one(&self.db)
                    .await?;
                if taken.is_some() {
                    return Err(AppError::Conflict(
                        "A page with this slug already exists".to_string(),
                    ));
                }
            }
            active.slug = Set(slug);
        }
        if let Some(content) = input.content {
            active.content = Set(content);
        }
        if let Some(is_published) = input.is_published {
            active.is_published = Set(is_published);
        }
        if let Some(show_in_nav) = input.show_in_nav {
            active.show_in_nav = Set(show_in_nav);
        }
        if let Some(order) = input.sort_order {
            active.sort_order = Set(order);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        active
            .update(&self.db)
            .await
            .map_err(|e| AppError::from_insert(e, "Page"))
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = Page::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
