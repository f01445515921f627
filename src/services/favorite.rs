use crate::{
    error::{AppError, AppResult},
    models::{favorite, resource, Favorite, Resource, ResourceModel},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteAction {
    Added,
    Removed,
}

pub struct FavoriteService {
    db: DatabaseConnection,
}

impl FavoriteService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Toggle favorite: if exists -> delete, if not -> create.
    pub async fn toggle(&self, user_id: i32, resource_id: i32) -> AppResult<FavoriteAction> {
        Resource::find_by_id(resource_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let removed = Favorite::delete_many()
            .filter(favorite::Column::UserId.eq(user_id))
            .filter(favorite::Column::ResourceId.eq(resource_id))
            .exec(&self.db)
            .await?;
        if removed.rows_affected > 0 {
            return Ok(FavoriteAction::Removed);
        }

        let inserted = favorite::ActiveModel {
            user_id: Set(user_id),
            resource_id: Set(resource_id),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await;

        match inserted {
            Ok(_) => Ok(FavoriteAction::Added),
            // A concurrent toggle already added it.
            Err(e) if matches!(e.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_))) => {
                Ok(FavoriteAction::Added)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The user's favorite resources, most recently favorited first.
    pub async fn list(&self, user_id: i32) -> AppResult<Vec<ResourceModel>> {
        let favorites = Favorite::find()
            .filter(favorite::Column::UserId.eq(user_id))
            .order_by_desc(favorite::Column::CreatedAt)
            .order_by_desc(favorite::Column::Id)
            .all(&self.db)
            .await?;

        let resource_ids: Vec<i32> = favorites.iter().map(|f| f.resource_id).collect();
        if resource_ids.is_empty() {
            return Ok(vec![]);
        }

        let resources = Resource::find()
            .filter(resource::Column::Id.is_in(resource_ids.clone()))
            .all(&self.db)
            .await?;

        // Reorder resources to match favorite order
        let by_id: HashMap<i32, ResourceModel> = resources.into_iter().map(|r| (r.id, r)).collect();
        Ok(resource_ids
            .into_iter()
            .filter_map(|id| by_id.get(&id).cloned())
            .collect())
    }
}
