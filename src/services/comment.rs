use crate::{
    error::{AppError, AppResult},
    models::{comment, Comment, CommentModel, Resource, User, UserModel},
    policy::{authorize, Action, Actor},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

pub const MAX_COMMENT_CHARS: usize = 1000;
const MAX_DEPTH: u32 = 10;

/// Trims `raw` and checks it is 1..=1000 characters.
pub fn normalize_content(raw: &str) -> AppResult<String> {
    let content = raw.trim();
    let len = content.chars().count();
    if len == 0 {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    if len > MAX_COMMENT_CHARS {
        return Err(AppError::Validation(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(content.to_string())
}

pub struct CommentService {
    db: DatabaseConnection,
}

impl CommentService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_by_resource(
        &self,
        resource_id: i32,
    ) -> AppResult<Vec<(CommentModel, Option<UserModel>)>> {
        let comments = Comment::find()
            .filter(comment::Column::ResourceId.eq(resource_id))
            .order_by_asc(comment::Column::CreatedAt)
            .order_by_asc(comment::Column::Id)
            .find_also_related(User)
            .all(&self.db)
            .await?;
        Ok(comments)
    }

    pub async fn create(
        &self,
        resource_id: i32,
        user_id: i32,
        parent_id: Option<i32>,
        raw_content: &str,
    ) -> AppResult<CommentModel> {
        let content = normalize_content(raw_content)?;

        Resource::find_by_id(resource_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if let Some(pid) = parent_id {
            self.validate_parent(pid, resource_id).await?;
        }

        let now = chrono::Utc::now().naive_utc();

        let new_comment = comment::ActiveModel {
            resource_id: sea_orm::ActiveValue::Set(resource_id),
            user_id: sea_orm::ActiveValue::Set(user_id),
            parent_id: sea_orm::ActiveValue::Set(parent_id),
            content: sea_orm::ActiveValue::Set(content),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..Default::default()
        };

        let comment = new_comment.insert(&self.db).await?;
        Ok(comment)
    }

    /// Deletes a comment on `resource_id`. Only its author or an admin may do so;
    /// replies go with it through the cascading foreign key.
    pub async fn delete(&self, actor: &Actor, resource_id: i32, comment_id: i32) -> AppResult<()> {
        let existing = self.get_by_id(comment_id).await?;
        if existing.resource_id != resource_id {
            return Err(AppError::NotFound);
        }

        authorize(
            actor,
            Action::DeleteComment {
                author_id: existing.user_id,
            },
        )?;

        Comment::delete_by_id(comment_id).exec(&self.db).await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<CommentModel> {
        Comment::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn validate_parent(&self, parent_id: i32, resource_id: i32) -> AppResult<()> {
        let parent = Comment::find_by_id(parent_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::Validation("Parent comment not found".to_string()))?;

        if parent.resource_id != resource_id {
            return Err(AppError::Validation(
                "Parent comment belongs to a different resource".to_string(),
            ));
        }

        let depth = self.get_comment_depth(parent_id).await?;
        if depth >= MAX_DEPTH {
            return Err(AppError::Validation(
                "Maximum comment nesting depth reached".to_string(),
            ));
        }

        Ok(())
    }

    async fn get_comment_depth(&self, comment_id: i32) -> AppResult<u32> {
        let mut depth = 0u32;
        let mut current_id = Some(comment_id);

        while let Some(id) = current_id {
            let comment = Comment::find_by_id(id)
                .one(&self.db)
                .await?
                .ok_or(AppError::NotFound)?;
            current_id = comment.parent_id;
            depth += 1;
            if depth > MAX_DEPTH {
                break;
            }
        }

        Ok(depth)
    }
}
