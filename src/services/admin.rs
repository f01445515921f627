use crate::{
    error::{AppError, AppResult},
    models::{
        download, resource, ticket, user, Download, Resource, ResourceModel, ResourceStatus, Role, Ticket,
        TicketStatus, User, UserModel, UserStatus,
    },
    policy::Actor,
    services::session::SessionService,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminStats {
    pub total_users: u64,
    pub users_today: u64,
    pub banned_users: u64,
    pub total_resources: u64,
    pub pending_resources: u64,
    pub total_downloads: u64,
    pub downloads_today: u64,
    pub open_tickets: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub download_limit: Option<i32>,
}

pub struct AdminService {
    db: DatabaseConnection,
}

impl AdminService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_stats(&self) -> AppResult<AdminStats> {
        let today_start = chrono::Utc::now()
            .naive_utc()
            .date()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid midnight"))?;

        let total_users = User::find().count(&self.db).await?;
        let users_today = User::find()
            .filter(user::Column::CreatedAt.gte(today_start))
            .count(&self.db)
            .await?;
        let banned_users = User::find()
            .filter(user::Column::Status.eq(UserStatus::Banned))
            .count(&self.db)
            .await?;

        let total_resources = Resource::find().count(&self.db).await?;
        let pending_resources = Resource::find()
            .filter(resource::Column::Status.eq(ResourceStatus::Pending))
            .count(&self.db)
            .await?;

        let total_downloads = Download::find().count(&self.db).await?;
        let downloads_today = Download::find()
            .filter(download::Column::DownloadedAt.gte(today_start))
            .count(&self.db)
            .await?;

        let open_tickets = Ticket::find()
            .filter(ticket::Column::Status.is_in([TicketStatus::Open, TicketStatus::InProgress]))
            .count(&self.db)
            .await?;

        Ok(AdminStats {
            total_users,
            users_today,
            banned_users,
            total_resources,
            pending_resources,
            total_downloads,
            downloads_today,
            open_tickets,
        })
    }

    pub async fn list_users(
        &self,
        filter: &UserFilter,
        page: u64,
        per_page: u64,
    ) -> AppResult<(Vec<UserModel>, u64)> {
        let mut select = User::find().order_by_desc(user::Column::CreatedAt);

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(user::Column::Username.contains(search))
                    .add(user::Column::Email.contains(search))
                    .add(user::Column::DiscordId.eq(search)),
            );
        }
        if let Some(role) = filter.role {
            select = select.filter(user::Column::Role.eq(role));
        }
        if let Some(status) = filter.status {
            select = select.filter(user::Column::Status.eq(status));
        }

        let paginator = select.paginate(&self.db, per_page);
        let total = paginator.num_items().await?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((users, total))
    }

    /// Banning also revokes every session the user holds.
    pub async fn update_user(&self, actor: &Actor, user_id: i32, update: UserUpdate) -> AppResult<UserModel> {
        if update.role.is_none() && update.status.is_none() && update.download_limit.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if let Some(limit) = update.download_limit {
            if limit < 0 {
                return Err(AppError::Validation(
                    "download_limit cannot be negative".to_string(),
                ));
            }
        }
        if actor.user_id == user_id
            && (update.status == Some(UserStatus::Banned)
                || update.role.is_some_and(|r| r != Role::Admin))
        {
            return Err(AppError::Validation(
                "You cannot demote or ban yourself".to_string(),
            ));
        }

        let existing = User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: user::ActiveModel = existing.into();
        if let Some(role) = update.role {
            active.role = Set(role);
        }
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(limit) = update.download_limit {
            active.download_limit = Set(limit);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        let updated = active.update(&self.db).await?;

        if update.status == Some(UserStatus::Banned) {
            let revoked = SessionService::new(self.db.clone())
                .revoke_all(user_id)
                .await?;
            tracing::info!(user_id, revoked, "User banned, sessions revoked");
        }

        Ok(updated)
    }

    /// Returns the user's uploads, whose rows cascade away with the account, so
    /// the caller can remove their files.
    pub async fn delete_user(&self, actor: &Actor, user_id: i32) -> AppResult<Vec<ResourceModel>> {
        if actor.user_id == user_id {
            return Err(AppError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }

        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let uploads = Resource::find()
            .filter(resource::Column::AuthorId.eq(user_id))
            .all(&self.db)
            .await?;

        User::delete_by_id(user_id).exec(&self.db).await?;
        tracing::info!(user_id, by = actor.user_id, uploads = uploads.len(), "User deleted");
        Ok(uploads)
    }
}
