use crate::{
    error::AppResult,
    models::{resource, user, Resource, ResourceStatus, User, UserModel},
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;

pub const LEADERBOARD_SIZE: u64 = 10;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub user_id: i32,
    pub username: String,
    pub avatar: Option<String>,
    pub count: i64,
    pub downloads: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Leaderboard {
    pub top_uploaders: Vec<LeaderboardEntry>,
    pub top_referrers: Vec<LeaderboardEntry>,
}

pub struct LeaderboardService {
    db: DatabaseConnection,
}

impl LeaderboardService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self) -> AppResult<Leaderboard> {
        Ok(Leaderboard {
            top_uploaders: self.top_uploaders().await?,
            top_referrers: self.top_referrers().await?,
        })
    }

    /// Authors ranked by approved uploads, ties broken by downloads received.
    async fn top_uploaders(&self) -> AppResult<Vec<LeaderboardEntry>> {
        let rows: Vec<(i32, i64, Option<i64>)> = Resource::find()
            .select_only()
            .column(resource::Column::AuthorId)
            .column_as(Expr::col(resource::Column::Id).count(), "uploads")
            .column_as(Expr::col(resource::Column::DownloadCount).sum(), "downloads")
            .filter(resource::Column::Status.eq(ResourceStatus::Approved))
            .group_by(resource::Column::AuthorId)
            .order_by_desc(Expr::col(resource::Column::Id).count())
            .order_by_desc(Expr::col(resource::Column::DownloadCount).sum())
            .limit(LEADERBOARD_SIZE)
            .into_tuple()
            .all(&self.db)
            .await?;

        let entries = rows
            .into_iter()
            .map(|(user_id, count, downloads)| (user_id, count, downloads.unwrap_or(0)))
            .collect::<Vec<_>>();
        self.attach_users(entries).await
    }

    async fn top_referrers(&self) -> AppResult<Vec<LeaderboardEntry>> {
        let rows: Vec<(Option<i32>, i64)> = User::find()
            .select_only()
            .column(user::Column::ReferredBy)
            .column_as(Expr::col(user::Column::Id).count(), "referrals")
            .filter(user::Column::ReferredBy.is_not_null())
            .group_by(user::Column::ReferredBy)
            .order_by_desc(Expr::col(user::Column::Id).count())
            .limit(LEADERBOARD_SIZE)
            .into_tuple()
            .all(&self.db)
            .await?;

        let entries = rows
            .into_iter()
            .filter_map(|(referrer, count)| referrer.map(|id| (id, count, 0)))
            .collect::<Vec<_>>();
        self.attach_users(entries).await
    }

    async fn attach_users(&self, entries: Vec<(i32, i64, i64)>) -> AppResult<Vec<LeaderboardEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = entries.iter().map(|(id, _, _)| *id).collect();
        let users: HashMap<i32, UserModel> = User::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(entries
            .into_iter()
            .filter_map(|(user_id, count, downloads)| {
                users.get(&user_id).map(|u| LeaderboardEntry {
                    user_id,
                    username: u.username.clone(),
                    avatar: u.avatar.clone(),
                    count,
                    downloads,
                })
            })
            .collect())
    }
}
