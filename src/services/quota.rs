use crate::{
    error::{AppError, AppResult},
    models::{download, resource, user, Resource, User, UserModel},
};
use chrono::NaiveDate;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;

/// Snapshot of a user's download counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    pub download_limit: i32,
    pub referral_bonus: i32,
    pub downloads_today: i32,
    pub last_reset: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i32,
    pub total_limit: i32,
    pub remaining: i32,
}

impl QuotaState {
    pub fn from_user(user: &UserModel) -> Self {
        Self {
            download_limit: user.download_limit,
            referral_bonus: user.referral_bonus,
            downloads_today: user.downloads_today,
            last_reset: user.last_download_reset,
        }
    }

    pub fn total_limit(&self) -> i32 {
        self.download_limit.saturating_add(self.referral_bonus)
    }

    /// Decides whether one more download fits today, treating a stale reset date as zero usage.
    pub fn evaluate(&self, today: NaiveDate) -> QuotaDecision {
        let used = if self.last_reset < today {
            0
        } else {
            self.downloads_today
        };
        let total_limit = self.total_limit();
        QuotaDecision {
            allowed: used < total_limit,
            used,
            total_limit,
            remaining: (total_limit - used).max(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DownloadGrant {
    pub allowed: bool,
    pub remaining: i32,
    pub total_limit: i32,
}

pub struct QuotaService {
    db: DatabaseConnection,
}

impl QuotaService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Consumes one download from today's quota and records it.
    ///
    /// The counter only moves through a conditional increment guarded by
    /// `downloads_today < download_limit + referral_bonus`, so concurrent
    /// requests can never push a user past the limit.
    pub async fn attempt_download(&self, user_id: i32, resource_id: i32) -> AppResult<DownloadGrant> {
        let now = chrono::Utc::now().naive_utc();
        let today = now.date();

        let txn = self.db.begin().await?;

        User::update_many()
            .col_expr(user::Column::DownloadsToday, Expr::value(0))
            .col_expr(user::Column::LastDownloadReset, Expr::value(today))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::LastDownloadReset.lt(today))
            .exec(&txn)
            .await?;

        let consumed = User::update_many()
            .col_expr(
                user::Column::DownloadsToday,
                Expr::col(user::Column::DownloadsToday).add(1),
            )
            .filter(user::Column::Id.eq(user_id))
            .filter(
                Expr::col(user::Column::DownloadsToday).lt(Expr::col(user::Column::DownloadLimit)
                    .add(Expr::col(user::Column::ReferralBonus))),
            )
            .exec(&txn)
            .await?;

        let user = User::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        let total_limit = QuotaState::from_user(&user).total_limit();

        if consumed.rows_affected == 0 {
            txn.rollback().await?;
            tracing::info!(user_id, total_limit, "Download refused, daily quota exhausted");
            return Err(AppError::QuotaExceeded { limit: total_limit });
        }

        download::ActiveModel {
            user_id: Set(user_id),
            resource_id: Set(resource_id),
            downloaded_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        Resource::update_many()
            .col_expr(
                resource::Column::DownloadCount,
                Expr::col(resource::Column::DownloadCount).add(1),
            )
            .filter(resource::Column::Id.eq(resource_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok(DownloadGrant {
            allowed: true,
            remaining: (total_limit - user.downloads_today).max(0),
            total_limit,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn state(limit: i32, bonus: i32, today_count: i32, last_reset: NaiveDate) -> QuotaState {
        QuotaState {
            download_limit: limit,
            referral_bonus: bonus,
            downloads_today: today_count,
            last_reset,
        }
    }

    #[test]
    fn stale_reset_date_counts_as_fresh_day() {
        let decision = state(10, 0, 10, day(1)).evaluate(day(2));
        assert_eq!(decision.used, 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 10);
    }

    #[test]
    fn bonus_extends_the_limit() {
        let decision = state(10, 5, 14, day(2)).evaluate(day(2));
        assert!(decision.allowed);
        assert_eq!(decision.total_limit, 15);
        assert_eq!(decision.remaining, 1);

        let decision = state(10, 5, 15, day(2)).evaluate(day(2));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn zero_limit_never_allows() {
        let decision = state(0, 0, 0, day(1)).evaluate(day(5));
        assert!(!decision.allowed);
    }

    #[test]
    fn over_limit_counts_do_not_go_negative() {
        let decision = state(3, 0, 7, day(2)).evaluate(day(2));
        assert_eq!(decision.remaining, 0);
    }
}
