use crate::{
    error::{AppError, AppResult},
    models::{download, resource, user, Download, Resource, ResourceModel, Role, User, UserModel, UserStatus},
    services::{
        quota::{QuotaDecision, QuotaState},
        referral::{self, ReferralTerms},
        site_config::SiteSettings,
    },
    utils::generate_referral_code,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;

const RECENT_DOWNLOADS: u64 = 50;

/// Fields taken from the identity provider when an account is first created.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub discord_id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserStats {
    pub total_downloads: u64,
    pub total_uploads: u64,
    pub referrals_count: u64,
    pub referral_code: String,
    pub referral_bonus: i32,
    pub quota: QuotaDecision,
}

pub struct UserService {
    db: DatabaseConnection,
}

impl UserService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, user_id: i32) -> AppResult<UserModel> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn find_by_discord_id(&self, discord_id: &str) -> AppResult<Option<UserModel>> {
        Ok(User::find()
            .filter(user::Column::DiscordId.eq(discord_id))
            .one(&self.db)
            .await?)
    }

    /// Creates an account and, when `referral_code` names an existing user,
    /// credits that user inside the same transaction.
    pub async fn create(
        &self,
        new_user: NewUser,
        referral_code: Option<&str>,
        settings: &SiteSettings,
    ) -> AppResult<UserModel> {
        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        let code = unique_referral_code(&txn).await?;
        let created = user::ActiveModel {
            discord_id: Set(new_user.discord_id),
            username: Set(new_user.username),
            email: Set(new_user.email),
            avatar: Set(new_user.avatar),
            role: Set(new_user.role),
            status: Set(UserStatus::Active),
            download_limit: Set(settings.default_download_limit),
            downloads_today: Set(0),
            last_download_reset: Set(now.date()),
            referral_code: Set(code),
            referred_by: Set(None),
            referral_bonus: Set(0),
            last_login: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::from_insert(e, "Account"))?;

        let referred_by = match referral_code {
            Some(code) => {
                let terms = ReferralTerms {
                    bonus: settings.referral_bonus_downloads,
                    cap: settings.max_referral_bonus,
                };
                referral::apply_referral(&txn, created.id, code, terms).await?
            }
            None => None,
        };

        txn.commit().await?;
        tracing::info!(user_id = created.id, ?referred_by, "Account created");

        Ok(UserModel {
            referred_by,
            ..created
        })
    }

    /// Refreshes the profile copied from Discord on every login.
    pub async fn record_login(
        &self,
        existing: UserModel,
        username: String,
        email: Option<String>,
        avatar: Option<String>,
        promote_to_admin: bool,
    ) -> AppResult<UserModel> {
        let now = chrono::Utc::now().naive_utc();
        let mut active: user::ActiveModel = existing.into();
        active.username = Set(username);
        active.email = Set(email);
        active.avatar = Set(avatar);
        active.last_login = Set(Some(now));
        active.updated_at = Set(now);
        if promote_to_admin {
            active.role = Set(Role::Admin);
        }
        Ok(active.update(&self.db).await?)
    }

    pub async fn recent_downloads(
        &self,
        user_id: i32,
    ) -> AppResult<Vec<(download::Model, Option<ResourceModel>)>> {
        Ok(Download::find()
            .filter(download::Column::UserId.eq(user_id))
            .order_by_desc(download::Column::DownloadedAt)
            .order_by_desc(download::Column::Id)
            .limit(RECENT_DOWNLOADS)
            .find_also_related(Resource)
            .all(&self.db)
            .await?)
    }

    pub async fn uploads(&self, user_id: i32) -> AppResult<Vec<ResourceModel>> {
        Ok(Resource::find()
            .filter(resource::Column::AuthorId.eq(user_id))
            .order_by_desc(resource::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn stats(&self, user_id: i32) -> AppResult<UserStats> {
        let user = self.get_by_id(user_id).await?;
        let total_downloads = Download::find()
            .filter(download::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;
        let total_uploads = Resource::find()
            .filter(resource::Column::AuthorId.eq(user_id))
            .count(&self.db)
            .await?;
        let referrals_count = referral::count_referrals(&self.db, user_id).await?;
        let today = chrono::Utc::now().date_naive();

        Ok(UserStats {
            total_downloads,
            total_uploads,
            referrals_count,
            quota: QuotaState::from_user(&user).evaluate(today),
            referral_code: user.referral_code,
            referral_bonus: user.referral_bonus,
        })
    }
}

async fn unique_referral_code<C: ConnectionTrait>(conn: &C) -> AppResult<String> {
    for _ in 0..5 {
        let code = generate_referral_code()?;
        let taken = User::find()
            .filter(user::Column::ReferralCode.eq(code.as_str()))
            .count(conn)
            .await?
            > 0;
        if !taken {
            return Ok(code);
        }
    }
    Err(AppError::Conflict(
        "Could not allocate a unique referral code".to_string(),
    ))
}
