use crate::error::AppResult;
use crate::models::{user, Role, User};
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::env;

/// Discord accounts that are always admins, from `BOOTSTRAP_ADMIN_DISCORD_IDS`.
#[derive(Debug, Clone, Default)]
pub struct BootstrapAdminConfig {
    pub discord_ids: Vec<String>,
}

impl BootstrapAdminConfig {
    pub fn from_env() -> Self {
        Self::parse(&env::var("BOOTSTRAP_ADMIN_DISCORD_IDS").unwrap_or_default())
    }

    pub fn parse(raw: &str) -> Self {
        let discord_ids = raw
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        Self { discord_ids }
    }

    pub fn contains(&self, discord_id: &str) -> bool {
        self.discord_ids.iter().any(|id| id == discord_id)
    }
}

/// 启动时提升管理员：已存在且配置在列表中的账号设为 admin。
/// 尚未登录过的账号在首次登录时由认证流程创建为 admin。
pub async fn ensure_bootstrap_admin(db: &DatabaseConnection, cfg: &BootstrapAdminConfig) -> AppResult<()> {
    if cfg.discord_ids.is_empty() {
        return Ok(());
    }

    let result = User::update_many()
        .col_expr(user::Column::Role, Expr::value(Role::Admin))
        .col_expr(
            user::Column::UpdatedAt,
            Expr::value(chrono::Utc::now().naive_utc()),
        )
        .filter(user::Column::DiscordId.is_in(cfg.discord_ids.clone()))
        .filter(user::Column::Role.ne(Role::Admin))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(promoted = result.rows_affected, "Bootstrap admins promoted");
    }
    Ok(())
}
