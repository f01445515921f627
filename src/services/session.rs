use crate::{
    error::AppResult,
    models::{session, Session, User, UserModel},
    utils::{generate_session_token, hash_token},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

/// Server-side sessions. Clients hold an opaque token; only its SHA-256 is stored.
pub struct SessionService {
    db: DatabaseConnection,
}

impl SessionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a session and returns the raw token for the cookie.
    pub async fn create(&self, user_id: i32, ttl_seconds: u64) -> AppResult<String> {
        let now = chrono::Utc::now().naive_utc();

        let purged = Session::delete_many()
            .filter(session::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await?;
        if purged.rows_affected > 0 {
            tracing::debug!(count = purged.rows_affected, "Purged expired sessions");
        }

        let token = generate_session_token()?;
        let expires_at = now + chrono::Duration::seconds(ttl_seconds as i64);

        session::ActiveModel {
            user_id: Set(user_id),
            token_hash: Set(hash_token(&token)),
            expires_at: Set(expires_at),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(token)
    }

    /// Returns the owner of a live session, or `None` for unknown or expired tokens.
    pub async fn resolve(&self, token: &str) -> AppResult<Option<UserModel>> {
        let now = chrono::Utc::now().naive_utc();
        let found = Session::find()
            .filter(session::Column::TokenHash.eq(hash_token(token)))
            .filter(session::Column::ExpiresAt.gt(now))
            .find_also_related(User)
            .one(&self.db)
            .await?;

        Ok(found.and_then(|(_, user)| user))
    }

    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        Session::delete_many()
            .filter(session::Column::TokenHash.eq(hash_token(token)))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Drops every session of a user, e.g. after a ban.
    pub async fn revoke_all(&self, user_id: i32) -> AppResult<u64> {
        let result = Session::delete_many()
            .filter(session::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

