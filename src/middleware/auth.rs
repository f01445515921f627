use crate::{
    error::AppError,
    models::Role,
    policy::Actor,
    services::session::SessionService,
    utils::cookie::extract_session_token,
};
use axum::{
    extract::{FromRequestParts, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
    Extension,
};
use sea_orm::DatabaseConnection;

/// The signed-in user, as resolved from the session row.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: Role,
}

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// Session authentication middleware.
///
/// Resolves the bearer header or session cookie to a live session, rejects
/// banned accounts and stores the caller in the request extensions.
pub async fn auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_session_token(&headers).ok_or(AppError::Unauthorized)?;

    let user = SessionService::new(db)
        .resolve(&token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if user.status == crate::models::UserStatus::Banned {
        tracing::debug!(user_id = user.id, "Rejected request from banned user");
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(AuthUser {
        user_id: user.id,
        role: user.role,
    });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
