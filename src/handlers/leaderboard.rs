use crate::error::AppResult;
use crate::response::ApiResponse;
use crate::services::leaderboard::{Leaderboard, LeaderboardService};
use axum::{response::IntoResponse, Extension};
use sea_orm::DatabaseConnection;

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    responses(
        (status = 200, description = "Top uploaders and referrers", body = Leaderboard),
    ),
    tag = "leaderboard"
)]
pub async fn get_leaderboard(
    Extension(db): Extension<DatabaseConnection>,
) -> AppResult<impl IntoResponse> {
    let board = LeaderboardService::new(db).get().await?;
    Ok(ApiResponse::ok(board))
}
