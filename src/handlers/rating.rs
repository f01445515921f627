use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{RatingModel, UserModel};
use crate::response::ApiResponse;
use crate::services::rating::{round_to_tenth, RatingService};
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RateRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 2000))]
    pub review: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatingResponse {
    pub id: i32,
    pub resource_id: i32,
    pub user_id: i32,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub rating: i16,
    pub review: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RatingResponse {
    fn build(rating: RatingModel, user: Option<&UserModel>) -> Self {
        Self {
            id: rating.id,
            resource_id: rating.resource_id,
            user_id: rating.user_id,
            username: user.map(|u| u.username.clone()),
            avatar: user.and_then(|u| u.avatar.clone()),
            rating: rating.rating,
            review: rating.review,
            created_at: rating.created_at.to_string(),
            updated_at: rating.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatingListResponse {
    pub ratings: Vec<RatingResponse>,
    /// Mean of all ratings, rounded to one decimal
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RateResponse {
    pub rating: RatingResponse,
    pub average: f64,
    pub count: i32,
}

#[utoipa::path(
    get,
    path = "/api/resources/{id}/ratings",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Ratings with average", body = RatingListResponse),
    ),
    tag = "ratings"
)]
pub async fn list_ratings(
    Extension(db): Extension<DatabaseConnection>,
    Path(resource_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let summary = RatingService::new(db).list(resource_id).await?;
    let ratings = summary
        .ratings
        .into_iter()
        .map(|(r, u)| RatingResponse::build(r, u.as_ref()))
        .collect();

    Ok(ApiResponse::ok(RatingListResponse {
        ratings,
        average: summary.average,
        count: summary.count,
    }))
}

#[utoipa::path(
    post,
    path = "/api/resources/{id}/ratings",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Resource ID")),
    request_body = RateRequest,
    responses(
        (status = 200, description = "Rating saved", body = RateResponse),
        (status = 400, description = "Rating outside 1..=5", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 404, description = "Resource not found", body = AppError),
    ),
    tag = "ratings"
)]
pub async fn rate_resource(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(resource_id): Path<i32>,
    Json(payload): Json<RateRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let (rating, average, count) = RatingService::new(db)
        .upsert(resource_id, auth_user.user_id, payload.rating, payload.review)
        .await?;

    Ok(ApiResponse::with_message(
        RateResponse {
            rating: RatingResponse::build(rating, None),
            average: round_to_tenth(average),
            count,
        },
        "Rating saved",
    ))
}
