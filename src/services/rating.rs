use crate::{
    error::{AppError, AppResult},
    models::{rating, resource, Rating, RatingModel, Resource, ResourceStatus, User, UserModel},
};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

/// Mean of the given ratings, 0.0 when there are none.
pub fn average_of(values: &[i16]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub struct RatingSummary {
    pub ratings: Vec<(RatingModel, Option<UserModel>)>,
    pub average: f64,
    pub count: usize,
}

pub struct RatingService {
    db: DatabaseConnection,
}

impl RatingService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, resource_id: i32) -> AppResult<RatingSummary> {
        let ratings = Rating::find()
            .filter(rating::Column::ResourceId.eq(resource_id))
            .order_by_desc(rating::Column::UpdatedAt)
            .order_by_desc(rating::Column::Id)
            .find_also_related(User)
            .all(&self.db)
            .await?;

        let values: Vec<i16> = ratings.iter().map(|(r, _)| r.rating).collect();
        Ok(RatingSummary {
            average: round_to_tenth(average_of(&values)),
            count: values.len(),
            ratings,
        })
    }

    /// Creates or replaces the caller's rating, then recomputes the resource's
    /// average and count from all current ratings in the same transaction.
    pub async fn upsert(
        &self,
        resource_id: i32,
        user_id: i32,
        value: i16,
        review: Option<String>,
    ) -> AppResult<(RatingModel, f64, i32)> {
        if !(1..=5).contains(&value) {
            return Err(AppError::Validation("Rating must be between 1 and 5".to_string()));
        }
        let review = review
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;

        Resource::find_by_id(resource_id)
            .filter(resource::Column::Status.eq(ResourceStatus::Approved))
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;

        // One row per (user, resource): a concurrent first rating lands on the
        // unique index and becomes an update instead of a constraint error.
        Rating::insert(rating::ActiveModel {
            resource_id: Set(resource_id),
            user_id: Set(user_id),
            rating: Set(value),
            review: Set(review),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([rating::Column::UserId, rating::Column::ResourceId])
                .update_columns([
                    rating::Column::Rating,
                    rating::Column::Review,
                    rating::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        let saved = Rating::find()
            .filter(rating::Column::ResourceId.eq(resource_id))
            .filter(rating::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("rating row missing after upsert")))?;

        let values: Vec<i16> = Rating::find()
            .select_only()
            .column(rating::Column::Rating)
            .filter(rating::Column::ResourceId.eq(resource_id))
            .into_tuple()
            .all(&txn)
            .await?;
        let average = average_of(&values);
        let count = values.len() as i32;

        Resource::update_many()
            .col_expr(resource::Column::AverageRating, Expr::value(average))
            .col_expr(resource::Column::RatingCount, Expr::value(count))
            .filter(resource::Column::Id.eq(resource_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok((saved, average, count))
    }
}
