use crate::{
    error::AppResult,
    models::{user, User},
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
};

/// Referral terms taken from the site configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralTerms {
    pub bonus: i32,
    /// Opt-in ceiling on the referrer's total bonus; 0 (the default) means uncapped.
    pub cap: i32,
}

/// Links a freshly created user to the owner of `code` and pays the referrer.
///
/// Must run on the account-creation transaction so the bonus is paid exactly once.
/// Unknown codes are ignored, and a user who already has a referrer pays nothing.
/// Returns the referrer's id when a bonus was paid.
pub async fn apply_referral<C: ConnectionTrait>(
    conn: &C,
    new_user_id: i32,
    code: &str,
    terms: ReferralTerms,
) -> AppResult<Option<i32>> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Ok(None);
    }

    let Some(referrer) = User::find()
        .filter(user::Column::ReferralCode.eq(code.as_str()))
        .one(conn)
        .await?
    else {
        tracing::debug!(code = %code, "Ignoring unknown referral code");
        return Ok(None);
    };

    if referrer.id == new_user_id {
        return Ok(None);
    }

    let linked = User::update_many()
        .col_expr(user::Column::ReferredBy, Expr::value(referrer.id))
        .filter(user::Column::Id.eq(new_user_id))
        .filter(user::Column::ReferredBy.is_null())
        .exec(conn)
        .await?;
    if linked.rows_affected != 1 {
        tracing::debug!(referred_id = new_user_id, "User already referred, no bonus paid");
        return Ok(None);
    }

    User::update_many()
        .col_expr(
            user::Column::ReferralBonus,
            Expr::col(user::Column::ReferralBonus).add(terms.bonus),
        )
        .filter(user::Column::Id.eq(referrer.id))
        .exec(conn)
        .await?;

    if terms.cap > 0 {
        User::update_many()
            .col_expr(user::Column::ReferralBonus, Expr::value(terms.cap))
            .filter(user::Column::Id.eq(referrer.id))
            .filter(user::Column::ReferralBonus.gt(terms.cap))
            .exec(conn)
            .await?;
    }

    tracing::info!(
        referrer_id = referrer.id,
        referred_id = new_user_id,
        bonus = terms.bonus,
        "Referral bonus credited"
    );
    Ok(Some(referrer.id))
}

pub async fn count_referrals<C: ConnectionTrait>(conn: &C, user_id: i32) -> AppResult<u64> {
    Ok(User::find()
        .filter(user::Column::ReferredBy.eq(user_id))
        .count(conn)
        .await?)
}
