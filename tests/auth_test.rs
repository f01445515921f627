mod common;

use fivehub::models::{user, User};
use fivehub::services::bootstrap_admin::BootstrapAdminConfig;
use fivehub::services::referral::{apply_referral, ReferralTerms};
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;

async fn me(app: &common::TestApp, token: &str) -> reqwest::Response {
    app.client
        .get(app.url("/auth/me"))
        .header(reqwest::header::COOKIE, format!("session={}", token))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn login_redirects_to_discord_with_signed_state() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .get(app.url("/auth/discord"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);

    let location = common::location(&resp);
    assert!(location.contains("/oauth2/authorize?"));
    assert!(location.contains("client_id=test-client"));
    assert!(location.contains("response_type=code"));
    assert!(common::set_cookie_value(&resp, "oauth_state").is_some());
}

#[tokio::test]
async fn first_login_creates_account_and_session() {
    let app = common::spawn_app().await;

    let resp = common::discord_login(&app, "1001", "alice", None).await;
    assert_eq!(resp.status(), 303);
    assert_eq!(common::location(&resp), "http://fivehub.test/dashboard");
    let token = common::set_cookie_value(&resp, "session").expect("session cookie");

    let resp = me(&app, &token).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["user"]["username"], "alice");
    assert_eq!(body["data"]["user"]["discord_id"], "1001");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert_eq!(body["data"]["user"]["download_limit"], 10);
    assert_eq!(
        body["data"]["user"]["avatar"],
        "https://cdn.discordapp.com/avatars/1001/abc123.png"
    );
    assert_eq!(body["data"]["quota"]["remaining"], 10);
    assert_eq!(
        body["data"]["user"]["referral_code"].as_str().unwrap().len(),
        8
    );
}

#[tokio::test]
async fn second_login_reuses_the_account() {
    let app = common::spawn_app().await;

    let first = common::login_token(&app, "1002", "bob").await;
    let second = common::login_token(&app, "1002", "bobby").await;
    assert_ne!(first, second);

    let a: Value = me(&app, &first).await.json().await.unwrap();
    let b: Value = me(&app, &second).await.json().await.unwrap();
    assert_eq!(a["data"]["user"]["id"], b["data"]["user"]["id"]);
    assert_eq!(b["data"]["user"]["username"], "bobby");
}

#[tokio::test]
async fn callback_without_state_cookie_fails() {
    let app = common::spawn_app().await;
    let (state, _nonce) = common::begin_login(&app, None).await;

    let resp = app
        .client
        .get(app.url("/auth/discord/callback"))
        .query(&[("code", "1003:carol"), ("state", state.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(
        common::location(&resp),
        "http://fivehub.test/?error=auth_failed"
    );
    assert!(common::set_cookie_value(&resp, "session").is_none());
}

#[tokio::test]
async fn callback_with_mismatched_nonce_fails() {
    let app = common::spawn_app().await;
    let (state, _nonce) = common::begin_login(&app, None).await;

    let resp = app
        .client
        .get(app.url("/auth/discord/callback"))
        .query(&[("code", "1003:carol"), ("state", state.as_str())])
        .header(reqwest::header::COOKIE, "oauth_state=somebody-else")
        .send()
        .await
        .unwrap();
    assert_eq!(
        common::location(&resp),
        "http://fivehub.test/?error=auth_failed"
    );
}

#[tokio::test]
async fn provider_errors_map_to_error_codes() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .get(app.url("/auth/discord/callback?error=access_denied"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        common::location(&resp),
        "http://fivehub.test/?error=auth_denied"
    );

    let resp = app
        .client
        .get(app.url("/auth/discord/callback"))
        .send()
        .await
        .unwrap();
    assert_eq!(common::location(&resp), "http://fivehub.test/?error=no_code");

    let (state, nonce) = common::begin_login(&app, None).await;
    let resp = app
        .client
        .get(app.url("/auth/discord/callback"))
        .query(&[("code", "bad"), ("state", state.as_str())])
        .header(reqwest::header::COOKIE, format!("oauth_state={}", nonce))
        .send()
        .await
        .unwrap();
    assert_eq!(
        common::location(&resp),
        "http://fivehub.test/?error=auth_failed"
    );
}

#[tokio::test]
async fn referral_pays_the_referrer_once() {
    let app = common::spawn_app().await;

    let alice = common::login_token(&app, "2001", "alice").await;
    let body: Value = me(&app, &alice).await.json().await.unwrap();
    let code = body["data"]["user"]["referral_code"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = common::discord_login(&app, "2002", "bob", Some(&code.to_lowercase())).await;
    assert_eq!(common::location(&resp), "http://fivehub.test/dashboard");

    // Logging in again with the code must not pay twice.
    let resp = common::discord_login(&app, "2002", "bob", Some(&code)).await;
    assert_eq!(common::location(&resp), "http://fivehub.test/dashboard");

    let resp = app
        .client
        .get(app.url("/user/stats"))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["referrals_count"], 1);
    assert_eq!(body["data"]["referral_bonus"], 5);
    assert_eq!(body["data"]["quota"]["total_limit"], 15);
}

#[tokio::test]
async fn referral_bonus_is_uncapped_by_default() {
    let app = common::spawn_app().await;

    let alice = common::login_token(&app, "2101", "alice").await;
    let body: Value = me(&app, &alice).await.json().await.unwrap();
    let alice_id = body["data"]["user"]["id"].as_i64().unwrap() as i32;
    let code = body["data"]["user"]["referral_code"]
        .as_str()
        .unwrap()
        .to_string();

    User::update_many()
        .col_expr(user::Column::ReferralBonus, Expr::value(48))
        .filter(user::Column::Id.eq(alice_id))
        .exec(&app.db)
        .await
        .unwrap();

    let resp = common::discord_login(&app, "2102", "bob", Some(&code)).await;
    assert_eq!(common::location(&resp), "http://fivehub.test/dashboard");

    let stored = User::find_by_id(alice_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(stored.referral_bonus, 53);
}

#[tokio::test]
async fn referral_is_only_paid_when_the_link_is_new() {
    let app = common::spawn_app().await;
    let (referrer_id, _) = common::create_test_user(&app, "referrer").await;
    let (newcomer_id, _) = common::create_test_user(&app, "newcomer").await;

    let referrer = User::find_by_id(referrer_id).one(&app.db).await.unwrap().unwrap();
    let terms = ReferralTerms { bonus: 5, cap: 0 };

    let paid = apply_referral(&app.db, newcomer_id, &referrer.referral_code, terms)
        .await
        .unwrap();
    assert_eq!(paid, Some(referrer_id));

    let paid = apply_referral(&app.db, newcomer_id, &referrer.referral_code, terms)
        .await
        .unwrap();
    assert_eq!(paid, None);

    let referrer = User::find_by_id(referrer_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(referrer.referral_bonus, 5);
    let newcomer = User::find_by_id(newcomer_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(newcomer.referred_by, Some(referrer_id));
}

#[tokio::test]
async fn configured_cap_clamps_the_referral_bonus() {
    let app = common::spawn_app().await;
    let (referrer_id, _) = common::create_test_user(&app, "capped").await;
    let (first_id, _) = common::create_test_user(&app, "first").await;
    let (second_id, _) = common::create_test_user(&app, "second").await;

    let code = User::find_by_id(referrer_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .referral_code;
    let terms = ReferralTerms { bonus: 5, cap: 7 };

    apply_referral(&app.db, first_id, &code, terms).await.unwrap();
    apply_referral(&app.db, second_id, &code, terms).await.unwrap();

    let referrer = User::find_by_id(referrer_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(referrer.referral_bonus, 7);
    let second = User::find_by_id(second_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(second.referred_by, Some(referrer_id));
}

#[tokio::test]
async fn unknown_referral_code_is_ignored() {
    let app = common::spawn_app().await;

    let resp = common::discord_login(&app, "2101", "dave", Some("NOPE1234")).await;
    assert_eq!(common::location(&resp), "http://fivehub.test/dashboard");
}

#[tokio::test]
async fn closed_registration_blocks_new_accounts_only() {
    let app = common::spawn_app().await;
    let existing = common::login_token(&app, "3001", "early").await;

    let (admin_id, admin_token) = common::create_test_user(&app, "admin").await;
    common::make_admin(&app.db, admin_id).await;
    let resp = app
        .client
        .post(app.url("/admin/config"))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "registration_enabled": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = common::discord_login(&app, "3002", "late", None).await;
    assert_eq!(
        common::location(&resp),
        "http://fivehub.test/?error=registration_disabled"
    );

    let again = common::login_token(&app, "3001", "early").await;
    assert_ne!(again, existing);
}

#[tokio::test]
async fn bootstrap_admin_is_created_as_admin_even_when_registration_closed() {
    let app = common::spawn_app_with(BootstrapAdminConfig::parse("4001, 4002")).await;

    let (admin_id, admin_token) = common::create_test_user(&app, "admin").await;
    common::make_admin(&app.db, admin_id).await;
    app.client
        .post(app.url("/admin/config"))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "registration_enabled": "false" }))
        .send()
        .await
        .unwrap();

    let token = common::login_token(&app, "4001", "owner").await;
    let body: Value = me(&app, &token).await.json().await.unwrap();
    assert_eq!(body["data"]["user"]["role"], "admin");
}

#[tokio::test]
async fn banned_user_cannot_sign_in_or_use_old_session() {
    let app = common::spawn_app().await;
    let token = common::login_token(&app, "5001", "rowdy").await;
    let body: Value = me(&app, &token).await.json().await.unwrap();
    let user_id = body["data"]["user"]["id"].as_i64().unwrap();

    let (admin_id, admin_token) = common::create_test_user(&app, "admin").await;
    common::make_admin(&app.db, admin_id).await;
    let resp = app
        .client
        .patch(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "status": "banned" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    assert_eq!(me(&app, &token).await.status(), 401);

    let resp = common::discord_login(&app, "5001", "rowdy", None).await;
    assert_eq!(common::location(&resp), "http://fivehub.test/?error=banned");
    assert!(common::set_cookie_value(&resp, "session").is_none());
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = common::spawn_app().await;
    let token = common::login_token(&app, "6001", "leaver").await;
    assert_eq!(me(&app, &token).await.status(), 200);

    let resp = app
        .client
        .get(app.url("/auth/logout"))
        .header(reqwest::header::COOKIE, format!("session={}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(common::location(&resp), "http://fivehub.test/");

    assert_eq!(me(&app, &token).await.status(), 401);
}

#[tokio::test]
async fn me_requires_a_session() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth("not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
