mod common;

use fivehub::models::{user, ResourceStatus, User};
use reqwest::multipart::{Form, Part};
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::Value;

async fn set_quota_usage(
    db: &DatabaseConnection,
    user_id: i32,
    limit: i32,
    bonus: i32,
    today: i32,
    last_reset: chrono::NaiveDate,
) {
    User::update_many()
        .col_expr(user::Column::DownloadLimit, Expr::value(limit))
        .col_expr(user::Column::ReferralBonus, Expr::value(bonus))
        .col_expr(user::Column::DownloadsToday, Expr::value(today))
        .col_expr(user::Column::LastDownloadReset, Expr::value(last_reset))
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await
        .unwrap();
}

#[tokio::test]
async fn catalogue_lists_only_approved_resources() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;

    let (visible_id, _) = common::create_approved_resource(&app, author_id, "Garage Script").await;
    let (hidden_id, _) = common::create_approved_resource(&app, author_id, "Hidden Map").await;
    common::set_resource_status(&app.db, hidden_id, ResourceStatus::Pending).await;

    let resp = app.client.get(app.url("/resources")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], visible_id);
    assert_eq!(items[0]["author"]["id"], author_id);
    assert_eq!(items[0]["tags"][0], "esx");
    assert_eq!(body["data"]["total"], 1);

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}", hidden_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn catalogue_filters_by_search_and_category() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    common::create_approved_resource(&app, author_id, "Police Garage").await;
    common::create_approved_resource(&app, author_id, "Drift Handling").await;

    let body: Value = app
        .client
        .get(app.url("/resources?search=Garage"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["title"], "Police Garage");

    let body: Value = app
        .client
        .get(app.url("/resources?category=mapping"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 0);

    let resp = app
        .client
        .get(app.url("/resources?category=spaceship"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn detail_by_slug_renders_markdown_and_counts_views() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, slug) = common::create_approved_resource(&app, author_id, "Loading Screen").await;

    let body: Value = app
        .client
        .get(app.url(&format!("/resources/{}", slug)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["view_count"], 1);
    assert!(body["data"]["long_description_html"]
        .as_str()
        .unwrap()
        .contains("<h1>"));

    let body: Value = app
        .client
        .get(app.url(&format!("/resources/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["view_count"], 2);
}

#[tokio::test]
async fn download_consumes_quota_until_exhausted() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "Quota Pack").await;

    let (user_id, token) = common::create_test_user(&app, "downloader").await;
    common::set_download_limit(&app.db, user_id, 2).await;

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-downloads-remaining"], "1");
    assert_eq!(resp.headers()["content-type"], "application/octet-stream");
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment;"));
    let bytes = resp.bytes().await.unwrap();
    assert!(bytes.starts_with(b"PK\x03\x04"));

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-downloads-remaining"], "0");

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");

    let body: Value = app
        .client
        .get(app.url(&format!("/resources/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["download_count"], 2);

    let body: Value = app
        .client
        .get(app.url("/user/downloads"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn download_requires_a_session_and_a_visible_resource() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "Pending Pack").await;
    common::set_resource_status(&app.db, id, ResourceStatus::Pending).await;

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let (_, token) = common::create_test_user(&app, "downloader").await;
    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["quota"]["used"], 0);
}

#[tokio::test]
async fn missing_archive_does_not_cost_a_download() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, slug) = common::create_approved_resource(&app, author_id, "Lost File").await;
    std::fs::remove_file(
        std::path::Path::new(&app.upload.archive_dir).join(format!("{}.zip", slug)),
    )
    .unwrap();

    let (_, token) = common::create_test_user(&app, "downloader").await;
    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["quota"]["used"], 0);
}

fn upload_form(title: &str, file_name: &str, data: &'static [u8]) -> Form {
    Form::new()
        .text("title", title.to_string())
        .text("description", "A short description")
        .text("longDescription", "## Usage\n\nStart it.")
        .text("category", "script")
        .text("version", "2.1.0")
        .text("tags", "esx, qbcore")
        .part(
            "resourceFile",
            Part::bytes(data).file_name(file_name.to_string()),
        )
}

#[tokio::test]
async fn upload_goes_to_moderation_queue() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_test_user(&app, "uploader").await;

    let resp = app
        .client
        .post(app.url("/resources"))
        .bearer_auth(&token)
        .multipart(upload_form("My Garage", "garage.zip", b"PK\x03\x04data"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let slug = body["data"]["slug"].as_str().unwrap().to_string();
    assert!(slug.starts_with("my-garage-"));
    assert_eq!(body["data"]["resource"]["status"], "pending");
    assert_eq!(body["data"]["resource"]["version"], "2.1.0");
    assert_eq!(body["data"]["resource"]["tags"][1], "qbcore");

    let stored = std::path::Path::new(&app.upload.archive_dir).join(format!("{}.zip", slug));
    assert!(stored.exists());

    // Pending uploads stay out of the catalogue but show on the dashboard.
    let body: Value = app
        .client
        .get(app.url("/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 0);

    let body: Value = app
        .client
        .get(app.url("/user/uploads"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn upload_rejects_bad_archives_and_missing_fields() {
    let app = common::spawn_app().await;
    let (_, token) = common::create_test_user(&app, "uploader").await;

    let resp = app
        .client
        .post(app.url("/resources"))
        .bearer_auth(&token)
        .multipart(upload_form("Virus", "setup.exe", b"MZ\x90\x00"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/resources"))
        .bearer_auth(&token)
        .multipart(upload_form("Fake Zip", "fake.zip", b"not a zip"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let form = Form::new()
        .text("description", "No title")
        .text("category", "script")
        .part("resourceFile", Part::bytes(&b"PK\x03\x04"[..]).file_name("a.zip"));
    let resp = app
        .client
        .post(app.url("/resources"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .post(app.url("/resources"))
        .multipart(upload_form("Anon", "anon.zip", b"PK\x03\x04"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn auto_approve_publishes_uploads() {
    let app = common::spawn_app().await;
    let (admin_id, admin_token) = common::create_test_user(&app, "admin").await;
    common::make_admin(&app.db, admin_id).await;
    app.client
        .post(app.url("/admin/config"))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({ "auto_approve_resources": true }))
        .send()
        .await
        .unwrap();

    let (_, token) = common::create_test_user(&app, "uploader").await;
    let body: Value = app
        .client
        .post(app.url("/resources"))
        .bearer_auth(&token)
        .multipart(upload_form("Instant", "instant.zip", b"PK\x03\x04"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["resource"]["status"], "approved");
}

#[tokio::test]
async fn only_owner_or_staff_can_delete() {
    let app = common::spawn_app().await;
    let (author_id, author_token) = common::create_test_user(&app, "author").await;
    let (_, other_token) = common::create_test_user(&app, "other").await;
    let (id, slug) = common::create_approved_resource(&app, author_id, "Deletable").await;

    let resp = app
        .client
        .delete(app.url(&format!("/resources/{}", id)))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .client
        .delete(app.url(&format!("/resources/{}", id)))
        .bearer_auth(&author_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let archive = std::path::Path::new(&app.upload.archive_dir).join(format!("{}.zip", slug));
    assert!(!archive.exists());

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn user_stats_report_totals_and_quota() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "Counted").await;
    let (user_id, token) = common::create_test_user(&app, "counter").await;
    common::set_download_limit(&app.db, user_id, 3).await;

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = app
        .client
        .get(app.url("/user/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let stats = &body["data"];
    assert_eq!(stats["total_downloads"], 1);
    assert_eq!(stats["total_uploads"], 0);
    assert_eq!(stats["referrals_count"], 0);
    assert_eq!(stats["quota"]["used"], 1);
    assert_eq!(stats["quota"]["total_limit"], 3);
    assert_eq!(stats["quota"]["remaining"], 2);
    assert_eq!(stats["quota"]["allowed"], true);
}

#[tokio::test]
async fn stale_counter_resets_on_the_next_download() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "New Day Pack").await;
    let (user_id, token) = common::create_test_user(&app, "returning").await;

    let today = chrono::Utc::now().date_naive();
    let yesterday = today - chrono::Duration::days(1);
    // Yesterday's quota was used up completely.
    set_quota_usage(&app.db, user_id, 10, 0, 10, yesterday).await;

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-downloads-remaining"], "9");

    let stored = User::find_by_id(user_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(stored.downloads_today, 1);
    assert_eq!(stored.last_download_reset, today);
}

#[tokio::test]
async fn referral_bonus_extends_the_daily_limit() {
    let app = common::spawn_app().await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "Bonus Pack").await;
    let (user_id, token) = common::create_test_user(&app, "referrer").await;

    let today = chrono::Utc::now().date_naive();
    set_quota_usage(&app.db, user_id, 10, 5, 14, today).await;

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["x-downloads-remaining"], "0");

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}/download", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");

    let stored = User::find_by_id(user_id).one(&app.db).await.unwrap().unwrap();
    assert_eq!(stored.downloads_today, 15);
}
