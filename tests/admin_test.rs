mod common;

use fivehub::models::{ResourceStatus, Role};
use serde_json::{json, Value};

async fn admin(app: &common::TestApp) -> (i32, String) {
    let (id, token) = common::create_test_user(app, "admin").await;
    common::make_admin(&app.db, id).await;
    (id, token)
}

#[tokio::test]
async fn stats_count_users_resources_and_tickets() {
    let app = common::spawn_app().await;
    let (_, admin_token) = admin(&app).await;
    let (author_id, author_token) = common::create_test_user(&app, "author").await;
    common::create_approved_resource(&app, author_id, "Live").await;
    let (pending, _) = common::create_approved_resource(&app, author_id, "Queued").await;
    common::set_resource_status(&app.db, pending, ResourceStatus::Pending).await;

    app.client
        .post(app.url("/tickets"))
        .bearer_auth(&author_token)
        .json(&json!({ "subject": "Question", "category": "other", "message": "Hello" }))
        .send()
        .await
        .unwrap();

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&admin_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let stats = &body["data"];
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["banned_users"], 0);
    assert_eq!(stats["total_resources"], 2);
    assert_eq!(stats["pending_resources"], 1);
    assert_eq!(stats["total_downloads"], 0);
    assert_eq!(stats["open_tickets"], 1);
}

#[tokio::test]
async fn dashboard_is_staff_only() {
    let app = common::spawn_app().await;
    let (_, user_token) = common::create_test_user(&app, "user").await;
    let (mod_id, mod_token) = common::create_test_user(&app, "mod").await;
    common::make_role(&app.db, mod_id, Role::Moderator).await;

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Moderators see the dashboard but not the user list or config.
    for path in ["/admin/users", "/admin/config"] {
        let resp = app
            .client
            .get(app.url(path))
            .bearer_auth(&mod_token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 403, "{}", path);
    }
}

#[tokio::test]
async fn config_defaults_and_updates_are_typed() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;

    let body: Value = app
        .client
        .get(app.url("/admin/config"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["default_download_limit"], 10);
    assert_eq!(body["data"]["registration_enabled"], true);
    assert_eq!(body["data"]["allowed_file_types"], ".zip,.rar,.7z");

    let resp = app
        .client
        .post(app.url("/admin/config"))
        .bearer_auth(&token)
        .json(&json!({ "default_download_limit": 25, "maintenance_mode": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["updated"], 2);
    assert_eq!(body["data"]["config"]["default_download_limit"], 25);
    assert_eq!(body["data"]["config"]["maintenance_mode"], true);

    // New accounts pick up the stored default.
    let token = common::login_token(&app, "5551", "newcomer").await;
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
    assert_eq!(body["data"]["user"]["download_limit"], 25);
}

#[tokio::test]
async fn config_rejects_non_objects_and_bad_keys() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;

    for payload in [json!([1, 2]), json!({}), json!({ "Bad Key": 1 })] {
        let resp = app
            .client
            .post(app.url("/admin/config"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", payload);
    }
}

#[tokio::test]
async fn list_users_filters_by_search_and_role() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;
    let (mod_id, _) = common::create_test_user(&app, "helper").await;
    common::make_role(&app.db, mod_id, Role::Moderator).await;
    common::create_test_user(&app, "zebra").await;

    let body: Value = app
        .client
        .get(app.url("/admin/users?search=zebra"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert!(body["data"]["items"][0]["username"]
        .as_str()
        .unwrap()
        .starts_with("zebra"));

    let body: Value = app
        .client
        .get(app.url("/admin/users?role=moderator"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], mod_id);

    let body: Value = app
        .client
        .get(app.url("/admin/users?role=all&status=all"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 3);

    let resp = app
        .client
        .get(app.url("/admin/users?role=wizard"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn admin_updates_role_and_limit() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;
    let (user_id, _) = common::create_test_user(&app, "user").await;

    let resp = app
        .client
        .patch(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&token)
        .json(&json!({ "role": "moderator", "downloadLimit": 40 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["role"], "moderator");
    assert_eq!(body["data"]["download_limit"], 40);

    let resp = app
        .client
        .patch(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = app
        .client
        .patch(app.url("/admin/users/424242"))
        .bearer_auth(&token)
        .json(&json!({ "downloadLimit": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn banning_revokes_sessions() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;
    let (user_id, user_token) = common::create_test_user(&app, "troll").await;

    let resp = app
        .client
        .patch(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&token)
        .json(&json!({ "status": "banned" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn admin_cannot_ban_demote_or_delete_self() {
    let app = common::spawn_app().await;
    let (admin_id, token) = admin(&app).await;

    for payload in [json!({ "status": "banned" }), json!({ "role": "user" })] {
        let resp = app
            .client
            .patch(app.url(&format!("/admin/users/{}", admin_id)))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", payload);
    }

    let resp = app
        .client
        .delete(app.url(&format!("/admin/users/{}", admin_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn deleting_user_removes_their_uploads() {
    let app = common::spawn_app().await;
    let (_, token) = admin(&app).await;
    let (user_id, _) = common::create_test_user(&app, "leaver").await;
    let (resource_id, slug) = common::create_approved_resource(&app, user_id, "Orphan").await;
    let archive = std::path::Path::new(&app.upload.archive_dir).join(format!("{}.zip", slug));
    assert!(archive.exists());

    let resp = app
        .client
        .delete(app.url(&format!("/admin/users/{}", user_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!archive.exists());

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}", resource_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn moderation_queue_and_approval() {
    let app = common::spawn_app().await;
    let (mod_id, mod_token) = common::create_test_user(&app, "mod").await;
    common::make_role(&app.db, mod_id, Role::Moderator).await;
    let (author_id, _) = common::create_test_user(&app, "author").await;
    common::create_approved_resource(&app, author_id, "Already live").await;
    let (pending, _) = common::create_approved_resource(&app, author_id, "Needs review").await;
    common::set_resource_status(&app.db, pending, ResourceStatus::Pending).await;

    let body: Value = app
        .client
        .get(app.url("/admin/resources"))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], pending);

    let body: Value = app
        .client
        .get(app.url("/admin/resources?status=all"))
        .bearer_auth(&mod_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["total"], 2);

    let resp = app
        .client
        .patch(app.url(&format!("/admin/resources/{}", pending)))
        .bearer_auth(&mod_token)
        .json(&json!({ "status": "approved", "isFeatured": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["is_featured"], true);

    let resp = app
        .client
        .get(app.url(&format!("/resources/{}", pending)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = app
        .client
        .patch(app.url(&format!("/admin/resources/{}", pending)))
        .bearer_auth(&mod_token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn regular_user_cannot_moderate() {
    let app = common::spawn_app().await;
    let (author_id, token) = common::create_test_user(&app, "author").await;
    let (id, _) = common::create_approved_resource(&app, author_id, "Mine").await;

    let resp = app
        .client
        .patch(app.url(&format!("/admin/resources/{}", id)))
        .bearer_auth(&token)
        .json(&json!({ "isFeatured": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}
