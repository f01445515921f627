use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{CommentModel, UserModel};
use crate::response::ApiResponse;
use crate::services::comment::CommentService;
use crate::utils::render_markdown;
use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[serde(alias = "parent_id")]
    pub parent_id: Option<i32>,
    /// Same bound as `services::comment::MAX_COMMENT_CHARS`.
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCommentQuery {
    #[serde(alias = "comment_id")]
    pub comment_id: i32,
}

#[derive(Debug, Serialize, Clone)]
pub struct CommentTreeNode {
    pub id: i32,
    pub resource_id: i32,
    pub user_id: i32,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub parent_id: Option<i32>,
    pub content: String,
    pub content_html: String,
    pub created_at: String,
    pub updated_at: String,
    pub children: Vec<CommentTreeNode>,
}

impl utoipa::ToSchema for CommentTreeNode {
    fn name() -> std::borrow::Cow<'static, str> {
        "CommentTreeNode".into()
    }
}

impl utoipa::PartialSchema for CommentTreeNode {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
        utoipa::openapi::RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::Object)
                .property("id", i32::schema())
                .property("resource_id", i32::schema())
                .property("user_id", i32::schema())
                .property("username", Option::<String>::schema())
                .property("avatar", Option::<String>::schema())
                .property("parent_id", Option::<i32>::schema())
                .property("content", String::schema())
                .property("content_html", String::schema())
                .property("created_at", String::schema())
                .property("updated_at", String::schema())
                .property("children", utoipa::openapi::schema::ArrayBuilder::new()
                    .items(utoipa::openapi::Ref::from_schema_name("CommentTreeNode"))
                    .build())
                .required("id")
                .required("resource_id")
                .required("user_id")
                .required("content")
                .required("content_html")
                .required("created_at")
                .required("updated_at")
                .required("children")
                .build(),
        ))
    }
}

impl CommentTreeNode {
    fn build(c: CommentModel, author: Option<&UserModel>) -> Self {
        let content_html = render_markdown(&c.content);
        Self {
            id: c.id,
            resource_id: c.resource_id,
            user_id: c.user_id,
            username: author.map(|u| u.username.clone()),
            avatar: author.and_then(|u| u.avatar.clone()),
            parent_id: c.parent_id,
            content: c.content,
            content_html,
            created_at: c.created_at.to_string(),
            updated_at: c.updated_at.to_string(),
            children: Vec::new(),
        }
    }
}

fn build_comment_tree(comments: Vec<(CommentModel, Option<UserModel>)>) -> Vec<CommentTreeNode> {
    let mut nodes: HashMap<i32, CommentTreeNode> = HashMap::new();
    let mut children_map: HashMap<Option<i32>, Vec<i32>> = HashMap::new();

    for (comment, _) in &comments {
        children_map
            .entry(comment.parent_id)
            .or_default()
            .push(comment.id);
    }
    for (comment, author) in comments {
        let id = comment.id;
        nodes.insert(id, CommentTreeNode::build(comment, author.as_ref()));
    }

    fn attach_children(
        node_id: i32,
        nodes: &mut HashMap<i32, CommentTreeNode>,
        children_map: &HashMap<Option<i32>, Vec<i32>>,
    ) -> Option<CommentTreeNode> {
        let mut node = nodes.remove(&node_id)?;
        if let Some(child_ids) = children_map.get(&Some(node_id)) {
            for &child_id in child_ids {
                if nodes.contains_key(&child_id) {
                    if let Some(child) = attach_children(child_id, nodes, children_map) {
                        node.children.push(child);
                    }
                }
            }
        }
        Some(node)
    }

    let root_ids = children_map.get(&None).cloned().unwrap_or_default();
    root_ids
        .into_iter()
        .filter_map(|id| attach_children(id, &mut nodes, &children_map))
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/resources/{id}/comments",
    params(("id" = i32, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Comment tree", body = Vec<CommentTreeNode>),
    ),
    tag = "comments"
)]
pub async fn list_comments(
    Extension(db): Extension<DatabaseConnection>,
    Path(resource_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let service = CommentService::new(db);
    let comments = service.list_by_resource(resource_id).await?;
    let tree = build_comment_tree(comments);
    Ok(ApiResponse::ok(tree))
}

#[utoipa::path(
    post,
    path = "/api/resources/{id}/comments",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Resource ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Comment created", body = CommentTreeNode),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "comments"
)]
pub async fn create_comment(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(resource_id): Path<i32>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let comment = CommentService::new(db)
        .create(
            resource_id,
            auth_user.user_id,
            payload.parent_id,
            &payload.content,
        )
        .await?;

    Ok(ApiResponse::ok(CommentTreeNode::build(comment, None)))
}

#[utoipa::path(
    delete,
    path = "/api/resources/{id}/comments",
    security(("session" = [])),
    params(
        ("id" = i32, Path, description = "Resource ID"),
        DeleteCommentQuery,
    ),
    responses(
        (status = 200, description = "Comment deleted", body = String),
        (status = 401, description = "Unauthorized", body = AppError),
        (status = 403, description = "Neither author nor admin", body = AppError),
        (status = 404, description = "Comment not found", body = AppError),
    ),
    tag = "comments"
)]
pub async fn delete_comment(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(resource_id): Path<i32>,
    Query(query): Query<DeleteCommentQuery>,
) -> AppResult<impl IntoResponse> {
    CommentService::new(db)
        .delete(&auth_user.actor(), resource_id, query.comment_id)
        .await?;

    Ok(ApiResponse::ok("Comment deleted"))
}
