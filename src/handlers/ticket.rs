use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{
    TicketCategory, TicketMessageModel, TicketModel, TicketPriority, TicketStatus, UserModel,
};
use crate::response::ApiResponse;
use crate::services::ticket::{NewTicket, TicketService, TicketSummary, TicketUpdate};
use axum::{extract::Path, response::IntoResponse, Extension, Json};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    #[validate(length(min = 3, max = 200))]
    pub subject: String,
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: Option<TicketPriority>,
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(alias = "resource_slug")]
    pub resource_slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateTicketRequest {
    #[validate(length(min = 1))]
    pub message: Option<String>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketResponse {
    pub id: i32,
    pub user_id: i32,
    pub username: Option<String>,
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub resource_slug: Option<String>,
    pub messages_count: Option<u64>,
    pub created_at: String,
    pub updated_at: String,
}

impl TicketResponse {
    fn build(ticket: TicketModel, owner: Option<&UserModel>, messages_count: Option<u64>) -> Self {
        Self {
            id: ticket.id,
            user_id: ticket.user_id,
            username: owner.map(|u| u.username.clone()),
            subject: ticket.subject,
            category: ticket.category,
            priority: ticket.priority,
            status: ticket.status,
            resource_slug: ticket.resource_slug,
            messages_count,
            created_at: ticket.created_at.to_string(),
            updated_at: ticket.updated_at.to_string(),
        }
    }
}

impl From<TicketSummary> for TicketResponse {
    fn from(summary: TicketSummary) -> Self {
        Self::build(
            summary.ticket,
            summary.owner.as_ref(),
            Some(summary.messages_count),
        )
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketMessageResponse {
    pub id: i32,
    pub user_id: i32,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub message: String,
    pub is_staff: bool,
    pub created_at: String,
}

impl TicketMessageResponse {
    fn build(message: TicketMessageModel, author: Option<&UserModel>) -> Self {
        Self {
            id: message.id,
            user_id: message.user_id,
            username: author.map(|u| u.username.clone()),
            avatar: author.and_then(|u| u.avatar.clone()),
            message: message.message,
            is_staff: message.is_staff,
            created_at: message.created_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketDetailResponse {
    pub ticket: TicketResponse,
    pub messages: Vec<TicketMessageResponse>,
}

#[utoipa::path(
    get,
    path = "/api/tickets",
    security(("session" = [])),
    responses(
        (status = 200, description = "Own tickets, or the whole queue for staff", body = Vec<TicketResponse>),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "tickets"
)]
pub async fn list_tickets(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let tickets = TicketService::new(db).list(&auth_user.actor()).await?;
    let items: Vec<TicketResponse> = tickets.into_iter().map(TicketResponse::from).collect();
    Ok(ApiResponse::ok(items))
}

#[utoipa::path(
    post,
    path = "/api/tickets",
    security(("session" = [])),
    request_body = CreateTicketRequest,
    responses(
        (status = 200, description = "Ticket opened", body = TicketResponse),
        (status = 400, description = "Validation error", body = AppError),
        (status = 401, description = "Unauthorized", body = AppError),
    ),
    tag = "tickets"
)]
pub async fn create_ticket(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Json(payload): Json<CreateTicketRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let ticket = TicketService::new(db)
        .create(
            &auth_user.actor(),
            NewTicket {
                subject: payload.subject,
                category: payload.category,
                priority: payload.priority.unwrap_or(TicketPriority::Medium),
                message: payload.message,
                resource_slug: payload.resource_slug,
            },
        )
        .await?;

    Ok(ApiResponse::with_message(
        TicketResponse::build(ticket, None, Some(1)),
        "Ticket created",
    ))
}

#[utoipa::path(
    get,
    path = "/api/tickets/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket with its messages", body = TicketDetailResponse),
        (status = 403, description = "Not the owner", body = AppError),
        (status = 404, description = "Ticket not found", body = AppError),
    ),
    tag = "tickets"
)]
pub async fn get_ticket(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let detail = TicketService::new(db).get(&auth_user.actor(), id).await?;
    let count = detail.messages.len() as u64;

    Ok(ApiResponse::ok(TicketDetailResponse {
        ticket: TicketResponse::build(detail.ticket, detail.owner.as_ref(), Some(count)),
        messages: detail
            .messages
            .into_iter()
            .map(|(m, u)| TicketMessageResponse::build(m, u.as_ref()))
            .collect(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/tickets/{id}",
    security(("session" = [])),
    params(("id" = i32, Path, description = "Ticket ID")),
    request_body = UpdateTicketRequest,
    responses(
        (status = 200, description = "Reply added and/or status changed", body = TicketResponse),
        (status = 400, description = "Neither message nor status given", body = AppError),
        (status = 403, description = "Not the owner, or status change by non-staff", body = AppError),
        (status = 404, description = "Ticket not found", body = AppError),
    ),
    tag = "tickets"
)]
pub async fn update_ticket(
    Extension(db): Extension<DatabaseConnection>,
    auth_user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTicketRequest>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let ticket = TicketService::new(db)
        .update(
            &auth_user.actor(),
            id,
            TicketUpdate {
                message: payload.message,
                status: payload.status,
            },
        )
        .await?;

    Ok(ApiResponse::ok(TicketResponse::build(ticket, None, None)))
}
