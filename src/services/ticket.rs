use crate::{
    error::{AppError, AppResult},
    models::{
        ticket, ticket_message, Ticket, TicketCategory, TicketMessage, TicketMessageModel,
        TicketModel, TicketPriority, TicketStatus, User, UserModel,
    },
    policy::{authorize, can, Action, Actor},
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::HashMap;

pub const MAX_MESSAGE_CHARS: usize = 5000;

/// A staff reply picks up an open ticket; every other reply leaves the status alone.
pub fn status_after_reply(current: TicketStatus, is_staff: bool) -> TicketStatus {
    match current {
        TicketStatus::Open if is_staff => TicketStatus::InProgress,
        other => other,
    }
}

/// Staff queue order: live statuses first, then higher priority, then most recently touched.
pub fn sort_staff_queue(tickets: &mut [TicketSummary]) {
    tickets.sort_by(|a, b| {
        a.ticket
            .status
            .queue_rank()
            .cmp(&b.ticket.status.queue_rank())
            .then_with(|| b.ticket.priority.weight().cmp(&a.ticket.priority.weight()))
            .then_with(|| b.ticket.updated_at.cmp(&a.ticket.updated_at))
    });
}

fn normalize_message(raw: &str) -> AppResult<String> {
    let message = raw.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "Message cannot exceed {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message.to_string())
}

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub subject: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub message: String,
    pub resource_slug: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketUpdate {
    pub message: Option<String>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Clone)]
pub struct TicketSummary {
    pub ticket: TicketModel,
    pub owner: Option<UserModel>,
    pub messages_count: u64,
}

pub struct TicketDetail {
    pub ticket: TicketModel,
    pub owner: Option<UserModel>,
    pub messages: Vec<(TicketMessageModel, Option<UserModel>)>,
}

pub struct TicketService {
    db: DatabaseConnection,
}

impl TicketService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Opens a ticket together with its first message.
    pub async fn create(&self, actor: &Actor, new: NewTicket) -> AppResult<TicketModel> {
        let subject = new.subject.trim().to_string();
        if subject.is_empty() {
            return Err(AppError::Validation("Subject is required".to_string()));
        }
        let message = normalize_message(&new.message)?;
        let resource_slug = new
            .resource_slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let now = chrono::Utc::now().naive_utc();

        let txn = self.db.begin().await?;
        let created = ticket::ActiveModel {
            user_id: Set(actor.user_id),
            subject: Set(subject),
            category: Set(new.category),
            priority: Set(new.priority),
            status: Set(TicketStatus::Open),
            resource_slug: Set(resource_slug),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        insert_message(&txn, created.id, actor, message, now).await?;
        txn.commit().await?;

        tracing::info!(ticket_id = created.id, user_id = actor.user_id, "Ticket opened");
        Ok(created)
    }

    /// Staff see every ticket in queue order; everyone else sees their own, newest activity first.
    pub async fn list(&self, actor: &Actor) -> AppResult<Vec<TicketSummary>> {
        let staff_view = can(actor, Action::ListAllTickets);

        let mut select = Ticket::find().order_by_desc(ticket::Column::UpdatedAt);
        if !staff_view {
            select = select.filter(ticket::Column::UserId.eq(actor.user_id));
        }
        let rows = select.find_also_related(User).all(&self.db).await?;

        let mut summaries = Vec::with_capacity(rows.len());
        let counts = self.message_counts(rows.iter().map(|(t, _)| t.id).collect()).await?;
        for (ticket, owner) in rows {
            summaries.push(TicketSummary {
                messages_count: counts.get(&ticket.id).copied().unwrap_or(0),
                ticket,
                owner,
            });
        }

        if staff_view {
            sort_staff_queue(&mut summaries);
        }
        Ok(summaries)
    }

    pub async fn get(&self, actor: &Actor, id: i32) -> AppResult<TicketDetail> {
        let (ticket, owner) = Ticket::find_by_id(id)
            .find_also_related(User)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        authorize(
            actor,
            Action::ViewTicket {
                owner_id: ticket.user_id,
            },
        )?;

        let messages = TicketMessage::find()
            .filter(ticket_message::Column::TicketId.eq(id))
            .order_by_asc(ticket_message::Column::CreatedAt)
            .order_by_asc(ticket_message::Column::Id)
            .find_also_related(User)
            .all(&self.db)
            .await?;

        Ok(TicketDetail {
            ticket,
            owner,
            messages,
        })
    }

    /// Appends a reply and/or changes the status.
    ///
    /// Only staff may set a status. A staff reply to an open ticket moves it to
    /// `in_progress`; an explicit status in the same request wins.
    pub async fn update(&self, actor: &Actor, id: i32, update: TicketUpdate) -> AppResult<TicketModel> {
        let message = update.message.as_deref().map(normalize_message).transpose()?;
        if message.is_none() && update.status.is_none() {
            return Err(AppError::Validation(
                "Provide a message or a status".to_string(),
            ));
        }

        let existing = Ticket::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        authorize(
            actor,
            Action::ReplyTicket {
                owner_id: existing.user_id,
            },
        )?;
        if update.status.is_some() {
            authorize(actor, Action::SetTicketStatus)?;
        }

        let now = chrono::Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        if let Some(message) = message {
            insert_message(&txn, id, actor, message, now).await?;

            let next = status_after_reply(existing.status, actor.is_staff());
            if next != existing.status && update.status.is_none() {
                // Conditional so a concurrent status change is not overwritten.
                Ticket::update_many()
                    .col_expr(ticket::Column::Status, Expr::value(next))
                    .filter(ticket::Column::Id.eq(id))
                    .filter(ticket::Column::Status.eq(existing.status))
                    .exec(&txn)
                    .await?;
            }
        }

        if let Some(status) = update.status {
            Ticket::update_many()
                .col_expr(ticket::Column::Status, Expr::value(status))
                .filter(ticket::Column::Id.eq(id))
                .exec(&txn)
                .await?;
        }

        Ticket::update_many()
            .col_expr(ticket::Column::UpdatedAt, Expr::value(now))
            .filter(ticket::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        let updated = Ticket::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        txn.commit().await?;

        Ok(updated)
    }

    async fn message_counts(&self, ticket_ids: Vec<i32>) -> AppResult<HashMap<i32, u64>> {
        let mut counts = HashMap::new();
        for id in ticket_ids {
            let count = TicketMessage::find()
                .filter(ticket_message::Column::TicketId.eq(id))
                .count(&self.db)
                .await?;
            counts.insert(id, count);
        }
        Ok(counts)
    }
}

async fn insert_message<C: ConnectionTrait>(
    conn: &C,
    ticket_id: i32,
    actor: &Actor,
    message: String,
    now: chrono::NaiveDateTime,
) -> AppResult<TicketMessageModel> {
    Ok(ticket_message::ActiveModel {
        ticket_id: Set(ticket_id),
        user_id: Set(actor.user_id),
        message: Set(message),
        is_staff: Set(actor.is_staff()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?)
}
