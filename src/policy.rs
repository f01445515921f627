//! The single authorization predicate used by every handler.

use crate::error::{AppError, AppResult};
use crate::models::Role;

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub role: Role,
}

impl Actor {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What they want to do. Variants that touch an owned row carry the owner's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DeleteComment { author_id: i32 },
    DeleteResource { author_id: i32 },
    ViewTicket { owner_id: i32 },
    ReplyTicket { owner_id: i32 },
    SetTicketStatus,
    ListAllTickets,
    ModerateResources,
    ViewDashboard,
    ManageUsers,
    ManagePages,
    ManageSiteConfig,
}

pub fn can(actor: &Actor, action: Action) -> bool {
    match action {
        Action::DeleteComment { author_id } => actor.user_id == author_id || actor.is_admin(),
        Action::DeleteResource { author_id } => actor.user_id == author_id || actor.is_staff(),
        Action::ViewTicket { owner_id } | Action::ReplyTicket { owner_id } => {
            actor.user_id == owner_id || actor.is_staff()
        }
        Action::SetTicketStatus
        | Action::ListAllTickets
        | Action::ModerateResources
        | Action::ViewDashboard => actor.is_staff(),
        Action::ManageUsers | Action::ManagePages | Action::ManageSiteConfig => actor.is_admin(),
    }
}

pub fn authorize(actor: &Actor, action: Action) -> AppResult<()> {
    if can(actor, action) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
