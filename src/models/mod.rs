pub mod comment;
pub mod download;
pub mod favorite;
pub mod page;
pub mod rating;
pub mod resource;
pub mod session;
pub mod site_config;
pub mod ticket;
pub mod ticket_message;
pub mod user;

pub use comment::{Entity as Comment, Model as CommentModel};
pub use download::Entity as Download;
pub use favorite::Entity as Favorite;
pub use page::{Entity as Page, Model as PageModel};
pub use rating::{Entity as Rating, Model as RatingModel};
pub use resource::{
    Entity as Resource, Model as ResourceModel, ResourceCategory, ResourceStatus,
};
pub use session::Entity as Session;
pub use site_config::Entity as SiteConfig;
pub use ticket::{
    Entity as Ticket, Model as TicketModel, TicketCategory, TicketPriority, TicketStatus,
};
pub use ticket_message::{Entity as TicketMessage, Model as TicketMessageModel};
pub use user::{Entity as User, Model as UserModel, Role, UserStatus};
