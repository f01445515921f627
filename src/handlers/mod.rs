pub mod admin;
pub mod auth;
pub mod comment;
pub mod favorite;
pub mod leaderboard;
pub mod page;
pub mod rating;
pub mod resource;
pub mod ticket;
pub mod user;

pub use auth::*;
