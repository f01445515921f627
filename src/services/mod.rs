pub mod admin;
pub mod bootstrap_admin;
pub mod cache;
pub mod comment;
pub mod discord;
pub mod favorite;
pub mod leaderboard;
pub mod page;
pub mod quota;
pub mod rating;
pub mod referral;
pub mod resource;
pub mod session;
pub mod site_config;
pub mod ticket;
pub mod upload;
pub mod user;
pub mod webhook;
