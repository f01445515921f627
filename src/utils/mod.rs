pub mod cookie;
pub mod markdown;
pub mod oauth_state;
pub mod slug;
pub mod token;

pub use markdown::render_markdown;
pub use slug::{resource_slug, slugify};
pub use token::{generate_referral_code, generate_session_token, hash_token};
