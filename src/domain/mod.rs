pub mod item;
pub mod pkce;
pub mod session;
pub mod token_set;
pub mod user;
