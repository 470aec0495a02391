pub mod comments;
pub mod error;
pub mod likes;
pub mod messages;
pub mod routes;
pub mod state;
