pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod rooms;

pub use dispatcher::Dispatcher;
pub use rooms::RoomKey;

/// Identifies one live transport session. Never persisted.
pub type ConnId = uuid::Uuid;
