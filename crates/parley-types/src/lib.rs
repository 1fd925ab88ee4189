pub mod events;
pub mod models;

pub use events::{ClientEvent, ServerEvent};
pub use models::ChatMessage;
