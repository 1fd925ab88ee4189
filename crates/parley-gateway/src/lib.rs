pub mod connection;
pub mod dispatcher;
pub mod history;
pub mod service;

pub use dispatcher::Dispatcher;
pub use history::HISTORY_LIMIT;
pub use service::{ChatService, SubmitError};
