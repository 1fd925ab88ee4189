pub mod session;

pub use session::{
    ChatSession, DEFAULT_CONNECT_TIMEOUT, ReconnectPolicy, SessionCallbacks, SessionConfig,
    SessionStatus,
};
