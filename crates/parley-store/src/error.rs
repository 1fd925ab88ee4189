use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// `author` was empty after trimming; nothing was persisted.
    #[error("author must not be blank")]
    EmptyAuthor,

    /// `body` was empty after trimming; nothing was persisted.
    #[error("body must not be blank")]
    EmptyBody,

    /// The underlying storage failed or is unreachable.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A previous store user panicked while holding the connection.
    #[error("store mutex poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when the input was rejected by validation. Nothing was
    /// persisted and (on the socket path) nothing is reported back.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::EmptyAuthor | Self::EmptyBody)
    }
}
