#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("no active conversation")]
    NoActiveSession,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("discord api error: {0}")]
    Discord(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
