pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("auth failed: {message}")]
    Auth { message: String },

    #[error("auth failed: sign in with password: invalid password")]
    InvalidPassword,

    #[error("failed to resolve channel: {message}")]
    Resolve { message: String },

    #[error("failed to get messages: {message}")]
    History { message: String },

    #[error("download failed: {message}")]
    Download { message: String },

    #[error("telegram error: {message}")]
    Telegram { message: String },

    #[error("cancelled")]
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
