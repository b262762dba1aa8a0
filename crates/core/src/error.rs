use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no pipeline registered for content type '{0}'")]
    UnknownContentType(String),
    #[error("operation on a closed document or scheduler")]
    Closed,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TreelineError>;
