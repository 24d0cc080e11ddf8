use chatline_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Conversation not found: {id}")]
    NotFound { id: String },

    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
