use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Text exceeds max of {max} UTF-8 bytes (got {size})")]
    TextTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}
