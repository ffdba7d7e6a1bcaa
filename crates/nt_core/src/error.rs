use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Insert error: {0}")]
    Insert(String),

    #[error("Update error: {0}")]
    Update(String),

    #[error("Delete error: {0}")]
    Delete(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Cluster creation error: {0}")]
    CreateCluster(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
