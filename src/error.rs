use thiserror::Error;

/// Failures the library reports as errors. Data defects (bad numbers, unknown
/// units) never end up here; they are repaired and recorded as warnings.
#[derive(Error, Debug)]
pub enum ShoppingError {
    /// Input row is not a key/value object at all (caller bug)
    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShoppingError>;
