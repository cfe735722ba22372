use thiserror::Error;

/// Failure taxonomy of the mapping engine.
///
/// `Config` failures are surfaced at save/validation time and rejected
/// before persistence. `NotFound`/`Format` abort the affected run. Unsafe
/// or failing expressions never abort a render; the column template engine
/// degrades them to the column's default value.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsafe expression: {0}")]
    UnsafeExpression(String),

    #[error("expression error: {0}")]
    Expression(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MappingError {
    /// Build one aggregated configuration error out of every issue found,
    /// so admin callers see the full list at once.
    pub fn config(issues: Vec<String>) -> MappingError {
        MappingError::Config(issues.join("; "))
    }
}

impl From<csv::Error> for MappingError {
    fn from(err: csv::Error) -> Self {
        MappingError::Format(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for MappingError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        MappingError::Format(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
