/// Domain-level errors that do not depend on any backend.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Rejected user input, e.g. an edit value that is not a number.
    #[error("Validation failed: {0}")]
    Validation(String),
}
