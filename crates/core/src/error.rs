/// Precondition failures raised while interpreting input as a dataset.
///
/// Consistency problems are never reported through this type; they are
/// [`Violation`](crate::violation::Violation) values inside a
/// [`ValidationResult`](crate::violation::ValidationResult).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("Collection '{collection}' must be an array of objects (element {index} is not an object)")]
    MalformedRecord { collection: String, index: usize },

    #[error("Unknown domain: '{0}'")]
    UnknownDomain(String),

    #[error("Malformed schema result: {0}")]
    MalformedSchemaResult(String),
}
