use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Operator-input problems. Reported immediately; nothing is mutated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("pasted text is empty")]
    EmptyImport,
    #[error("no column is mapped to Device Type, Manufacturer or Model")]
    NoMappedColumns,
    #[error("new term name must not be empty")]
    EmptyTermName,
    #[error("merge target is not set")]
    MergeTargetUnset,
    #[error("cannot merge a term into itself")]
    MergeSelfTarget,
    #[error("another {0} is already in flight")]
    OperationInFlight(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),
    #[error("store query error: {0}")]
    Query(String),
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
}

/// Errors surfaced by the review state machine. A `Store` error means the
/// current item was neither marked nor advanced past; the operator may retry.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no review item at cursor")]
    QueueExhausted,
}

/// Errors from catalog admin edits (merge, term and system maintenance).
#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
