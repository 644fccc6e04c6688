use thiserror::Error;

/// Errors surfaced by the vocabulary and database operations.
///
/// Input-validation failures are returned immediately and never leave
/// partial state behind; tree-shape invariants are instead enforced with
/// `assert!`/`debug_assert!` and are considered bugs if they fail.
#[derive(Debug, Error)]
pub enum BowError {
    #[error("input set is empty")]
    EmptyInput,

    #[error("vocabulary has not been trained")]
    NotTrained,

    #[error("direct index is disabled for this database")]
    DirectIndexDisabled,

    #[error("word id {0} is out of range")]
    WordOutOfRange(u32),

    #[error("entry id {0} is out of range")]
    EntryOutOfRange(u32),

    #[error("invalid branching factor {0}, expected 2..=256")]
    InvalidBranchingFactor(u32),

    #[error("invalid max depth {0}, expected 1..=10")]
    InvalidMaxDepth(u32),

    #[error("failed to parse descriptor string: {0}")]
    DescriptorParse(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "bincode")]
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("non-finite score produced by scoring function: {0}")]
    Numeric(String),
}

pub type BowResult<T> = Result<T, BowError>;
