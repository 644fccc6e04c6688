use serde::{Deserialize, Serialize};

/// Leaf weighting scheme, fixed at vocabulary construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weighting {
    /// `weight = ln(N / n_i)`, accumulated per descriptor then divided by
    /// the feature count (raw term frequency times inverse document
    /// frequency).
    TfIdf,
    /// `weight = 1`; accumulated per descriptor then divided by the
    /// feature count (no idf term).
    Tf,
    /// `weight = ln(N / n_i)`; accumulated per descriptor, no tf
    /// normalization.
    Idf,
    /// `weight = 1`; a word's value is `1` if seen at all, else absent.
    Binary,
}
