//! Hierarchical, tree-based bag-of-words visual place-recognition core.
//!
//! Three tightly coupled pieces: a [`vocab::Vocabulary`] built by
//! recursive k-means over a corpus of training descriptors, a transform
//! stage that quantizes a new image's descriptors into a weighted sparse
//! [`bow::BowVector`] (and, optionally, a [`bow::FeatureVector`] direct
//! index), and a [`database::Database`] with an inverted index supporting
//! top-k similarity queries.
//!
//! Feature extraction, image I/O, and any outer loop-detection layer are
//! the caller's responsibility; this crate only turns descriptor sets
//! into comparable, queryable vectors.

pub mod bow;
pub mod database;
pub mod descriptor;
pub mod error;
mod ids;
pub mod scoring;
pub mod vocab;
pub mod weighting;

pub use bow::{BowVector, FeatureVector};
pub use database::Database;
pub use descriptor::{BinaryDescriptor, Descriptor, FloatDescriptor};
pub use error::{BowError, BowResult};
pub use ids::{EntryId, NodeId, WordId};
pub use scoring::Scoring;
pub use vocab::Vocabulary;
pub use weighting::Weighting;
