//! Shared id types. Kept in one leaf module so `bow.rs`, `vocab.rs` and
//! `database.rs` can all depend on them without a cycle.

/// Identifies a node in the flat vocabulary tree array; `0` is the root.
pub type NodeId = u32;

/// Dense id of a leaf (word), assigned `0..N_words` in traversal order.
pub type WordId = u32;

/// Sequentially assigned id of a database entry (one inserted image).
pub type EntryId = u32;

pub const ROOT: NodeId = 0;

/// Sentinel meaning "no parent" (used only by the root).
pub const NO_PARENT: NodeId = u32::MAX;
