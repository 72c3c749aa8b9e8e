//! Error types for scfg-core.

use thiserror::Error;

/// Core error type.
///
/// Variants group into three families: malformed input (bad references,
/// duplicate names, head discovery failures), invariant violations
/// (a transformation produced a graph that is not single-entry/single-exit
/// where it must be), and unreachable-block reports from analyses.
#[derive(Error, Debug)]
pub enum Error {
    /// A block references a name that is not defined in its graph.
    #[error("block {block:?} references undefined block {target:?}")]
    UndefinedReference { block: String, target: String },

    /// A block with this name is already present in the graph.
    #[error("duplicate block name: {0:?}")]
    DuplicateBlock(String),

    /// An operation addressed a block that is not in the graph.
    #[error("unknown block: {0:?}")]
    UnknownBlock(String),

    /// No block without predecessors exists; the graph has no head.
    #[error("graph has no head block")]
    NoHead,

    /// More than one block without predecessors exists.
    #[error("graph has multiple head blocks: {0:?}")]
    MultipleHeads(Vec<String>),

    /// Blocks present in the graph but not reachable from the head.
    ///
    /// Transformations preserve unreachable blocks; analyses flag them.
    #[error("unreachable blocks: {0:?}")]
    UnreachableBlocks(Vec<String>),

    /// A transformation step broke a structural invariant. Indicates a bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The serialized form could not be interpreted.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// YAML parse error.
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
