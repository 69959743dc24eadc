use alloc::string::String;

use crate::{ItemAction, NodeId};

/// Errors reported by the reflector's public entry points.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("no source is attached")]
    NoSource,
    #[error("invalid row range {first}..={last}")]
    InvalidRange { first: usize, last: usize },
    #[error("node {0:?} is not part of the mirror")]
    StaleNode(NodeId),
    #[error("action {action:?} is not accepted on node {node:?}")]
    RejectedAction { node: NodeId, action: ItemAction },
    #[error("cannot move rows into their own subtree")]
    MoveIntoSelf,
    #[error("mirror invariant violated: {0}")]
    Corrupted(String),
}

pub type Result<T, E = TreeError> = core::result::Result<T, E>;
