// File: error.rs
//
// The purpose of this file is to define the error kinds that public
// overlay operations can fail with.

use thiserror::Error;

/// Every public overlay operation either succeeds or fails with exactly
/// one of these kinds, leaving the overlay unchanged.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum OverlayError {
    #[error("ring exponent {0} outside [1, 32]")]
    RingExponentOutOfRange(u32),
    #[error("id {id} outside the ring [0, {size})")]
    IdOutOfRange { id: u64, size: u64 },
    #[error("id {0} is already taken")]
    IdConflict(u64),
    #[error("no node with id {0}")]
    NodeNotFound(u64),
    #[error("cannot remove the last node in the ring")]
    LastNodeRemoval,
    #[error("snapshot version {0} is not supported")]
    SnapshotVersionMismatch(u32),
    #[error("snapshot failed verification: {0}")]
    SnapshotInconsistent(String),
    #[error("stabilization did not converge within {0} passes")]
    RebalanceDivergence(u32),
}
