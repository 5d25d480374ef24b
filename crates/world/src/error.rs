//! Entity consistency errors.
//!
//! None of these halt the simulation: each one degrades to a lost or preserved
//! entity and is reported to the operator log.

use thiserror::Error;

use voxsim_core::{BlockPos, ItemParseError};

use crate::entity::EntityId;
use crate::species::SpeciesId;
use crate::static_object::EntityKind;

/// Failures of entity registration and activation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntityError {
    /// The id space wrapped around without finding a free id.
    #[error("no free entity id after a full wraparound")]
    AllocationExhausted,
    /// A requested id is already registered.
    #[error("entity id {0} is already registered")]
    IdInUse(EntityId),
    /// A static payload could not be turned back into an entity; the record is kept.
    #[error("static {kind:?} object in block {block} could not be reconstructed: {reason}")]
    ReconstructionFailure {
        kind: EntityKind,
        block: BlockPos,
        reason: String,
    },
    /// A block held more static objects than the sanity cap; its list was purged.
    #[error("block {block} held {count} static objects; list purged")]
    CorruptRegion { block: BlockPos, count: usize },
    /// No block could take the entity (world edge); it was marked removed.
    #[error("entity {id} has no storable block at {block}")]
    OrphanedEntity { id: EntityId, block: BlockPos },
}

/// Failures decoding an entity's static payload.
#[derive(Debug, Error)]
pub enum StaticDataError {
    #[error("empty static payload")]
    Empty,
    #[error("unsupported static data version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown species {0}")]
    UnknownSpecies(SpeciesId),
    #[error("malformed payload: {0}")]
    Decode(#[from] bincode::Error),
    #[error("bad item string: {0}")]
    BadItemString(#[from] ItemParseError),
}
