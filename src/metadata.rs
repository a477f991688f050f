//! Handling for the Swarm metadata trailer that `solc` appends to contract
//! bytecode.
//!
//! The trailer is not code, and while it disassembles to unreachable garbage it
//! also tends to produce truncated pushes and spurious jump destinations. It is
//! therefore removed before analysis unless the caller asks otherwise. See the
//! [Solidity documentation](https://docs.soliditylang.org/en/latest/metadata.html#encoding-of-the-metadata-hash-in-the-bytecode)
//! for the encoding.

use std::fmt::{Display, Formatter};

use crate::constant::{
    SWARM_HASH_LENGTH,
    SWARM_METADATA_HEADER,
    SWARM_METADATA_LENGTH,
    SWARM_METADATA_TRAILER,
};

/// The metadata that was found at the end of the bytecode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SwarmMetadata {
    hash: [u8; SWARM_HASH_LENGTH],
}

impl SwarmMetadata {
    /// Gets the Swarm hash of the contract's metadata file.
    #[must_use]
    pub fn hash(&self) -> &[u8; SWARM_HASH_LENGTH] {
        &self.hash
    }
}

/// Displays the hash as `0x`-prefixed hex.
impl Display for SwarmMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.hash))
    }
}

/// Looks for the Swarm metadata trailer at the end of `bytes`.
///
/// Returns [`None`] if the bytes are too short to contain it, or if its framing
/// bytes are not present.
#[must_use]
pub fn find_swarm_metadata(bytes: &[u8]) -> Option<SwarmMetadata> {
    let len = bytes.len();
    if len < SWARM_METADATA_LENGTH {
        return None;
    }

    let header = &bytes[len - SWARM_METADATA_LENGTH..len - SWARM_METADATA_LENGTH + 2];
    let trailer = &bytes[len - 2..];
    if header != SWARM_METADATA_HEADER || trailer != SWARM_METADATA_TRAILER {
        return None;
    }

    let mut hash = [0u8; SWARM_HASH_LENGTH];
    hash.copy_from_slice(&bytes[len - 2 - SWARM_HASH_LENGTH..len - 2]);
    Some(SwarmMetadata { hash })
}

/// Splits the Swarm metadata trailer off the end of `bytes` if it is present,
/// returning the remaining code and the metadata.
#[must_use]
pub fn strip_swarm_metadata(bytes: &[u8]) -> (&[u8], Option<SwarmMetadata>) {
    match find_swarm_metadata(bytes) {
        Some(metadata) => (&bytes[..bytes.len() - SWARM_METADATA_LENGTH], Some(metadata)),
        None => (bytes, None),
    }
}
