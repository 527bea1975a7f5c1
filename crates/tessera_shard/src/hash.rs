//! Stable entity hashing.
//!
//! FNV-1a over the id's little-endian bytes. The mapping must never change
//! between releases: every worker has to agree on which bucket owns an id.

use tessera_core::EntityId;

const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a hash of an entity id.
#[must_use]
pub fn entity_hash(id: EntityId) -> u64 {
    id.to_le_bytes().iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Bucket owning `id` out of `total` buckets. A `total` of zero is treated as one.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn bucket_of(id: EntityId, total: u32) -> u32 {
    (entity_hash(id) % u64::from(total.max(1))) as u32
}
