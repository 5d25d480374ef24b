//! Compressed block archive.
//!
//! Blocks evicted from memory are encoded as a small header followed by a
//! zstd-compressed bincode payload, validated with CRC32 on the way back in.

use anyhow::{Context, Result};
use crc32fast::Hasher;
use std::collections::BTreeMap;

use voxsim_core::BlockPos;

use crate::block::{MapBlock, BLOCK_VOLUME};

/// Magic number for block blob identification ("VXBK").
const BLOCK_MAGIC: u32 = 0x5658_424B;

/// Current block blob format version.
const BLOCK_VERSION: u16 = 1;

const HEADER_LEN: usize = 14;

/// Block blob header structure.
#[derive(Debug, Clone)]
struct BlockHeader {
    magic: u32,
    version: u16,
    crc32: u32,
    payload_len: u32,
}

impl BlockHeader {
    fn new(crc32: u32, payload_len: u32) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            version: BLOCK_VERSION,
            crc32,
            payload_len,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.crc32.to_le_bytes());
        bytes.extend_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            anyhow::bail!("Block header too short");
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != BLOCK_MAGIC {
            anyhow::bail!(
                "Invalid block magic: expected 0x{:08X}, got 0x{:08X}",
                BLOCK_MAGIC,
                magic
            );
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != BLOCK_VERSION {
            anyhow::bail!("Unsupported block version {}", version);
        }
        let crc32 = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let payload_len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

        Ok(Self {
            magic,
            version,
            crc32,
            payload_len,
        })
    }
}

/// Encode a block into a self-describing compressed blob.
pub fn encode_block(block: &MapBlock) -> Result<Vec<u8>> {
    let serialized = bincode::serialize(block).context("Failed to serialize block")?;

    // Level 3 keeps eviction cheap.
    let compressed = zstd::encode_all(&serialized[..], 3).context("Failed to compress block")?;

    let mut hasher = Hasher::new();
    hasher.update(&compressed);
    let header = BlockHeader::new(hasher.finalize(), compressed.len() as u32);

    let mut out = header.to_bytes();
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode a blob produced by [`encode_block`].
pub fn decode_block(bytes: &[u8]) -> Result<MapBlock> {
    let header = BlockHeader::from_bytes(bytes)?;
    let payload = bytes
        .get(HEADER_LEN..HEADER_LEN + header.payload_len as usize)
        .context("Block payload truncated")?;

    let mut hasher = Hasher::new();
    hasher.update(payload);
    let computed_crc = hasher.finalize();
    if computed_crc != header.crc32 {
        anyhow::bail!(
            "CRC32 mismatch: expected {:08X}, got {:08X}",
            header.crc32,
            computed_crc
        );
    }

    let decompressed = zstd::decode_all(payload).context("Failed to decompress block")?;
    let block: MapBlock =
        bincode::deserialize(&decompressed).context("Failed to deserialize block")?;

    if block.node_count() != BLOCK_VOLUME {
        anyhow::bail!(
            "Invalid block data: expected {} nodes, got {}",
            BLOCK_VOLUME,
            block.node_count()
        );
    }
    Ok(block)
}

/// In-memory store of encoded blocks, keyed by position.
#[derive(Debug, Default)]
pub struct BlockArchive {
    blobs: BTreeMap<BlockPos, Vec<u8>>,
}

impl BlockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode and store a block, replacing any earlier copy.
    pub fn save_block(&mut self, block: &MapBlock) -> Result<()> {
        let blob = encode_block(block)
            .with_context(|| format!("Failed to archive block {}", block.position()))?;
        self.blobs.insert(block.position(), blob);
        Ok(())
    }

    /// Decode a stored block. `Ok(None)` when the block was never archived.
    pub fn load_block(&self, pos: BlockPos) -> Result<Option<MapBlock>> {
        match self.blobs.get(&pos) {
            Some(blob) => decode_block(blob)
                .with_context(|| format!("Failed to restore block {}", pos))
                .map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.blobs.contains_key(&pos)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Total encoded size in bytes.
    pub fn stored_bytes(&self) -> usize {
        self.blobs.values().map(Vec::len).sum()
    }
}
