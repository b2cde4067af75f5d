//! Block header encoders.
//!
//! The two families use different, non-interchangeable layouts, so each has
//! its own type. Hashes are held in internal byte order and every integer is
//! written little-endian.
//!
//! ```text
//! Default  (80 bytes) : version | prev_hash | merkle_root | time | bits | nonce(4)
//! Equihash (140 bytes): version | prev_hash | merkle_root | hash_reserved
//!                       | time | bits | nonce(32)
//! ```
//!
//! Stratum pools have long produced the default layout by writing the fields
//! in reverse (nonce first, big-endian) and reversing the whole buffer. That
//! yields the same bytes as the direct encoding above; the tests pin both
//! against the Bitcoin genesis header.

use bitcoin::hashes::{sha256d, Hash};

use crate::error::PoolError;

/// 80-byte Bitcoin-style header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultHeader {
    pub version: u32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl DefaultHeader {
    pub const SIZE: usize = 80;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Parse a serialized header back into its fields.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PoolError> {
        let bytes: &[u8; Self::SIZE] = bytes
            .try_into()
            .map_err(|_| size_error(Self::SIZE, bytes.len()))?;
        Ok(Self {
            version: read_u32(bytes, 0),
            prev_hash: read_hash(bytes, 4),
            merkle_root: read_hash(bytes, 36),
            time: read_u32(bytes, 68),
            bits: read_u32(bytes, 72),
            nonce: read_u32(bytes, 76),
        })
    }

    /// Double-SHA256 of the header, internal byte order.
    pub fn block_hash(&self) -> [u8; 32] {
        sha256d::Hash::hash(&self.serialize()).to_byte_array()
    }
}

/// 140-byte Zcash-style header (solution excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquihashHeader {
    pub version: u32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    /// `hashFinalSaplingRoot` after Sapling, zero before.
    pub hash_reserved: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: [u8; 32],
}

impl EquihashHeader {
    pub const SIZE: usize = 140;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..100].copy_from_slice(&self.hash_reserved);
        out[100..104].copy_from_slice(&self.time.to_le_bytes());
        out[104..108].copy_from_slice(&self.bits.to_le_bytes());
        out[108..140].copy_from_slice(&self.nonce);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PoolError> {
        let bytes: &[u8; Self::SIZE] = bytes
            .try_into()
            .map_err(|_| size_error(Self::SIZE, bytes.len()))?;
        Ok(Self {
            version: read_u32(bytes, 0),
            prev_hash: read_hash(bytes, 4),
            merkle_root: read_hash(bytes, 36),
            hash_reserved: read_hash(bytes, 68),
            time: read_u32(bytes, 100),
            bits: read_u32(bytes, 104),
            nonce: read_hash(bytes, 108),
        })
    }
}

/// A header of either family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    Default(DefaultHeader),
    Equihash(EquihashHeader),
}

impl BlockHeader {
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            BlockHeader::Default(h) => h.serialize().to_vec(),
            BlockHeader::Equihash(h) => h.serialize().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BlockHeader::Default(_) => DefaultHeader::SIZE,
            BlockHeader::Equihash(_) => EquihashHeader::SIZE,
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn size_error(expected: usize, got: usize) -> PoolError {
    PoolError::validation("header", format!("expected {} bytes, got {}", expected, got))
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_hash(bytes: &[u8], at: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[at..at + 32]);
    out
}
