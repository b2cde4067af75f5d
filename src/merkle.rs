//! Stratum merkle branch.
//!
//! Miners only ever swap the coinbase, so the tree is computed with an empty
//! first leaf and reduced to the list of sibling hashes ("steps") on the
//! coinbase's path to the root:
//!
//! ```text
//! root = H(...H(H(coinbase || steps[0]) || steps[1])... || steps[n-1])
//! ```
//!
//! All hashes are 32-byte double-SHA256 values in internal byte order.

use bitcoin::hashes::{sha256d, Hash};

/// Merkle branch for a block whose first transaction is not yet known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleTree {
    steps: Vec<[u8; 32]>,
}

impl MerkleTree {
    /// Build the branch from the non-coinbase transaction hashes, in block
    /// order.
    pub fn new(hashes: &[[u8; 32]]) -> Self {
        let mut steps = Vec::new();
        let mut level = hashes.to_vec();

        while let Some(&first) = level.first() {
            steps.push(first);
            // The level still holds the (absent) coinbase-side node in front.
            if (level.len() + 1) % 2 == 1 {
                if let Some(&last) = level.last() {
                    level.push(last);
                }
            }
            level = level[1..]
                .chunks(2)
                .map(|pair| join(&pair[0], &pair[1]))
                .collect();
        }

        Self { steps }
    }

    /// Sibling hashes, leaf level first.
    pub fn steps(&self) -> &[[u8; 32]] {
        &self.steps
    }

    /// Steps as lowercase hex, internal byte order (the `mining.notify` form).
    pub fn branch_hex(&self) -> Vec<String> {
        self.steps.iter().map(hex::encode).collect()
    }

    /// Fold `first` (the coinbase hash) up the branch into the merkle root.
    pub fn with_first(&self, first: [u8; 32]) -> [u8; 32] {
        self.steps.iter().fold(first, |acc, step| join(&acc, step))
    }
}

/// Merkle root over a complete list of transaction hashes.
///
/// Returns `None` for an empty list.
pub fn root(hashes: &[[u8; 32]]) -> Option<[u8; 32]> {
    let (&first, rest) = hashes.split_first()?;
    Some(MerkleTree::new(rest).with_first(first))
}

fn join(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    sha256d::Hash::hash(&buf).to_byte_array()
}
