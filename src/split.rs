//! Stratum coinbase split model.
//!
//! In pool mining (Stratum V1), the coinbase transaction is split into two
//! segments around the extranonce:
//!
//! ```text
//! coinbase1 || extranonce1 || extranonce2 || coinbase2
//! ```
//!
//! The pool sends `coinbase1` and `coinbase2` to each worker. The pool assigns
//! a unique `extranonce1` per worker connection, and the worker iterates through
//! `extranonce2` values to search for valid blocks. Together the two must fill
//! exactly the placeholder reserved in the scriptSig.

use bitcoin::hashes::{sha256d, Hash};

use crate::error::PoolError;

/// A coinbase transaction split into two segments around the extranonce slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseSplit {
    /// Everything before the extranonce: version, input count, null outpoint,
    /// scriptSig length, height, aux flags, time and the placeholder push.
    pub coinbase1: Vec<u8>,

    /// Everything after the extranonce: pool identifier, sequence, outputs,
    /// locktime and any trailing coin-specific payload.
    pub coinbase2: Vec<u8>,

    /// Size of the reserved extranonce slot (extranonce1 + extranonce2).
    pub placeholder_len: usize,
}

impl CoinbaseSplit {
    /// Reassemble the raw serialized coinbase transaction bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::ExtraNonceSizeMismatch`] if the two extranonces
    /// do not fill the placeholder exactly.
    pub fn assemble_raw(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Result<Vec<u8>, PoolError> {
        let got = extranonce1.len() + extranonce2.len();
        if got != self.placeholder_len {
            return Err(PoolError::ExtraNonceSizeMismatch {
                expected: self.placeholder_len,
                got,
            });
        }

        let mut raw = Vec::with_capacity(self.total_size());
        raw.extend_from_slice(&self.coinbase1);
        raw.extend_from_slice(extranonce1);
        raw.extend_from_slice(extranonce2);
        raw.extend_from_slice(&self.coinbase2);

        Ok(raw)
    }

    /// Double-SHA256 of the assembled coinbase, in internal byte order.
    pub fn coinbase_hash(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Result<[u8; 32], PoolError> {
        let raw = self.assemble_raw(extranonce1, extranonce2)?;
        Ok(sha256d::Hash::hash(&raw).to_byte_array())
    }

    /// Total serialized size of the coinbase transaction.
    pub fn total_size(&self) -> usize {
        self.coinbase1.len() + self.placeholder_len + self.coinbase2.len()
    }

    /// `coinbase1` as lowercase hex.
    pub fn coinbase1_hex(&self) -> String {
        hex::encode(&self.coinbase1)
    }

    /// `coinbase2` as lowercase hex.
    pub fn coinbase2_hex(&self) -> String {
        hex::encode(&self.coinbase2)
    }
}
