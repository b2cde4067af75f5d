//! Transparent-only Zcash transaction encoding.
//!
//! The Equihash family's coinbase is a finished transaction, never split.
//! Three layouts are supported, selected by height against the coin's
//! activation heights (Sapling wins over Overwinter when both apply):
//!
//! ```text
//! v1        : version | vin | vout | lock_time
//! Overwinter: header | group_id | vin | vout | lock_time | expiry | n_joinsplit
//! Sapling   : header | group_id | vin | vout | lock_time | expiry | value_balance
//!             | n_spend | n_output | n_joinsplit
//! ```
//!
//! `header` is the version with the overwintered bit (bit 31) set. Inputs and
//! outputs use the Bitcoin wire encoding unchanged.

use bitcoin::consensus::encode;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{TxIn, TxOut};

use crate::codec;
use crate::config::CoinOptions;

/// Overwinter version group id.
pub const OVERWINTER_VERSION_GROUP_ID: u32 = 0x03C4_8270;

/// Sapling version group id.
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892F_2085;

const OVERWINTERED_FLAG: u32 = 1 << 31;

/// Transaction format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxVersion {
    /// Pre-Overwinter (Bitcoin-compatible) transaction.
    Legacy,
    /// Overwinter, version 3.
    Overwinter,
    /// Sapling, version 4.
    Sapling,
}

impl TxVersion {
    /// Select the version for `height` from the coin's activation heights.
    pub fn for_height(height: u64, coin: &CoinOptions) -> Self {
        let active = |activation: Option<u64>| activation.map_or(false, |h| h <= height);
        if active(coin.sapling) {
            TxVersion::Sapling
        } else if active(coin.overwinter) {
            TxVersion::Overwinter
        } else {
            TxVersion::Legacy
        }
    }

    fn number(self) -> u32 {
        match self {
            TxVersion::Legacy => 1,
            TxVersion::Overwinter => 3,
            TxVersion::Sapling => 4,
        }
    }
}

/// A transparent Zcash transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZcashTransaction {
    pub version: TxVersion,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    pub expiry_height: u32,
}

impl ZcashTransaction {
    /// Serialize to wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.version {
            TxVersion::Legacy => out.extend_from_slice(&1u32.to_le_bytes()),
            TxVersion::Overwinter | TxVersion::Sapling => {
                let header = self.version.number() | OVERWINTERED_FLAG;
                let group = if self.version == TxVersion::Sapling {
                    SAPLING_VERSION_GROUP_ID
                } else {
                    OVERWINTER_VERSION_GROUP_ID
                };
                out.extend_from_slice(&header.to_le_bytes());
                out.extend_from_slice(&group.to_le_bytes());
            }
        }

        out.extend(encode::serialize(&self.inputs));
        out.extend(encode::serialize(&self.outputs));
        out.extend_from_slice(&self.lock_time.to_le_bytes());

        match self.version {
            TxVersion::Legacy => {}
            TxVersion::Overwinter => {
                out.extend_from_slice(&self.expiry_height.to_le_bytes());
                out.extend(codec::varint(0)); // joinsplits
            }
            TxVersion::Sapling => {
                out.extend_from_slice(&self.expiry_height.to_le_bytes());
                out.extend_from_slice(&0i64.to_le_bytes()); // value balance
                out.extend(codec::varint(0)); // shielded spends
                out.extend(codec::varint(0)); // shielded outputs
                out.extend(codec::varint(0)); // joinsplits
            }
        }
        out
    }

    /// Transaction id (double-SHA256 of the serialization), internal byte order.
    pub fn txid(&self) -> [u8; 32] {
        sha256d::Hash::hash(&self.serialize()).to_byte_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, Witness};

    fn coinbase(version: TxVersion) -> ZcashTransaction {
        ZcashTransaction {
            version,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x01, 0x01, 0x00]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            outputs: vec![TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
            }],
            lock_time: 0,
            expiry_height: 0,
        }
    }

    #[test]
    fn test_version_selection() {
        let coin = CoinOptions {
            overwinter: Some(100),
            sapling: Some(200),
            ..CoinOptions::default()
        };
        assert_eq!(TxVersion::for_height(99, &coin), TxVersion::Legacy);
        assert_eq!(TxVersion::for_height(100, &coin), TxVersion::Overwinter);
        assert_eq!(TxVersion::for_height(250, &coin), TxVersion::Sapling);

        // Sapling wins when both activate at the same height.
        let both = CoinOptions {
            overwinter: Some(0),
            sapling: Some(0),
            ..CoinOptions::default()
        };
        assert_eq!(TxVersion::for_height(0, &both), TxVersion::Sapling);
        assert_eq!(TxVersion::for_height(5, &CoinOptions::default()), TxVersion::Legacy);
    }

    #[test]
    fn test_legacy_matches_bitcoin_encoding() {
        let tx = coinbase(TxVersion::Legacy);
        let bitcoin_tx = Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: tx.inputs.clone(),
            output: tx.outputs.clone(),
        };
        assert_eq!(tx.serialize(), encode::serialize(&bitcoin_tx));
        assert_eq!(tx.txid(), bitcoin_tx.compute_txid().to_byte_array());
    }

    #[test]
    fn test_sapling_layout() {
        let raw = coinbase(TxVersion::Sapling).serialize();
        assert_eq!(&raw[..4], &[0x04, 0x00, 0x00, 0x80]);
        assert_eq!(&raw[4..8], &[0x85, 0x20, 0x2f, 0x89]);
        // value balance (8) + three empty vectors (3) after expiry.
        assert_eq!(&raw[raw.len() - 11..], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_overwinter_layout() {
        let raw = coinbase(TxVersion::Overwinter).serialize();
        assert_eq!(&raw[..4], &[0x03, 0x00, 0x00, 0x80]);
        assert_eq!(&raw[4..8], &[0x70, 0x82, 0xc4, 0x03]);
        let legacy = coinbase(TxVersion::Legacy).serialize();
        // group id + expiry + joinsplit count.
        assert_eq!(raw.len(), legacy.len() + 4 + 4 + 1);
    }
}
