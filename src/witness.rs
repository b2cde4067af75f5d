//! SegWit witness commitment output (BIP141).
//!
//! Segwit-aware daemons return the complete commitment script in the
//! template's `default_witness_commitment` field:
//!
//! ```text
//! OP_RETURN OP_PUSHBYTES_36 [aa21a9ed] [32-byte commitment hash]
//! ```
//!
//! The pool places it, with a zero value, ahead of every other coinbase
//! output.

use bitcoin::{Amount, Script, ScriptBuf, TxOut};
use tracing::warn;

use crate::codec;
use crate::error::PoolError;

/// The 4-byte magic prefix for the witness commitment in the scriptPubKey.
/// `0xaa21a9ed` identifies a SegWit witness commitment output.
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Build the zero-value commitment output from the template's hex script.
///
/// A script that does not look like a BIP141 commitment is still used
/// verbatim (the daemon is authoritative), but logged.
pub fn commitment_output(commitment_hex: &str) -> Result<TxOut, PoolError> {
    let bytes = codec::decode_hex("default_witness_commitment", commitment_hex)?;
    if bytes.is_empty() {
        return Err(PoolError::validation(
            "default_witness_commitment",
            "empty commitment script",
        ));
    }
    let script_pubkey = ScriptBuf::from_bytes(bytes);
    if !is_witness_commitment_script(&script_pubkey) {
        warn!(
            script = %commitment_hex,
            "default_witness_commitment does not carry the BIP141 header"
        );
    }
    Ok(TxOut {
        value: Amount::ZERO,
        script_pubkey,
    })
}

/// Check if a script contains a witness commitment (starts with `OP_RETURN 0xaa21a9ed`).
///
/// This checks the first 6 bytes of the scriptPubKey:
/// `0x6a` (OP_RETURN) + `0x24` (push 36 bytes) + `0xaa21a9ed` (magic).
pub fn is_witness_commitment_script(script: &Script) -> bool {
    let bytes = script.as_bytes();
    bytes.len() >= 38
        && bytes[0] == 0x6a  // OP_RETURN
        && bytes[1] == 0x24  // push 36 bytes
        && bytes[2..6] == WITNESS_COMMITMENT_HEADER
}
