//! Coinbase scriptSig primitives and output-script compilation.
//!
//! ## Default-family scriptSig layout
//!
//! ```text
//! [height] [coinbaseaux flags] [time] [placeholder len] | extranonce | [pool identifier]
//! ```
//!
//! ## Equihash-family scriptSig layout
//!
//! ```text
//! [height push] [OP_0] [pool identifier bytes]
//! ```
//!
//! The total scriptSig must be between 2 and 100 bytes (consensus rule).

use bitcoin::base58;
use bitcoin::bech32;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_PUSHNUM_1;
use bitcoin::opcodes::OP_0;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash, WitnessProgram, WitnessVersion};

use crate::config::NetworkParams;
use crate::error::PoolError;

/// Maximum coinbase scriptSig size in bytes (consensus rule).
pub const MAX_COINBASE_SCRIPT_SIZE: usize = 100;

/// Minimum coinbase scriptSig size in bytes (consensus rule).
pub const MIN_COINBASE_SCRIPT_SIZE: usize = 2;

/// Serialize a number the way it appears in a coinbase scriptSig.
///
/// Values 1 through 16 use the single-byte `OP_1`..`OP_16` opcodes; every
/// other value is a length-prefixed minimal CScriptNum push.
///
/// # Examples
///
/// ```
/// use rust_blocktemplate::script::serialize_number;
///
/// assert_eq!(serialize_number(1), vec![0x51]);
/// assert_eq!(serialize_number(700_000), vec![0x03, 0x60, 0xae, 0x0a]);
/// ```
pub fn serialize_number(value: i64) -> Vec<u8> {
    if (1..=16).contains(&value) {
        return vec![OP_PUSHNUM_1.to_u8() + (value as u8) - 1];
    }
    encode_height_push(value)
}

/// Encode `value` as a length-prefixed CScriptNum push.
///
/// Unlike [`serialize_number`] this never collapses small values into
/// `OP_N` opcodes, so height 1 encodes as `[0x01, 0x01]`.
pub fn encode_height_push(value: i64) -> Vec<u8> {
    let data = serialize_script_num(value);
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(data.len() as u8);
    out.extend_from_slice(&data);
    out
}

/// Build the Equihash coinbase scriptSig: height push, `OP_0`, then the pool
/// identifier as raw bytes.
pub fn equihash_coinbase_script(height: u64, identifier: &str) -> Result<ScriptBuf, PoolError> {
    let mut raw = encode_height_push(height as i64);
    raw.push(OP_0.to_u8());
    raw.extend_from_slice(identifier.as_bytes());
    check_script_size(raw.len())?;
    Ok(ScriptBuf::from_bytes(raw))
}

/// Check a coinbase scriptSig length against the consensus bounds.
pub fn check_script_size(size: usize) -> Result<(), PoolError> {
    if size > MAX_COINBASE_SCRIPT_SIZE {
        return Err(PoolError::validation(
            "script_sig",
            format!("{} bytes exceeds the {} byte maximum", size, MAX_COINBASE_SCRIPT_SIZE),
        ));
    }
    if size < MIN_COINBASE_SCRIPT_SIZE {
        return Err(PoolError::validation(
            "script_sig",
            format!("{} bytes is below the {} byte minimum", size, MIN_COINBASE_SCRIPT_SIZE),
        ));
    }
    Ok(())
}

/// Compile an address into an output script for `network`.
///
/// Accepted forms:
/// - Base58Check P2PKH / P2SH addresses whose version prefix matches the
///   network (1- or 2-byte prefixes, so Zcash `t1`/`t3` addresses work)
/// - Bech32 / bech32m segwit addresses with the network's HRP
/// - A 40-character hex "mining key" (a raw hash160), paid as P2PKH
pub fn compile_address(address: &str, network: &NetworkParams) -> Result<ScriptBuf, PoolError> {
    if address.len() == 40 && address.bytes().all(|b| b.is_ascii_hexdigit()) {
        let hash = crate::codec::decode_fixed::<20>("address", address)
            .map_err(|e| PoolError::script(address, e.to_string()))?;
        return Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)));
    }

    if let Some(hrp) = network.bech32_hrp() {
        let lower = address.to_ascii_lowercase();
        if lower.starts_with(&format!("{}1", hrp.to_ascii_lowercase())) {
            return compile_segwit(address, hrp);
        }
    }

    let payload =
        base58::decode_check(address).map_err(|e| PoolError::script(address, e.to_string()))?;

    let pkh = network.pub_key_hash();
    let sh = network.script_hash();
    if let Some(hash) = strip_version(&payload, pkh) {
        return Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)));
    }
    if let Some(hash) = strip_version(&payload, sh) {
        return Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)));
    }
    Err(PoolError::script(
        address,
        "address version does not belong to the configured network",
    ))
}

/// Resolve a daemon payee entry: the address when given, otherwise the raw
/// hex script.
pub fn resolve_payee(
    address: Option<&str>,
    raw_script: Option<&str>,
    network: &NetworkParams,
) -> Result<ScriptBuf, PoolError> {
    match (address, raw_script) {
        (Some(address), _) => compile_address(address, network),
        (None, Some(raw)) => {
            let bytes = hex::decode(raw).map_err(|e| PoolError::script(raw, e.to_string()))?;
            if bytes.is_empty() {
                return Err(PoolError::script(raw, "empty script"));
            }
            Ok(ScriptBuf::from_bytes(bytes))
        }
        (None, None) => Err(PoolError::script("<none>", "payee has neither address nor script")),
    }
}

fn compile_segwit(address: &str, expected_hrp: &str) -> Result<ScriptBuf, PoolError> {
    let (hrp, version, program) =
        bech32::segwit::decode(address).map_err(|e| PoolError::script(address, e.to_string()))?;
    if hrp.to_lowercase() != expected_hrp.to_ascii_lowercase() {
        return Err(PoolError::script(
            address,
            format!("human-readable part is not `{}`", expected_hrp),
        ));
    }
    let version =
        WitnessVersion::try_from(version).map_err(|e| PoolError::script(address, e.to_string()))?;
    let program = WitnessProgram::new(version, &program)
        .map_err(|e| PoolError::script(address, e.to_string()))?;
    Ok(ScriptBuf::new_witness_program(&program))
}

fn strip_version(payload: &[u8], version: &[u8]) -> Option<[u8; 20]> {
    if version.is_empty() || payload.len() != version.len() + 20 || !payload.starts_with(version) {
        return None;
    }
    payload[version.len()..].try_into().ok()
}

/// Serialize an integer as a Bitcoin CScriptNum (little-endian with sign bit).
///
/// This produces the data bytes (without the push opcode prefix) for a
/// minimal CScriptNum encoding, matching Bitcoin Core's serialization.
fn serialize_script_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![0x00];
    }

    let negative = value < 0;
    let mut abs_value = value.unsigned_abs();

    let mut result = Vec::new();
    while abs_value > 0 {
        result.push((abs_value & 0xff) as u8);
        abs_value >>= 8;
    }

    // If the most significant byte has the sign bit set, we need an
    // extra byte to indicate the sign.
    if let Some(last) = result.last() {
        if last & 0x80 != 0 {
            result.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            let len = result.len();
            result[len - 1] |= 0x80;
        }
    }

    result
}
