//! Shared byte-level primitives.
//!
//! Compact-size varints, byte-order reversal and hex decoding used by both
//! the Bitcoin-like and the Equihash paths.
//!
//! Every count prefix in this crate goes through [`varint`]. That includes the
//! Equihash block transaction count, which some pool software encodes with an
//! ad-hoc `0xFD` branch that only covers values up to `0x7FFF`; the standard
//! compact-size form is identical for that range and also covers the rest.

use bitcoin::consensus::encode::{self, VarInt};

use crate::error::PoolError;

/// Encode `value` as a Bitcoin compact-size integer.
///
/// ```text
/// 0x00..=0xFC          -> [value]
/// 0xFD..=0xFFFF        -> [0xFD, u16 LE]
/// 0x10000..=0xFFFFFFFF -> [0xFE, u32 LE]
/// larger               -> [0xFF, u64 LE]
/// ```
pub fn varint(value: u64) -> Vec<u8> {
    encode::serialize(&VarInt(value))
}

/// Decode a compact-size integer from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Non-minimal encodings
/// are rejected.
pub fn read_varint(bytes: &[u8]) -> Result<(u64, usize), PoolError> {
    let (value, consumed): (VarInt, usize) = encode::deserialize_partial(bytes)
        .map_err(|e| PoolError::validation("varint", e.to_string()))?;
    Ok((value.0, consumed))
}

/// Size in bytes of the compact-size encoding of `value`.
pub fn varint_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x10000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Prefix `data` with its compact-size length.
pub fn serialize_string(data: &[u8]) -> Vec<u8> {
    let mut out = varint(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// Return a reversed copy of `bytes`.
pub fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Reverse the order of the 4-byte words in a 32-byte hash, keeping the
/// bytes inside each word in place.
///
/// This is the Stratum V1 `prevhash` form: the internal-order hash with each
/// word byte-swapped.
pub fn reverse_word_order(hash: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (dst, src) in out.chunks_exact_mut(4).zip(hash.chunks_exact(4).rev()) {
        dst.copy_from_slice(src);
    }
    out
}

/// Decode a hex field that must be exactly `N` bytes long.
pub fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], PoolError> {
    let bytes = decode_hex(field, value)?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        PoolError::validation(field, format!("expected {} bytes, got {}", N, b.len()))
    })
}

/// Decode an arbitrary-length hex field.
pub fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, PoolError> {
    hex::decode(value).map_err(|e| PoolError::validation(field, e.to_string()))
}

/// Decode a display-order (RPC) hash into internal byte order.
pub fn hash_from_display(field: &'static str, value: &str) -> Result<[u8; 32], PoolError> {
    let mut hash = decode_fixed::<32>(field, value)?;
    hash.reverse();
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(0xfc), vec![0xfc]);
        assert_eq!(varint(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(varint(0xff), vec![0xfd, 0xff, 0x00]);
        assert_eq!(varint(0x7fff), vec![0xfd, 0xff, 0x7f]);
        assert_eq!(varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(varint(0x1_0000_0000).len(), 9);
    }

    #[test]
    fn test_varint_round_trip_fixed_values() {
        for value in [252u64, 253, 255, 32767] {
            let encoded = varint(value);
            assert_eq!(encoded.len(), varint_size(value));
            let (decoded, consumed) = read_varint(&encoded).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn test_read_varint_rejects_non_minimal() {
        // 5 encoded with the 0xFD form is not canonical.
        assert!(read_varint(&[0xfd, 0x05, 0x00]).is_err());
        assert!(read_varint(&[]).is_err());
    }

    #[test]
    fn test_serialize_string() {
        assert_eq!(serialize_string(b"abc"), vec![3, b'a', b'b', b'c']);
        let long = vec![0x41u8; 300];
        let encoded = serialize_string(&long);
        assert_eq!(&encoded[..3], &[0xfd, 0x2c, 0x01]);
        assert_eq!(encoded.len(), 303);
    }

    #[test]
    fn test_reverse_word_order() {
        let mut hash = [0u8; 32];
        for (i, b) in hash.iter_mut().enumerate() {
            *b = i as u8;
        }
        let swapped = reverse_word_order(&hash);
        assert_eq!(&swapped[..4], &[28, 29, 30, 31]);
        assert_eq!(&swapped[28..], &[0, 1, 2, 3]);
        assert_eq!(reverse_word_order(&swapped), hash);
    }

    #[test]
    fn test_hash_from_display() {
        let display = format!("{}01", "00".repeat(31));
        let internal = hash_from_display("hash", &display).unwrap();
        assert_eq!(internal[0], 0x01);
        assert!(hash_from_display("hash", "abcd").is_err());
        assert!(hash_from_display("hash", "zz").is_err());
    }
}
