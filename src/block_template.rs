//! One mining job.
//!
//! A [`BlockTemplate`] is built once per daemon template and then shared
//! read-only between every session broadcasting or validating against it.
//! Its only mutable state is the submission dedup set and the lazily
//! computed job parameters, both safe under concurrent access.

use std::collections::HashSet;

use bitcoin::hashes::{sha256d, Hash};
use num_bigint::BigUint;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::builder::{GenerationBuilder, GenerationTransaction};
use crate::codec;
use crate::config::{Algorithm, PoolConfig};
use crate::error::PoolError;
use crate::header::{BlockHeader, DefaultHeader, EquihashHeader};
use crate::merkle::MerkleTree;
use crate::target;
use crate::template::RawTemplate;

/// `mining.notify` parameters. Serializes as the positional JSON array
/// miners expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParams {
    Default {
        job_id: String,
        prev_hash: String,
        coinbase1: String,
        coinbase2: String,
        merkle_branch: Vec<String>,
        version: String,
        bits: String,
        time: String,
        clean_jobs: bool,
    },
    Equihash {
        job_id: String,
        version: String,
        prev_hash: String,
        merkle_root: String,
        hash_reserved: String,
        time: String,
        bits: String,
        clean_jobs: bool,
    },
}

impl JobParams {
    pub fn job_id(&self) -> &str {
        match self {
            JobParams::Default { job_id, .. } | JobParams::Equihash { job_id, .. } => job_id,
        }
    }

    pub fn clean_jobs(&self) -> bool {
        match self {
            JobParams::Default { clean_jobs, .. } | JobParams::Equihash { clean_jobs, .. } => {
                *clean_jobs
            }
        }
    }

    /// Copy with the clean-jobs flag replaced.
    pub fn with_clean_jobs(mut self, clean: bool) -> Self {
        match &mut self {
            JobParams::Default { clean_jobs, .. } | JobParams::Equihash { clean_jobs, .. } => {
                *clean_jobs = clean
            }
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Strings, a string list and a bool always serialize.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for JobParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JobParams::Default {
                job_id,
                prev_hash,
                coinbase1,
                coinbase2,
                merkle_branch,
                version,
                bits,
                time,
                clean_jobs,
            } => (
                job_id,
                prev_hash,
                coinbase1,
                coinbase2,
                merkle_branch,
                version,
                bits,
                time,
                clean_jobs,
            )
                .serialize(serializer),
            JobParams::Equihash {
                job_id,
                version,
                prev_hash,
                merkle_root,
                hash_reserved,
                time,
                bits,
                clean_jobs,
            } => (
                job_id,
                version,
                prev_hash,
                merkle_root,
                hash_reserved,
                time,
                bits,
                clean_jobs,
            )
                .serialize(serializer),
        }
    }
}

/// A block template bound to a job id.
#[derive(Debug)]
pub struct BlockTemplate {
    job_id: String,
    template: RawTemplate,
    algorithm: Algorithm,
    bits: u32,
    target: BigUint,
    difficulty: f64,
    generation: GenerationTransaction,
    merkle: MerkleTree,
    /// Equihash only: the coinbase is final, so the root is known up front.
    merkle_root: Option<[u8; 32]>,
    prev_hash: [u8; 32],
    prev_hash_reversed: [u8; 32],
    hash_reserved: [u8; 32],
    transactions: Vec<u8>,
    submits: Mutex<HashSet<String>>,
    job_params: OnceCell<JobParams>,
}

impl BlockTemplate {
    /// Build the job: coinbase, merkle data, target and cached byte fields.
    ///
    /// # Errors
    ///
    /// Any [`PoolError`] raised while reading the template or building the
    /// generation transaction. Nothing is published on error.
    pub fn new(
        job_id: impl Into<String>,
        template: RawTemplate,
        placeholder_len: usize,
        config: &PoolConfig,
    ) -> Result<Self, PoolError> {
        let job_id = job_id.into();
        let algorithm = config.algorithm;

        let bits = template.bits_u32()?;
        let target = match template.target.as_deref() {
            Some(hex) => target::parse_target(hex)?,
            None => target::target_from_bits(bits),
        };
        let difficulty = target::difficulty(&target::diff1(algorithm), &target)?;

        let generation = GenerationBuilder::new(&template, config)
            .placeholder_len(placeholder_len)
            .build()?;

        let merkle = MerkleTree::new(&template.transaction_hashes()?);
        let merkle_root = generation.as_final().map(|coinbase| merkle.with_first(coinbase.txid));

        let prev_display = template.previous_hash_display()?;
        let mut prev_hash = prev_display;
        prev_hash.reverse();
        let prev_hash_reversed = match algorithm {
            Algorithm::Default => codec::reverse_word_order(&prev_display),
            Algorithm::Equihash => prev_hash,
        };

        let hash_reserved = match template.finalsaplingroothash.as_deref() {
            Some(root) => codec::hash_from_display("finalsaplingroothash", root)?,
            None => [0u8; 32],
        };

        let transactions = template.transaction_bytes()?;

        debug!(
            job_id = %job_id,
            height = template.height,
            transactions = template.transactions.len(),
            difficulty,
            "created block template"
        );

        Ok(Self {
            job_id,
            template,
            algorithm,
            bits,
            target,
            difficulty,
            generation,
            merkle,
            merkle_root,
            prev_hash,
            prev_hash_reversed,
            hash_reserved,
            transactions,
            submits: Mutex::new(HashSet::new()),
            job_params: OnceCell::new(),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn template(&self) -> &RawTemplate {
        &self.template
    }

    pub fn height(&self) -> u64 {
        self.template.height
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn target(&self) -> &BigUint {
        &self.target
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn generation(&self) -> &GenerationTransaction {
        &self.generation
    }

    pub fn merkle(&self) -> &MerkleTree {
        &self.merkle
    }

    /// Precomputed merkle root (internal order); `None` for the default
    /// family, whose root depends on the extranonce.
    pub fn merkle_root(&self) -> Option<[u8; 32]> {
        self.merkle_root
    }

    /// Merkle root for a default-family coinbase, internal byte order.
    pub fn merkle_root_with(&self, coinbase: &[u8]) -> [u8; 32] {
        self.merkle
            .with_first(sha256d::Hash::hash(coinbase).to_byte_array())
    }

    /// Previous hash in the form broadcast to miners.
    pub fn prev_hash_reversed_hex(&self) -> String {
        hex::encode(self.prev_hash_reversed)
    }

    pub fn hash_reserved(&self) -> [u8; 32] {
        self.hash_reserved
    }

    /// Concatenated raw non-coinbase transactions.
    pub fn transactions(&self) -> &[u8] {
        &self.transactions
    }

    /// Splice the extranonces into the coinbase.
    ///
    /// # Errors
    ///
    /// [`PoolError::Validation`] for the Equihash family, whose coinbase has
    /// no splice point, and [`PoolError::ExtraNonceSizeMismatch`] when the
    /// extranonces do not fill the placeholder.
    pub fn serialize_coinbase(&self, extranonce1: &[u8], extranonce2: &[u8]) -> Result<Vec<u8>, PoolError> {
        match &self.generation {
            GenerationTransaction::Split(split) => split.assemble_raw(extranonce1, extranonce2),
            GenerationTransaction::Final(_) => Err(PoolError::validation(
                "coinbase",
                "equihash coinbases are final and take no extranonce",
            )),
        }
    }

    /// Build the header from a share's fields as the miner sent them.
    ///
    /// `merkle_root` is in internal byte order. For the default family
    /// `time` and `nonce` are 4-byte big-endian hex; for the Equihash family
    /// `time` is the little-endian hex broadcast in the job and `nonce` is
    /// 32 bytes.
    pub fn header(&self, merkle_root: [u8; 32], time: &str, nonce: &str) -> Result<BlockHeader, PoolError> {
        let bits = self.bits;
        let time = codec::decode_fixed::<4>("time", time)?;
        match self.algorithm {
            Algorithm::Default => Ok(BlockHeader::Default(DefaultHeader {
                version: self.template.version,
                prev_hash: self.prev_hash,
                merkle_root,
                time: u32::from_be_bytes(time),
                bits,
                nonce: codec::decode_fixed::<4>("nonce", nonce).map(u32::from_be_bytes)?,
            })),
            Algorithm::Equihash => Ok(BlockHeader::Equihash(EquihashHeader {
                version: self.template.version,
                prev_hash: self.prev_hash,
                merkle_root,
                hash_reserved: self.hash_reserved,
                time: u32::from_le_bytes(time),
                bits,
                nonce: codec::decode_fixed::<32>("nonce", nonce)?,
            })),
        }
    }

    /// Serialized header bytes; see [`BlockTemplate::header`].
    pub fn serialize_header(&self, merkle_root: [u8; 32], time: &str, nonce: &str) -> Result<Vec<u8>, PoolError> {
        self.header(merkle_root, time, nonce).map(|h| h.serialize())
    }

    /// Serialize the full block for submission.
    ///
    /// `secondary` is the spliced coinbase for the default family and the
    /// length-prefixed Equihash solution for the Equihash family.
    pub fn serialize_block(&self, header: &[u8], secondary: &[u8]) -> Result<Vec<u8>, PoolError> {
        let tx_count = codec::varint(self.template.transactions.len() as u64 + 1);
        let mut block = Vec::new();
        match &self.generation {
            GenerationTransaction::Split(_) => {
                check_header_len(header, DefaultHeader::SIZE)?;
                block.extend_from_slice(header);
                block.extend(tx_count);
                block.extend_from_slice(secondary);
                block.extend_from_slice(&self.transactions);
                block.extend(self.template.vote_data()?);
            }
            GenerationTransaction::Final(coinbase) => {
                check_header_len(header, EquihashHeader::SIZE)?;
                block.extend_from_slice(header);
                block.extend_from_slice(secondary);
                block.extend(tx_count);
                block.extend_from_slice(&coinbase.raw);
                block.extend_from_slice(&self.transactions);
            }
        }
        Ok(block)
    }

    /// Record a submission; returns `true` the first time this exact
    /// (case-insensitive) combination is seen on this job.
    pub fn register_submit(&self, parts: &[&str]) -> bool {
        let submission = parts.concat().to_lowercase();
        self.submits.lock().insert(submission)
    }

    /// Job parameters, computed on first use and cached.
    pub fn job_params(&self) -> &JobParams {
        self.job_params.get_or_init(|| self.compute_job_params())
    }

    /// Cached parameters with `clean_jobs` cleared, for refreshing a job
    /// without invalidating miners' work.
    pub fn updated_job_params(&self) -> JobParams {
        self.job_params().clone().with_clean_jobs(false)
    }

    fn compute_job_params(&self) -> JobParams {
        let tpl = &self.template;
        match &self.generation {
            GenerationTransaction::Split(split) => JobParams::Default {
                job_id: self.job_id.clone(),
                prev_hash: self.prev_hash_reversed_hex(),
                coinbase1: split.coinbase1_hex(),
                coinbase2: split.coinbase2_hex(),
                merkle_branch: self.merkle.branch_hex(),
                version: hex::encode(tpl.version.to_be_bytes()),
                bits: tpl.bits.clone(),
                time: hex::encode(tpl.curtime.to_be_bytes()),
                clean_jobs: true,
            },
            GenerationTransaction::Final(_) => JobParams::Equihash {
                job_id: self.job_id.clone(),
                version: hex::encode(tpl.version.to_le_bytes()),
                prev_hash: self.prev_hash_reversed_hex(),
                merkle_root: hex::encode(self.merkle_root.unwrap_or_default()),
                hash_reserved: hex::encode(self.hash_reserved),
                time: hex::encode(tpl.curtime.to_le_bytes()),
                bits: hex::encode(self.bits.to_le_bytes()),
                clean_jobs: true,
            },
        }
    }
}

fn check_header_len(header: &[u8], expected: usize) -> Result<(), PoolError> {
    if header.len() != expected {
        return Err(PoolError::validation(
            "header",
            format!("expected {} bytes, got {}", expected, header.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    const PREV: &str = "0000000000000000000590fc0f3eba193a278534220b2b37e9849e1a770ca959";

    fn config() -> PoolConfig {
        PoolConfig::from_toml_str(
            r#"
            algorithm = "sha256"
            pool_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
            [network]
            pub_key_hash = "00"
            script_hash = "05"
            "#,
        )
        .unwrap()
    }

    fn template(txs: serde_json::Value) -> RawTemplate {
        RawTemplate::from_json(json!({
            "height": 700000,
            "version": 536870912,
            "previousblockhash": PREV,
            "bits": "1d00ffff",
            "curtime": 1631309839,
            "coinbasevalue": 625000000,
            "transactions": txs
        }))
        .unwrap()
    }

    fn job() -> BlockTemplate {
        let txs = json!([
            { "data": "aa", "txid": "11".repeat(32) },
            { "data": "bbcc", "hash": "22".repeat(32) }
        ]);
        BlockTemplate::new("1", template(txs), 8, &config()).unwrap()
    }

    #[test]
    fn test_target_and_difficulty() {
        let job = job();
        assert_eq!(job.difficulty(), 1.0);
        assert_eq!(job.target(), &target::target_from_bits(0x1d00ffff));

        let mut tpl = template(json!([]));
        tpl.target = Some(format!("{}{}", "00000000", "ff".repeat(28)));
        let job = BlockTemplate::new("2", tpl, 8, &config()).unwrap();
        assert!(job.difficulty() < 1.0);
    }

    #[test]
    fn test_job_params_layout() {
        let job = job();
        let params = job.job_params().to_json();
        let array = params.as_array().unwrap();
        assert_eq!(array.len(), 9);
        assert_eq!(array[0], "1");
        let prev = codec::decode_fixed::<32>("prev", PREV).unwrap();
        assert_eq!(array[1], hex::encode(codec::reverse_word_order(&prev)));
        assert_eq!(array[4].as_array().unwrap().len(), 2);
        assert_eq!(array[4][0], "11".repeat(32));
        assert_eq!(array[5], "20000000");
        assert_eq!(array[6], "1d00ffff");
        assert_eq!(array[7], hex::encode(1631309839u32.to_be_bytes()));
        assert_eq!(array[8], true);
    }

    #[test]
    fn test_job_params_memoized() {
        let job = Arc::new(job());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let job = Arc::clone(&job);
                thread::spawn(move || job.job_params() as *const JobParams as usize)
            })
            .collect();
        let addresses: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(addresses.len(), 1);

        let updated = job.updated_job_params();
        assert!(!updated.clean_jobs());
        assert!(job.job_params().clean_jobs());
        assert_eq!(updated.clone().with_clean_jobs(true), *job.job_params());
    }

    #[test]
    fn test_register_submit() {
        let job = job();
        assert!(job.register_submit(&["AABB", "01", "ff"]));
        assert!(!job.register_submit(&["aabb", "01", "FF"]));
        assert!(job.register_submit(&["aabb", "02", "ff"]));

        let fresh = BlockTemplate::new("2", template(json!([])), 8, &config()).unwrap();
        assert!(fresh.register_submit(&["AABB", "01", "ff"]));
    }

    #[test]
    fn test_concurrent_submits_first_writer_wins() {
        let job = Arc::new(job());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let job = Arc::clone(&job);
                thread::spawn(move || job.register_submit(&["deadbeef"]))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_block_serialization() {
        let job = job();
        let coinbase = job.serialize_coinbase(&[1; 4], &[2; 4]).unwrap();
        let root = job.merkle_root_with(&coinbase);
        let header = job.serialize_header(root, "6130000f", "00000001").unwrap();
        assert_eq!(header.len(), 80);

        let parsed = DefaultHeader::from_bytes(&header).unwrap();
        assert_eq!(parsed.merkle_root, root);
        assert_eq!(parsed.time, 0x6130_000f);
        assert_eq!(parsed.nonce, 1);
        assert_eq!(parsed.version, 0x2000_0000);
        let mut display = parsed.prev_hash;
        display.reverse();
        assert_eq!(hex::encode(display), PREV);

        let block = job.serialize_block(&header, &coinbase).unwrap();
        assert_eq!(&block[..80], header.as_slice());
        assert_eq!(block[80], 3);
        assert_eq!(&block[81..81 + coinbase.len()], coinbase.as_slice());
        assert_eq!(&block[81 + coinbase.len()..], &[0xaa, 0xbb, 0xcc]);

        assert!(job.serialize_block(&header[..79], &coinbase).is_err());
    }

    #[test]
    fn test_coinbase_extranonce_size() {
        let job = job();
        assert!(matches!(
            job.serialize_coinbase(&[1; 4], &[2; 5]),
            Err(PoolError::ExtraNonceSizeMismatch { expected: 8, got: 9 })
        ));
    }

    fn equihash_job() -> BlockTemplate {
        let config = PoolConfig::from_toml_str(&format!(
            r#"
            algorithm = "equihash"
            pool_address = "{}"
            [network]
            pub_key_hash = "1cb8"
            script_hash = "1cbd"
            [coin]
            sapling = 0
            "#,
            "33".repeat(20)
        ))
        .unwrap();
        let tpl = RawTemplate::from_json(json!({
            "height": 500000,
            "version": 4,
            "previousblockhash": PREV,
            "bits": "1c0168fd",
            "curtime": 1558000000,
            "coinbasevalue": 1000000000,
            "finalsaplingroothash": format!("{}01", "00".repeat(31)),
            "transactions": [{ "data": "dd", "hash": "44".repeat(32) }]
        }))
        .unwrap();
        BlockTemplate::new("a", tpl, 8, &config).unwrap()
    }

    #[test]
    fn test_equihash_job() {
        let job = equihash_job();
        let coinbase = job.generation().as_final().unwrap().clone();
        let root = job.merkle_root().unwrap();
        assert_eq!(root, crate::merkle::root(&[coinbase.txid, [0x44; 32]]).unwrap());
        assert_eq!(job.hash_reserved()[0], 0x01);
        assert!(job.serialize_coinbase(&[0; 4], &[0; 4]).is_err());

        let params = job.job_params().to_json();
        let array = params.as_array().unwrap();
        assert_eq!(array.len(), 8);
        assert_eq!(array[1], "04000000");
        assert_eq!(array[3], hex::encode(root));
        assert_eq!(array[4], hex::encode(job.hash_reserved()));
        assert_eq!(array[5], hex::encode(1558000000u32.to_le_bytes()));
        assert_eq!(array[6], "fd68011c");
        assert_eq!(array[7], true);

        let header = job
            .serialize_header(root, &hex::encode(1558000000u32.to_le_bytes()), &"ab".repeat(32))
            .unwrap();
        let parsed = EquihashHeader::from_bytes(&header).unwrap();
        assert_eq!(parsed.time, 1558000000);
        assert_eq!(parsed.bits, 0x1c0168fd);
        assert_eq!(parsed.hash_reserved, job.hash_reserved());
        assert_eq!(hex::encode(parsed.prev_hash), array[2].as_str().unwrap());

        let solution = [0xfd, 0x40, 0x05];
        let block = job.serialize_block(&header, &solution).unwrap();
        assert_eq!(&block[140..143], &solution);
        assert_eq!(block[143], 2);
        assert_eq!(&block[144..144 + coinbase.raw.len()], coinbase.raw.as_slice());
        assert_eq!(block.last(), Some(&0xdd));
    }
}
