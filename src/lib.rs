//! # rust-blocktemplate
//!
//! Block construction for Stratum mining pools.
//!
//! Given a daemon `getblocktemplate` document and the pool configuration,
//! this crate builds the pool's coinbase (generation) transaction, the
//! merkle branch, block headers and full blocks, and the `mining.notify`
//! parameters broadcast to miners. Two block formats are supported: the
//! Bitcoin-like family and the Equihash (Zcash-derived) family.
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_blocktemplate::{BlockTemplate, PoolConfig, RawTemplate};
//!
//! let config = PoolConfig::from_toml_str(r#"
//!     algorithm = "sha256"
//!     pool_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
//!
//!     [network]
//!     pub_key_hash = "00"
//!     script_hash = "05"
//!
//!     [[recipients]]
//!     address = "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"
//!     fraction = 0.025
//! "#).unwrap();
//!
//! let template = RawTemplate::from_json(serde_json::json!({
//!     "height": 700000,
//!     "version": 536870912,
//!     "previousblockhash": "0000000000000000000590fc0f3eba193a278534220b2b37e9849e1a770ca959",
//!     "bits": "170e2632",
//!     "curtime": 1631309839,
//!     "coinbasevalue": 625000000,
//!     "transactions": []
//! })).unwrap();
//!
//! // 4-byte extranonce1 + 4-byte extranonce2.
//! let job = BlockTemplate::new("1", template, 8, &config).unwrap();
//! let notify = job.job_params().to_json();
//! assert_eq!(notify[0], "1");
//!
//! // A miner's share: splice its extranonces and rebuild the header.
//! let coinbase = job.serialize_coinbase(&[0; 4], &[1; 4]).unwrap();
//! let root = job.merkle_root_with(&coinbase);
//! let header = job.serialize_header(root, "613c0f0f", "00000000").unwrap();
//! assert!(job.register_submit(&["00000000", "01010101", "613c0f0f", "00000000"]));
//! let block = job.serialize_block(&header, &coinbase).unwrap();
//! assert_eq!(&block[..80], header.as_slice());
//! ```
//!
//! ## Modules
//!
//! - [`builder`] - Fluent [`GenerationBuilder`] producing the coinbase for either family
//! - [`block_template`] - [`BlockTemplate`] job state, serialization and [`JobParams`]
//! - [`jobs`] - [`JobManager`] job ids and current-job swapping
//! - [`config`] - Validated [`PoolConfig`] loaded from TOML or JSON
//! - [`template`] - [`RawTemplate`], the daemon's block template document
//! - [`rewards`] - Height-windowed founder/treasury reward tracks
//! - [`split`] - Stratum coinbase split model ([`CoinbaseSplit`])
//! - [`zcash`] - Transparent Zcash transaction encoding
//! - [`header`] - 80-byte and 140-byte header encoders
//! - [`merkle`] - Stratum merkle branch
//! - [`target`] - Targets and pool difficulty
//! - [`script`] - Coinbase scriptSig primitives and address compilation
//! - [`witness`] - SegWit witness commitment output (BIP141)
//! - [`validation`] - Reward accounting checks
//! - [`codec`] - Varints, byte-order helpers and hex decoding
//! - [`error`] - Error types

pub mod block_template;
pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod jobs;
pub mod merkle;
pub mod rewards;
pub mod script;
pub mod split;
pub mod target;
pub mod template;
pub mod validation;
pub mod witness;
pub mod zcash;

// Re-export primary types for convenience.
pub use block_template::{BlockTemplate, JobParams};
pub use builder::{FinalCoinbase, GenerationBuilder, GenerationTransaction};
pub use config::{Algorithm, PoolConfig, PoolSettings};
pub use error::PoolError;
pub use header::{BlockHeader, DefaultHeader, EquihashHeader};
pub use jobs::JobManager;
pub use split::CoinbaseSplit;
pub use template::RawTemplate;

// Re-export the bitcoin crate so callers can name script and output types
// without a separate dependency.
pub use bitcoin;
