//! Pool configuration.
//!
//! [`PoolSettings`] is the raw, deserializable form (TOML or JSON).
//! [`PoolConfig::from_settings`] validates it once at load time, selects the
//! [`Algorithm`] family and compiles every configured address, so that job
//! construction never re-parses configuration.
//!
//! ```toml
//! algorithm = "equihash"
//! pool_address = "t1..."
//! identifier = "example pool"
//!
//! [network]
//! pub_key_hash = "1cb8"
//! script_hash = "1cbd"
//!
//! [[recipients]]
//! address = "t1..."
//! fraction = 0.01
//!
//! [rewards]
//! variant = "equihash-rewards2"
//! [rewards.tracks.treasury]
//! start_height = 0
//! end_height = 1000000
//! interval = 5
//! fraction = 0.1
//! recipients = ["t3..."]
//! ```

use std::collections::BTreeMap;

use bitcoin::ScriptBuf;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::error::PoolError;
use crate::rewards::{RewardSchedule, RewardScheduleVariant, RewardTrack};
use crate::script;

/// Default pool identifier written into every coinbase.
pub const DEFAULT_IDENTIFIER: &str = "rust-blocktemplate";

/// Template field holding the block reward when a coin does not override it.
pub const DEFAULT_REWARD_FIELD: &str = "coinbasevalue";

/// The block-format family a coin belongs to.
///
/// Selected once at configuration load; every later operation matches on it
/// instead of re-reading the algorithm name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Bitcoin-derived block format: 80-byte header, split coinbase.
    Default,
    /// Equihash/Zcash-derived block format: 140-byte header, finished coinbase.
    Equihash,
}

impl Algorithm {
    /// Hashing algorithms that share the Bitcoin block format.
    pub const DEFAULT_FAMILY: &'static [&'static str] = &[
        "sha256", "sha256d", "scrypt", "x11", "x13", "x15", "x16r", "x16rv2", "lyra2rev2",
        "lyra2rev3", "quark", "qubit", "groestl", "keccak", "blake", "blake2s", "skein", "nist5",
        "c11", "yescrypt", "neoscrypt", "default",
    ];

    /// Map a configured algorithm name onto its family.
    pub fn from_name(name: &str) -> Result<Self, PoolError> {
        let name = name.trim().to_ascii_lowercase();
        if name == "equihash" {
            return Ok(Algorithm::Equihash);
        }
        if Self::DEFAULT_FAMILY.contains(&name.as_str()) {
            return Ok(Algorithm::Default);
        }
        Err(PoolError::UnsupportedAlgorithm(name))
    }
}

/// Base58 version prefixes and bech32 HRP of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    pub_key_hash: Vec<u8>,
    script_hash: Vec<u8>,
    bech32: Option<String>,
}

impl NetworkParams {
    /// Build network parameters from raw version prefixes.
    pub fn new(pub_key_hash: Vec<u8>, script_hash: Vec<u8>, bech32: Option<String>) -> Self {
        Self {
            pub_key_hash,
            script_hash,
            bech32,
        }
    }

    /// Bitcoin mainnet.
    pub fn bitcoin() -> Self {
        Self::new(vec![0x00], vec![0x05], Some("bc".into()))
    }

    /// Bitcoin testnet.
    pub fn bitcoin_testnet() -> Self {
        Self::new(vec![0x6f], vec![0xc4], Some("tb".into()))
    }

    /// Zcash mainnet transparent addresses (`t1` / `t3`).
    pub fn zcash() -> Self {
        Self::new(vec![0x1c, 0xb8], vec![0x1c, 0xbd], None)
    }

    /// Zcash testnet transparent addresses (`tm` / `t2`).
    pub fn zcash_testnet() -> Self {
        Self::new(vec![0x1d, 0x25], vec![0x1c, 0xba], None)
    }

    /// Pay-to-pubkey-hash version prefix.
    pub fn pub_key_hash(&self) -> &[u8] {
        &self.pub_key_hash
    }

    /// Pay-to-script-hash version prefix.
    pub fn script_hash(&self) -> &[u8] {
        &self.script_hash
    }

    /// Segwit human-readable part, if the network has one.
    pub fn bech32_hrp(&self) -> Option<&str> {
        self.bech32.as_deref()
    }
}

/// Coin-specific switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoinOptions {
    /// Template field carrying the reward amount.
    pub reward_field: String,
    /// Coin supports transaction messages (version 2 coinbase + comment).
    pub tx_messages: bool,
    /// Overwinter activation height (Equihash family). `Some(0)` means
    /// active from genesis, `None` means never active.
    pub overwinter: Option<u64>,
    /// Sapling activation height (Equihash family), with the same meaning
    /// of `Some(0)` and `None` as `overwinter`.
    pub sapling: Option<u64>,
}

impl Default for CoinOptions {
    fn default() -> Self {
        Self {
            reward_field: DEFAULT_REWARD_FIELD.to_string(),
            tx_messages: false,
            overwinter: None,
            sapling: None,
        }
    }
}

/// Raw network section: hex version prefixes.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    pub pub_key_hash: String,
    pub script_hash: String,
    #[serde(default)]
    pub bech32: Option<String>,
}

/// Raw fee recipient entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientSettings {
    pub address: String,
    pub fraction: Decimal,
}

/// Raw reward track entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackSettings {
    pub start_height: u64,
    pub end_height: u64,
    pub interval: u64,
    pub fraction: Decimal,
    pub recipients: Vec<String>,
}

/// Raw reward schedule section.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardSettings {
    pub variant: String,
    #[serde(default)]
    pub tracks: BTreeMap<String, TrackSettings>,
}

/// Deserializable pool settings, prior to validation.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    pub algorithm: String,
    pub network: NetworkSettings,
    pub pool_address: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub recipients: Vec<RecipientSettings>,
    #[serde(default)]
    pub coin: CoinOptions,
    #[serde(default)]
    pub rewards: Option<RewardSettings>,
}

impl PoolSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, PoolError> {
        toml::from_str(input).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Parse settings from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PoolError> {
        serde_json::from_value(value).map_err(|e| PoolError::Config(e.to_string()))
    }
}

/// A fee recipient with its compiled output script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRecipient {
    pub address: String,
    pub script: ScriptBuf,
    /// Share of the reward in `[0, 1]`.
    pub fraction: Decimal,
}

/// Validated, immutable pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub algorithm: Algorithm,
    pub network: NetworkParams,
    pub pool_address: String,
    pub pool_script: ScriptBuf,
    pub identifier: String,
    pub recipients: Vec<FeeRecipient>,
    pub coin: CoinOptions,
    pub rewards: Option<RewardSchedule>,
}

impl PoolConfig {
    /// Validate raw settings and compile every address.
    ///
    /// # Errors
    ///
    /// - [`PoolError::UnsupportedAlgorithm`] for an unknown algorithm name
    /// - [`PoolError::ScriptCompilation`] for an address that does not compile
    /// - [`PoolError::Config`] for fractions out of range or a malformed
    ///   reward schedule
    pub fn from_settings(settings: PoolSettings) -> Result<Self, PoolError> {
        let algorithm = Algorithm::from_name(&settings.algorithm)?;

        let network = NetworkParams::new(
            decode_prefix("network.pub_key_hash", &settings.network.pub_key_hash)?,
            decode_prefix("network.script_hash", &settings.network.script_hash)?,
            settings.network.bech32.clone(),
        );

        let pool_script = script::compile_address(&settings.pool_address, &network)?;

        let recipients = settings
            .recipients
            .iter()
            .map(|r| {
                check_fraction(&r.address, r.fraction)?;
                Ok(FeeRecipient {
                    address: r.address.clone(),
                    script: script::compile_address(&r.address, &network)?,
                    fraction: r.fraction,
                })
            })
            .collect::<Result<Vec<_>, PoolError>>()?;
        if recipients.is_empty() {
            warn!("no fee recipients configured, no pool fees will be taken");
        }

        let rewards = settings
            .rewards
            .as_ref()
            .map(|r| build_schedule(r, &network))
            .transpose()?;
        if rewards.is_some() && algorithm == Algorithm::Default {
            warn!("reward schedules only apply to the equihash family and will be ignored");
        }

        let fee_total: Decimal = recipients.iter().map(|r| r.fraction).sum();
        let track_total = rewards
            .as_ref()
            .map(RewardSchedule::total_fraction)
            .unwrap_or(Decimal::ZERO);
        if fee_total + track_total > Decimal::ONE {
            return Err(PoolError::Config(format!(
                "fee fractions ({}) and reward tracks ({}) exceed the whole reward",
                fee_total, track_total
            )));
        }

        Ok(Self {
            algorithm,
            network,
            pool_address: settings.pool_address,
            pool_script,
            identifier: settings
                .identifier
                .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string()),
            recipients,
            coin: settings.coin,
            rewards,
        })
    }

    /// Load and validate a TOML configuration document.
    pub fn from_toml_str(input: &str) -> Result<Self, PoolError> {
        Self::from_settings(PoolSettings::from_toml_str(input)?)
    }

    /// Sum of all fee-recipient fractions.
    pub fn fee_fraction(&self) -> Decimal {
        self.recipients.iter().map(|r| r.fraction).sum()
    }
}

fn build_schedule(settings: &RewardSettings, network: &NetworkParams) -> Result<RewardSchedule, PoolError> {
    let variant = RewardScheduleVariant::from_name(&settings.variant)?;
    let tracks = variant
        .track_names()
        .iter()
        .map(|name| {
            let track = settings.tracks.get(*name).ok_or_else(|| {
                PoolError::Config(format!(
                    "reward variant {} requires a `{}` track",
                    settings.variant, name
                ))
            })?;
            check_fraction(name, track.fraction)?;
            let scripts = track
                .recipients
                .iter()
                .map(|a| script::compile_address(a, network))
                .collect::<Result<Vec<_>, _>>()?;
            RewardTrack::new(
                *name,
                scripts,
                track.fraction,
                track.start_height,
                track.end_height,
                track.interval,
            )
        })
        .collect::<Result<Vec<_>, PoolError>>()?;
    Ok(RewardSchedule::new(variant, tracks))
}

fn check_fraction(owner: &str, fraction: Decimal) -> Result<(), PoolError> {
    if fraction < Decimal::ZERO || fraction > Decimal::ONE {
        return Err(PoolError::Config(format!(
            "fraction {} for {} is outside [0, 1]",
            fraction, owner
        )));
    }
    Ok(())
}

fn decode_prefix(field: &'static str, value: &str) -> Result<Vec<u8>, PoolError> {
    let bytes = hex::decode(value).map_err(|e| PoolError::Config(format!("{}: {}", field, e)))?;
    if bytes.is_empty() || bytes.len() > 2 {
        return Err(PoolError::Config(format!(
            "{}: version prefix must be 1 or 2 bytes",
            field
        )));
    }
    Ok(bytes)
}
