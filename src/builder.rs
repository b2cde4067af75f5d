//! Fluent builder for generation (coinbase) transactions.
//!
//! [`GenerationBuilder`] turns a daemon template plus the pool configuration
//! into the pool's coinbase. The Bitcoin-like family produces a
//! [`CoinbaseSplit`] with a reserved extranonce slot; the Equihash family
//! produces a finished transparent transaction.
//!
//! # Examples
//!
//! ```
//! use rust_blocktemplate::{GenerationBuilder, GenerationTransaction, PoolConfig, RawTemplate};
//!
//! let config = PoolConfig::from_toml_str(r#"
//!     algorithm = "sha256"
//!     pool_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
//!     [network]
//!     pub_key_hash = "00"
//!     script_hash = "05"
//! "#).unwrap();
//!
//! let template = RawTemplate::from_json(serde_json::json!({
//!     "height": 700000,
//!     "version": 536870912,
//!     "previousblockhash": "0000000000000000000590fc0f3eba193a278534220b2b37e9849e1a770ca959",
//!     "bits": "170e2632",
//!     "curtime": 1631309839,
//!     "coinbasevalue": 625000000
//! })).unwrap();
//!
//! let generation = GenerationBuilder::new(&template, &config)
//!     .placeholder_len(8)
//!     .build()
//!     .unwrap();
//!
//! assert!(matches!(generation, GenerationTransaction::Split(_)));
//! ```

use bitcoin::consensus::encode;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, TxIn, TxOut, Witness};
use rust_decimal::Decimal;
use tracing::debug;

use crate::codec;
use crate::config::{Algorithm, PoolConfig};
use crate::error::PoolError;
use crate::rewards;
use crate::script;
use crate::split::CoinbaseSplit;
use crate::template::RawTemplate;
use crate::validation;
use crate::witness;
use crate::zcash::{TxVersion, ZcashTransaction};

/// Extranonce slot reserved when the caller does not choose one.
pub const DEFAULT_PLACEHOLDER_LEN: usize = 8;

const DIP2_COINBASE_TYPE: u32 = 5;

/// A finished coinbase with no splice point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalCoinbase {
    pub raw: Vec<u8>,
    /// Transaction id, internal byte order.
    pub txid: [u8; 32],
}

impl FinalCoinbase {
    pub fn hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// Transaction id in display (RPC) order.
    pub fn txid_hex(&self) -> String {
        hex::encode(codec::reverse_bytes(&self.txid))
    }
}

/// The pool's coinbase, in the shape its family needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationTransaction {
    /// Prefix/suffix pair; the extranonce is spliced in between.
    Split(CoinbaseSplit),
    /// Fully built transaction.
    Final(FinalCoinbase),
}

impl GenerationTransaction {
    pub fn as_split(&self) -> Option<&CoinbaseSplit> {
        match self {
            GenerationTransaction::Split(split) => Some(split),
            GenerationTransaction::Final(_) => None,
        }
    }

    pub fn as_final(&self) -> Option<&FinalCoinbase> {
        match self {
            GenerationTransaction::Split(_) => None,
            GenerationTransaction::Final(tx) => Some(tx),
        }
    }
}

/// Builder for the pool's generation transaction.
///
/// Defaults:
/// - Extranonce placeholder: [`DEFAULT_PLACEHOLDER_LEN`] bytes
/// - ScriptSig time: the template's `curtime`
#[derive(Debug, Clone)]
pub struct GenerationBuilder<'a> {
    template: &'a RawTemplate,
    config: &'a PoolConfig,
    placeholder_len: usize,
    time: u32,
}

impl<'a> GenerationBuilder<'a> {
    pub fn new(template: &'a RawTemplate, config: &'a PoolConfig) -> Self {
        Self {
            template,
            config,
            placeholder_len: DEFAULT_PLACEHOLDER_LEN,
            time: template.curtime,
        }
    }

    /// Set the size of the extranonce slot (extranonce1 + extranonce2).
    ///
    /// Ignored by the Equihash family.
    pub fn placeholder_len(mut self, len: usize) -> Self {
        self.placeholder_len = len;
        self
    }

    /// Override the time written into the default-family scriptSig.
    pub fn time(mut self, time: u32) -> Self {
        self.time = time;
        self
    }

    /// Build the generation transaction.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Validation`] for missing or malformed template fields
    /// - [`PoolError::ScriptCompilation`] for a payee that does not compile
    /// - [`PoolError::RewardAccounting`] if the payouts exceed the reward
    pub fn build(&self) -> Result<GenerationTransaction, PoolError> {
        let reward = self.reward()?;
        let outputs = self.outputs()?;
        match self.config.algorithm {
            Algorithm::Default => validation::ensure_outputs(&outputs, reward)?,
            Algorithm::Equihash => validation::ensure_outputs_within(&outputs, reward)?,
        }

        let generation = match self.config.algorithm {
            Algorithm::Default => GenerationTransaction::Split(self.build_split(outputs)?),
            Algorithm::Equihash => GenerationTransaction::Final(self.build_final(outputs)?),
        };

        debug!(
            height = self.template.height,
            algorithm = ?self.config.algorithm,
            reward,
            "built generation transaction"
        );
        Ok(generation)
    }

    /// Coinbase outputs in their final order.
    pub fn outputs(&self) -> Result<Vec<TxOut>, PoolError> {
        let reward = self.reward()?;
        match self.config.algorithm {
            Algorithm::Default => self.default_outputs(reward),
            Algorithm::Equihash => self.equihash_outputs(reward),
        }
    }

    /// Transaction version word, including the special-transaction type.
    pub fn version(&self) -> Result<u32, PoolError> {
        let mut version = if self.config.coin.tx_messages { 2 } else { 1 };
        let coinbase_txn = self
            .template
            .coinbase_txn
            .as_ref()
            .filter(|txn| !txn.data.is_empty());

        if let Some(txn) = coinbase_txn {
            let prefix = txn.data.get(..8).ok_or_else(|| {
                PoolError::validation("coinbasetxn.data", "shorter than a version field")
            })?;
            version = codec::decode_fixed::<4>("coinbasetxn.data", prefix).map(u32::from_le_bytes)?;
        }

        let mut tx_type = 0;
        if self.payload()?.is_some() {
            version = 3;
            tx_type = DIP2_COINBASE_TYPE;
        }
        if coinbase_txn.is_none() {
            version += tx_type << 16;
        }
        Ok(version)
    }

    fn reward(&self) -> Result<u64, PoolError> {
        self.template.reward(&self.config.coin.reward_field)
    }

    fn payload(&self) -> Result<Option<Vec<u8>>, PoolError> {
        match self.template.coinbase_payload.as_deref() {
            Some(p) if !p.is_empty() => codec::decode_hex("coinbase_payload", p).map(Some),
            _ => Ok(None),
        }
    }

    fn default_outputs(&self, total: u64) -> Result<Vec<TxOut>, PoolError> {
        let network = &self.config.network;
        let mut reward = total;
        let mut to_pool = total;
        let mut outputs = Vec::new();

        let mandatory = self
            .template
            .masternode
            .iter()
            .flat_map(|m| m.as_slice())
            .map(|p| ("masternode", p))
            .chain(self.template.superblock.iter().map(|p| ("superblock", p)));
        for (kind, payee) in mandatory {
            let script = script::resolve_payee(payee.payee.as_deref(), payee.script.as_deref(), network)?;
            reward = validation::deduct(reward, payee.amount, kind)?;
            to_pool = validation::deduct(to_pool, payee.amount, kind)?;
            outputs.push(output(script, payee.amount));
        }

        if let Some(payee) = self.template.payee.as_deref() {
            let amount = self.template.payee_amount.unwrap_or_else(|| reward.div_ceil(5));
            let script = script::compile_address(payee, network)?;
            reward = validation::deduct(reward, amount, "payee")?;
            to_pool = validation::deduct(to_pool, amount, "payee")?;
            outputs.push(output(script, amount));
        }

        // Each recipient's fraction applies to what the previous ones left.
        for recipient in &self.config.recipients {
            let amount = rewards::fraction_of(reward, recipient.fraction)?;
            reward = validation::deduct(reward, amount, &recipient.address)?;
            to_pool = validation::deduct(to_pool, amount, &recipient.address)?;
            outputs.push(output(recipient.script.clone(), amount));
        }

        outputs.insert(0, output(self.config.pool_script.clone(), to_pool));

        if let Some(commitment) = self.template.default_witness_commitment.as_deref() {
            outputs.insert(0, witness::commitment_output(commitment)?);
        }
        Ok(outputs)
    }

    fn equihash_outputs(&self, reward: u64) -> Result<Vec<TxOut>, PoolError> {
        let height = self.template.height;
        let mut side = Vec::new();

        // Every configured track is carved out of the pool share, active or not.
        let mut carved = Decimal::ZERO;
        if let Some(schedule) = &self.config.rewards {
            carved += schedule.total_fraction();
            for payout in schedule.payouts(height, reward)? {
                side.push(output(payout.script, payout.amount));
            }
        }

        for recipient in &self.config.recipients {
            carved += recipient.fraction;
            let amount = rewards::fraction_of(reward, recipient.fraction)?;
            side.push(output(recipient.script.clone(), amount));
        }

        let to_pool = rewards::fraction_of(reward, Decimal::ONE - carved).map_err(|_| {
            PoolError::RewardAccounting(format!(
                "reward tracks and fees claim {} of the reward",
                carved
            ))
        })?;

        let mut outputs = Vec::with_capacity(side.len() + 1);
        outputs.push(output(self.config.pool_script.clone(), to_pool));
        outputs.extend(side);
        Ok(outputs)
    }

    fn build_split(&self, outputs: Vec<TxOut>) -> Result<CoinbaseSplit, PoolError> {
        let template = self.template;
        let identifier = self.config.identifier.as_bytes();

        let placeholder = u8::try_from(self.placeholder_len).map_err(|_| {
            PoolError::validation("placeholder_len", "extranonce slot must fit in one byte")
        })?;

        let mut part1 = script::serialize_number(template.height as i64);
        if let Some(flags) = template.coinbase_aux.flags.as_deref() {
            part1.extend(codec::decode_hex("coinbaseaux.flags", flags)?);
        }
        part1.extend(script::serialize_number(i64::from(self.time)));
        part1.push(placeholder);

        let part2 = codec::serialize_string(identifier);

        let script_len = part1.len() + self.placeholder_len + part2.len();
        script::check_script_size(script_len)?;

        let mut coinbase1 = self.version()?.to_le_bytes().to_vec();
        coinbase1.extend(codec::varint(1));
        coinbase1.extend_from_slice(&[0u8; 32]);
        coinbase1.extend_from_slice(&u32::MAX.to_le_bytes());
        coinbase1.extend(codec::varint(script_len as u64));
        coinbase1.extend(part1);

        let mut coinbase2 = part2;
        coinbase2.extend_from_slice(&0u32.to_le_bytes()); // sequence
        coinbase2.extend(encode::serialize(&outputs));
        coinbase2.extend_from_slice(&0u32.to_le_bytes()); // lock time
        if self.config.coin.tx_messages {
            coinbase2.extend(codec::serialize_string(identifier));
        }
        if let Some(payload) = self.payload()? {
            coinbase2.extend(codec::serialize_string(&payload));
        }

        Ok(CoinbaseSplit {
            coinbase1,
            coinbase2,
            placeholder_len: self.placeholder_len,
        })
    }

    fn build_final(&self, outputs: Vec<TxOut>) -> Result<FinalCoinbase, PoolError> {
        let height = self.template.height;
        let tx = ZcashTransaction {
            version: TxVersion::for_height(height, &self.config.coin),
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: script::equihash_coinbase_script(height, &self.config.identifier)?,
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            outputs,
            lock_time: 0,
            expiry_height: 0,
        };
        Ok(FinalCoinbase {
            raw: tx.serialize(),
            txid: tx.txid(),
        })
    }
}

fn output(script_pubkey: ScriptBuf, sats: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(sats),
        script_pubkey,
    }
}
