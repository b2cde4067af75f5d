//! Daemon `getblocktemplate` document.
//!
//! Only the fields the block core reads are typed; everything else (including
//! the coin-specific reward field) is kept in [`RawTemplate::extra`].

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::codec;
use crate::error::PoolError;

/// A non-coinbase transaction from the template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateTransaction {
    /// Raw transaction, hex.
    pub data: String,
    /// Transaction id (display order), preferred over `hash` when present.
    #[serde(default)]
    pub txid: Option<String>,
    /// Transaction hash (display order); the wtxid on segwit daemons.
    #[serde(default)]
    pub hash: Option<String>,
}

impl TemplateTransaction {
    /// The id used for merkle construction, in internal byte order.
    pub fn merkle_hash(&self) -> Result<[u8; 32], PoolError> {
        let display = self
            .txid
            .as_deref()
            .or(self.hash.as_deref())
            .ok_or_else(|| PoolError::validation("transactions", "transaction without txid or hash"))?;
        codec::hash_from_display("transactions.txid", display)
    }
}

/// Coinbase auxiliary data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoinbaseAux {
    #[serde(default)]
    pub flags: Option<String>,
}

/// A daemon-mandated payee (masternode, superblock or generic payee).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payee {
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
    pub amount: u64,
}

/// `masternode` may be a single object or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MasternodePayees {
    Single(Payee),
    List(Vec<Payee>),
}

impl MasternodePayees {
    pub fn as_slice(&self) -> &[Payee] {
        match self {
            MasternodePayees::Single(p) => std::slice::from_ref(p),
            MasternodePayees::List(list) => list,
        }
    }
}

/// Pre-built coinbase supplied by some daemons; only its version is used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinbaseTxn {
    pub data: String,
}

/// The block template returned by the daemon.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawTemplate {
    pub height: u64,
    pub version: u32,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,
    pub bits: String,
    pub curtime: u32,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TemplateTransaction>,
    #[serde(default, rename = "coinbaseaux")]
    pub coinbase_aux: CoinbaseAux,
    #[serde(default)]
    pub masternode_payments: bool,
    #[serde(default)]
    pub votes: Vec<String>,
    #[serde(default)]
    pub masternode: Option<MasternodePayees>,
    #[serde(default)]
    pub superblock: Vec<Payee>,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub payee_amount: Option<u64>,
    #[serde(default)]
    pub default_witness_commitment: Option<String>,
    #[serde(default, rename = "coinbasetxn")]
    pub coinbase_txn: Option<CoinbaseTxn>,
    #[serde(default)]
    pub coinbase_payload: Option<String>,
    #[serde(default)]
    pub finalsaplingroothash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawTemplate {
    /// Deserialize a template from the daemon's JSON result.
    pub fn from_json(value: Value) -> Result<Self, PoolError> {
        serde_json::from_value(value).map_err(|e| PoolError::validation("template", e.to_string()))
    }

    /// Read the reward amount from the coin-configured field.
    pub fn reward(&self, field: &str) -> Result<u64, PoolError> {
        let value = self
            .extra
            .get(field)
            .ok_or_else(|| PoolError::validation("reward", format!("missing field {}", field)))?;
        value
            .as_u64()
            .ok_or_else(|| PoolError::validation("reward", format!("{} is not a non-negative integer", value)))
    }

    /// `bits` as a compact target.
    pub fn bits_u32(&self) -> Result<u32, PoolError> {
        codec::decode_fixed::<4>("bits", &self.bits).map(u32::from_be_bytes)
    }

    /// Previous block hash in display (RPC) byte order.
    pub fn previous_hash_display(&self) -> Result<[u8; 32], PoolError> {
        codec::decode_fixed::<32>("previousblockhash", &self.previous_block_hash)
    }

    /// Concatenated raw bytes of every non-coinbase transaction.
    pub fn transaction_bytes(&self) -> Result<Vec<u8>, PoolError> {
        let mut out = Vec::new();
        for tx in &self.transactions {
            out.extend(codec::decode_hex("transactions.data", &tx.data)?);
        }
        Ok(out)
    }

    /// Non-coinbase transaction ids in internal byte order.
    pub fn transaction_hashes(&self) -> Result<Vec<[u8; 32]>, PoolError> {
        self.transactions.iter().map(TemplateTransaction::merkle_hash).collect()
    }

    /// Masternode vote payload: count-prefixed raw votes, empty unless the
    /// template has masternode payments enabled.
    pub fn vote_data(&self) -> Result<Vec<u8>, PoolError> {
        if !self.masternode_payments {
            return Ok(Vec::new());
        }
        let mut out = codec::varint(self.votes.len() as u64);
        for vote in &self.votes {
            out.extend(codec::decode_hex("votes", vote)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "height": 700000,
            "version": 536870912,
            "previousblockhash": "0000000000000000000590fc0f3eba193a278534220b2b37e9849e1a770ca959",
            "bits": "170e2632",
            "curtime": 1631309839,
            "coinbasevalue": 625000000,
            "coinbaseaux": { "flags": "" },
            "transactions": []
        })
    }

    #[test]
    fn test_parse_minimal_template() {
        let tpl = RawTemplate::from_json(minimal()).unwrap();
        assert_eq!(tpl.height, 700_000);
        assert_eq!(tpl.reward("coinbasevalue").unwrap(), 625_000_000);
        assert_eq!(tpl.bits_u32().unwrap(), 0x170e2632);
        assert!(tpl.masternode.is_none());
        assert!(tpl.vote_data().unwrap().is_empty());
    }

    #[test]
    fn test_custom_reward_field() {
        let mut value = minimal();
        value["blockreward"] = json!(1234);
        let tpl = RawTemplate::from_json(value).unwrap();
        assert_eq!(tpl.reward("blockreward").unwrap(), 1234);
        assert!(matches!(
            tpl.reward("missing"),
            Err(PoolError::Validation { field: "reward", .. })
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("bits");
        assert!(matches!(
            RawTemplate::from_json(value),
            Err(PoolError::Validation { field: "template", .. })
        ));
    }

    #[test]
    fn test_masternode_shapes() {
        let mut value = minimal();
        value["masternode"] = json!({ "payee": "addr", "amount": 5 });
        let tpl = RawTemplate::from_json(value.clone()).unwrap();
        assert_eq!(tpl.masternode.unwrap().as_slice().len(), 1);

        value["masternode"] = json!([
            { "payee": "a", "amount": 1 },
            { "script": "51", "amount": 2 }
        ]);
        let tpl = RawTemplate::from_json(value).unwrap();
        let payees = tpl.masternode.unwrap();
        assert_eq!(payees.as_slice().len(), 2);
        assert_eq!(payees.as_slice()[1].script.as_deref(), Some("51"));
    }

    #[test]
    fn test_transaction_hash_prefers_txid() {
        let tx = TemplateTransaction {
            data: "00".into(),
            txid: Some(format!("{}01", "00".repeat(31))),
            hash: Some("ff".repeat(32)),
        };
        let hash = tx.merkle_hash().unwrap();
        assert_eq!(hash[0], 0x01);

        let bare = TemplateTransaction {
            data: "00".into(),
            txid: None,
            hash: None,
        };
        assert!(bare.merkle_hash().is_err());
    }

    #[test]
    fn test_vote_data() {
        let mut value = minimal();
        value["masternode_payments"] = json!(true);
        value["votes"] = json!(["aabb", "cc"]);
        let tpl = RawTemplate::from_json(value).unwrap();
        assert_eq!(tpl.vote_data().unwrap(), vec![0x02, 0xaa, 0xbb, 0xcc]);
    }
}
