//! End-to-end job scenarios for both block families.

use bitcoin::consensus::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::Transaction;
use rust_blocktemplate::{
    Algorithm, BlockTemplate, JobManager, PoolConfig, PoolError, RawTemplate,
};
use serde_json::json;

const PREV_HASH: &str = "0000000000000000000590fc0f3eba193a278534220b2b37e9849e1a770ca959";

fn bitcoin_pool() -> PoolConfig {
    PoolConfig::from_toml_str(
        r#"
        algorithm = "sha256"
        pool_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        identifier = "/scenario/"

        [network]
        pub_key_hash = "00"
        script_hash = "05"
        bech32 = "bc"

        [[recipients]]
        address = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        fraction = 0.025
        "#,
    )
    .unwrap()
}

fn block_700000() -> RawTemplate {
    RawTemplate::from_json(json!({
        "height": 700000,
        "version": 536870912,
        "previousblockhash": PREV_HASH,
        "bits": "170e2632",
        "curtime": 1631309839,
        "coinbasevalue": 625000000,
        "coinbaseaux": { "flags": "" },
        "transactions": []
    }))
    .unwrap()
}

#[test]
fn test_block_700000_generation() {
    let config = bitcoin_pool();
    let job = BlockTemplate::new("1", block_700000(), 8, &config).unwrap();

    let raw = job.serialize_coinbase(&[0xaa; 4], &[0xbb; 4]).unwrap();
    let tx: Transaction = deserialize(&raw).unwrap();

    assert!(tx.is_coinbase());
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 609_375_000);
    assert_eq!(tx.output[1].value.to_sat(), 15_625_000);
    assert!(tx.output[1].script_pubkey.is_p2wpkh());

    // The extranonce sits right after the placeholder-length byte.
    let sig = tx.input[0].script_sig.as_bytes();
    let at = sig
        .windows(8)
        .position(|w| w == [0xaa, 0xaa, 0xaa, 0xaa, 0xbb, 0xbb, 0xbb, 0xbb])
        .unwrap();
    assert_eq!(sig[at - 1], 8);

    // No other transactions: the root is the coinbase txid.
    assert_eq!(job.merkle_root_with(&raw), tx.compute_txid().to_byte_array());
}

#[test]
fn test_block_700000_full_block_decodes() {
    let config = bitcoin_pool();
    let job = BlockTemplate::new("1", block_700000(), 8, &config).unwrap();
    let coinbase = job.serialize_coinbase(&[1; 4], &[2; 4]).unwrap();
    let root = job.merkle_root_with(&coinbase);
    let header = job.serialize_header(root, "613c0f0f", "12345678").unwrap();
    let raw = job.serialize_block(&header, &coinbase).unwrap();

    let block: bitcoin::Block = deserialize(&raw).unwrap();
    assert_eq!(block.txdata.len(), 1);
    assert_eq!(block.header.nonce, 0x1234_5678);
    assert_eq!(block.header.time, 0x613c_0f0f);
    assert_eq!(block.header.merkle_root.to_byte_array(), root);
    assert_eq!(block.header.prev_blockhash.to_string(), PREV_HASH);
    assert!(block.check_merkle_root());
}

#[test]
fn test_equihash_treasury_height_one() {
    let config = PoolConfig::from_toml_str(&format!(
        r#"
        algorithm = "equihash"
        pool_address = "{pool}"

        [network]
        pub_key_hash = "1cb8"
        script_hash = "1cbd"

        [[recipients]]
        address = "{fee}"
        fraction = 0.02

        [rewards]
        variant = "equihash-rewards2"

        [rewards.tracks.treasury]
        start_height = 0
        end_height = 10
        interval = 5
        fraction = 0.10
        recipients = ["{treasury}"]
        "#,
        pool = "aa".repeat(20),
        fee = "bb".repeat(20),
        treasury = "cc".repeat(20),
    ))
    .unwrap();
    assert_eq!(config.algorithm, Algorithm::Equihash);

    let schedule = config.rewards.as_ref().unwrap();
    assert_eq!(schedule.tracks()[0].recipient_index(1), Some(0));

    let template = RawTemplate::from_json(json!({
        "height": 1,
        "version": 4,
        "previousblockhash": "0007bc227e1c57a4a70e237cad00e7b7ce565155ab49166bc57397a26d339283",
        "bits": "1f07ffff",
        "curtime": 1477671596,
        "coinbasevalue": 1_250_000_000,
        "transactions": []
    }))
    .unwrap();
    let job = BlockTemplate::new("1", template, 8, &config).unwrap();

    // Legacy (v1) transaction: decodable as a Bitcoin transaction.
    let coinbase = job.generation().as_final().unwrap();
    let tx: Transaction = deserialize(&coinbase.raw).unwrap();
    let amounts: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
    // pool = reward * (1 - 0.10 - 0.02)
    assert_eq!(amounts, vec![1_100_000_000, 125_000_000, 25_000_000]);
    assert_eq!(coinbase.txid, tx.compute_txid().to_byte_array());
    assert_eq!(job.merkle_root(), Some(coinbase.txid));
}

#[test]
fn test_job_lifecycle() {
    let manager = JobManager::new(bitcoin_pool(), 8);
    assert!(manager.current().is_none());
    assert!(manager.process_template(block_700000()).unwrap());

    let job = manager.current().unwrap();
    let params = job.job_params();
    assert!(params.clean_jobs());
    assert_eq!(job.job_params(), params);
    assert_eq!(params.to_json().as_array().unwrap().len(), 9);

    assert!(job.register_submit(&["AA", "bb"]));
    assert!(!job.register_submit(&["aa", "BB"]));

    let refreshed = manager.update_current_job(block_700000()).unwrap();
    assert!(!refreshed.clean_jobs());
    let fresh = manager.current().unwrap();
    assert_ne!(fresh.job_id(), job.job_id());
    assert!(fresh.register_submit(&["aa", "bb"]));
}

#[test]
fn test_unknown_algorithm_refuses_to_start() {
    let err = PoolConfig::from_toml_str(
        r#"
        algorithm = "randomx"
        pool_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        [network]
        pub_key_hash = "00"
        script_hash = "05"
        "#,
    )
    .unwrap_err();
    assert_eq!(err, PoolError::UnsupportedAlgorithm("randomx".into()));
    assert!(err.is_fatal());
}
