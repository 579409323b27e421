//! Wire protocol round-trip tests: every message type survives the frame
//! codec unchanged, with the field names the protocol table fixes.

use powchain::constants::*;
use powchain::crypto::Keypair;
use powchain::transaction::{build_transaction, coinbase};
use powchain::types::*;
use powchain::wire::{read_frame, write_frame, CoordinatorMessage, MinerMessage};

fn sample_transaction() -> Transaction {
    let wallet = Keypair::generate();
    build_transaction(
        &[(
            OutPoint {
                tx_id: "ab".repeat(32),
                v_out: 1,
            },
            &wallet,
        )],
        vec![
            TxOutput {
                value: TxValue::Amount(250),
                keyhash: wallet.keyhash(),
            },
            TxOutput {
                value: TxValue::Data("payload".to_string()),
                keyhash: "cd".repeat(20),
            },
        ],
    )
}

fn sample_block() -> Block {
    Block {
        header: BlockHeader {
            version: BLOCK_VERSION,
            parent_hash: GENESIS_HASH.to_string(),
            merkle_root: "12".repeat(32),
            time: 1_700_000_000,
            target: "1effffff".to_string(),
            nonce: 88,
        },
        transactions: vec![coinbase(BLOCK_REWARD, "ef".repeat(20)), sample_transaction()],
    }
}

fn round_trip_coordinator(message: CoordinatorMessage) {
    let mut buf = Vec::new();
    write_frame(&mut buf, &message).unwrap();
    let back: CoordinatorMessage = read_frame(&mut buf.as_slice()).unwrap();
    assert_eq!(message, back);
}

fn round_trip_miner(message: MinerMessage) {
    let mut buf = Vec::new();
    write_frame(&mut buf, &message).unwrap();
    let back: MinerMessage = read_frame(&mut buf.as_slice()).unwrap();
    assert_eq!(message, back);
}

#[test]
fn coordinator_messages_round_trip() {
    round_trip_coordinator(CoordinatorMessage::Transaction {
        transaction: sample_transaction(),
    });
    round_trip_coordinator(CoordinatorMessage::Mine {
        target: "1dffffff".to_string(),
    });
    round_trip_coordinator(CoordinatorMessage::Verify {
        block: sample_block(),
    });
    round_trip_coordinator(CoordinatorMessage::Verdict {
        accept: true,
        block: sample_block(),
    });
    round_trip_coordinator(CoordinatorMessage::Verdict {
        accept: false,
        block: sample_block(),
    });
    round_trip_coordinator(CoordinatorMessage::Chain {
        blockchain: vec![sample_block(), sample_block()],
    });
    round_trip_coordinator(CoordinatorMessage::Chain { blockchain: vec![] });
    round_trip_coordinator(CoordinatorMessage::Keys);
    round_trip_coordinator(CoordinatorMessage::CloseConnection);
}

#[test]
fn miner_messages_round_trip() {
    round_trip_miner(MinerMessage::Solution {
        block: sample_block(),
    });
    round_trip_miner(MinerMessage::Verify { accept: true });
    round_trip_miner(MinerMessage::Verify { accept: false });
    round_trip_miner(MinerMessage::Chain {
        blockchain: vec![sample_block()],
    });
    let wallet = Keypair::generate();
    round_trip_miner(MinerMessage::Keys {
        priv_key: wallet.secret_hex(),
        pub_key: wallet.public_hex(),
    });
}

#[test]
fn several_frames_share_one_stream() {
    let mut buf = Vec::new();
    write_frame(&mut buf, &CoordinatorMessage::Keys).unwrap();
    write_frame(
        &mut buf,
        &CoordinatorMessage::Mine {
            target: "1effffff".to_string(),
        },
    )
    .unwrap();
    write_frame(&mut buf, &CoordinatorMessage::CloseConnection).unwrap();

    let mut reader = buf.as_slice();
    assert_eq!(
        read_frame::<_, CoordinatorMessage>(&mut reader).unwrap(),
        CoordinatorMessage::Keys
    );
    assert!(matches!(
        read_frame::<_, CoordinatorMessage>(&mut reader).unwrap(),
        CoordinatorMessage::Mine { .. }
    ));
    assert_eq!(
        read_frame::<_, CoordinatorMessage>(&mut reader).unwrap(),
        CoordinatorMessage::CloseConnection
    );
}

#[test]
fn transaction_canonical_form_is_stable_across_the_wire() {
    let tx = sample_transaction();
    let id = powchain::transaction::tx_id(&tx);

    let mut buf = Vec::new();
    write_frame(
        &mut buf,
        &CoordinatorMessage::Transaction {
            transaction: tx.clone(),
        },
    )
    .unwrap();
    let CoordinatorMessage::Transaction { transaction } =
        read_frame(&mut buf.as_slice()).unwrap()
    else {
        panic!("wrong message type");
    };
    assert_eq!(powchain::transaction::tx_id(&transaction), id);
}

#[test]
fn wire_hex_fields_are_lowercase() {
    let block = sample_block();
    let json = serde_json::to_string(&block).unwrap();
    assert_eq!(json, json.to_lowercase());
}
