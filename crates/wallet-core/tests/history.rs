//! Paging through address history from a `WalletManager`.

mod common;

use std::sync::atomic::Ordering;

use rust_decimal_macros::dec;

use common::*;
use wallet_core::{
    Amount, AmountType, Chain, HistoryPage, ManagerConfig, MultiProvider, PagedHistoryProvider,
    TransactionHistoryProvider, TransactionRecord, TransactionStatus, WalletError, WalletManager,
};

fn record(hash: &str, sat: u128, status: TransactionStatus) -> TransactionRecord {
    TransactionRecord {
        hash: hash.into(),
        source: "bc1qsender".into(),
        destination: BTC_RECIPIENT.into(),
        amount: Amount::coin_from_smallest_units(Chain::Bitcoin, sat).unwrap(),
        fee: None,
        is_outgoing: false,
        status,
        date: None,
    }
}

fn pages() -> Vec<HistoryPage> {
    vec![
        HistoryPage {
            page: 1,
            total_pages: 2,
            records: vec![
                record("aa", 5_000, TransactionStatus::Unconfirmed),
                record("bb", 3_000, TransactionStatus::Confirmed),
            ],
        },
        HistoryPage {
            page: 2,
            total_pages: 2,
            records: vec![record("cc", 2_000, TransactionStatus::Confirmed)],
        },
    ]
}

#[tokio::test]
async fn history_pages_through_failover() {
    init_logging();
    let signer = Secp256k1Signer::new(0x11);
    let config = ManagerConfig::for_chain(Chain::Bitcoin)
        .with_endpoints(vec!["blockbook-a".to_string(), "blockbook-b".to_string()]);
    let provider = MultiProvider::from_config(&config, |endpoint| ScriptedConnector::new(endpoint)).unwrap();
    // The first endpoint has nothing scripted and fails in transport.
    provider.providers()[1].set_history(pages());
    let history = PagedHistoryProvider::new(provider);

    let manager =
        WalletManager::new(config, signer.public_key(), ScriptedConnector::new("blockbook-a")).unwrap();

    let first = manager.load_history(&history, AmountType::Coin, 2).await.unwrap();
    let hashes: Vec<&str> = first.iter().map(|r| r.hash.as_str()).collect();
    assert_eq!(hashes, vec!["aa", "bb"]);
    assert!(history.can_fetch_history());

    let second = manager.load_history(&history, AmountType::Coin, 2).await.unwrap();
    assert_eq!(second[0].hash, "cc");
    assert!(!history.can_fetch_history());

    assert!(manager
        .load_history(&history, AmountType::Coin, 2)
        .await
        .unwrap()
        .is_empty());
    let endpoints = history.source().providers();
    assert_eq!(endpoints[0].history_calls.load(Ordering::SeqCst), 2);
    assert_eq!(endpoints[1].history_calls.load(Ordering::SeqCst), 2);

    history.reset();
    let again = manager.load_history(&history, AmountType::Coin, 2).await.unwrap();
    assert_eq!(again[0].hash, "aa");
}

#[tokio::test]
async fn history_transport_failure_surfaces() {
    init_logging();
    let signer = Secp256k1Signer::new(0x11);
    let history = PagedHistoryProvider::new(ScriptedConnector::new("blockbook-a"));
    let manager = WalletManager::new(
        ManagerConfig::for_chain(Chain::Bitcoin),
        signer.public_key(),
        ScriptedConnector::new("blockbook-a"),
    )
    .unwrap();

    let err = manager
        .load_history(&history, AmountType::Coin, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));
    assert!(history.can_fetch_history());
}

#[tokio::test]
async fn history_works_through_a_trait_object() {
    init_logging();
    let signer = Secp256k1Signer::new(0x11);
    let source = ScriptedConnector::new("blockbook-a");
    source.set_history(pages());
    let history: Box<dyn TransactionHistoryProvider> = Box::new(PagedHistoryProvider::new(source));
    let manager = WalletManager::new(
        ManagerConfig::for_chain(Chain::Bitcoin),
        signer.public_key(),
        ScriptedConnector::new("blockbook-a"),
    )
    .unwrap();

    let records = manager
        .load_history(history.as_ref(), AmountType::Coin, 2)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].amount.value, dec!(0.00003));
}
