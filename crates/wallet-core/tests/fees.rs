mod common;

use std::sync::atomic::Ordering;

use rust_decimal_macros::dec;

use common::*;
use wallet_core::{
    Amount, Chain, ConnectorError, Fee, FeeParameters, FeeTiers, ManagerConfig, RawFeeData,
    WalletError, WalletManager,
};

fn sat(units: u128) -> Amount {
    Amount::coin_from_smallest_units(Chain::Bitcoin, units).unwrap()
}

async fn manager_with(outputs: Vec<chain_btc::utxo::Utxo>) -> (WalletManager<ScriptedConnector>, Secp256k1Signer) {
    init_logging();
    let signer = Secp256k1Signer::new(0x11);
    let manager = WalletManager::new(
        ManagerConfig::for_chain(Chain::Bitcoin),
        signer.public_key(),
        ScriptedConnector::new("blockbook-1"),
    )
    .unwrap();
    manager.connector().set_state(Ok(utxo_snapshot(outputs, &[])));
    manager.update().await.unwrap();
    (manager, signer)
}

fn utxo_fee(fee_sat: u128, rate: u64, inputs: usize) -> Fee {
    Fee::with_parameters(
        sat(fee_sat),
        FeeParameters::Utxo {
            fee_rate_per_byte: rate,
            input_count: inputs,
        },
    )
}

#[tokio::test]
async fn descending_rates_come_back_ascending() {
    let (manager, _) = manager_with(vec![utxo(1, 50_000), utxo(2, 30_000), utxo(3, 20_000)]).await;
    manager.connector().set_fee(Ok(RawFeeData::PerKilobyte {
        rates: vec![dec!(0.0003), dec!(0.0002), dec!(0.0001)],
    }));

    let tiers = manager.get_fee(&sat(10_000), BTC_RECIPIENT).await.unwrap();

    // One input and two outputs: 141 vbytes at 10, 20 and 30 sat/vB.
    assert_eq!(
        tiers,
        FeeTiers::Multiple {
            low: utxo_fee(1_410, 10, 1),
            normal: utxo_fee(2_820, 20, 1),
            priority: utxo_fee(4_230, 30, 1),
        }
    );
}

#[tokio::test]
async fn fee_request_names_wallet_and_destination() {
    let (manager, _) = manager_with(vec![utxo(1, 50_000)]).await;
    manager.connector().set_fee(Ok(RawFeeData::PerByte {
        rates: vec![dec!(4.2)],
    }));

    let tiers = manager.get_fee(&sat(10_000), BTC_RECIPIENT).await.unwrap();
    assert_eq!(tiers, FeeTiers::Single(utxo_fee(141 * 5, 5, 1)));

    let requests = manager.connector().fee_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source, manager.wallet().await.address);
    assert_eq!(requests[0].destination, BTC_RECIPIENT);
    assert_eq!(requests[0].amount, sat(10_000));
}

#[tokio::test]
async fn fee_grows_with_inputs_needed_to_cover_it() {
    let (manager, _) = manager_with(vec![utxo(1, 10_000), utxo(2, 10_000)]).await;
    manager.connector().set_fee(Ok(RawFeeData::PerByte {
        rates: vec![dec!(10)],
    }));

    // 10_000 fits one input by value, but not once its own fee is added.
    let tiers = manager.get_fee(&sat(10_000), BTC_RECIPIENT).await.unwrap();
    assert_eq!(tiers, FeeTiers::Single(utxo_fee(2_090, 10, 2)));
}

#[tokio::test]
async fn reserved_outputs_limit_what_a_fee_can_cover() {
    let (manager, signer) = manager_with(vec![utxo(1, 5_000), utxo(2, 3_000), utxo(3, 2_000)]).await;
    let intent = manager
        .create_transfer(sat(6_000), Fee::new(sat(1_000)), BTC_RECIPIENT)
        .await
        .unwrap();
    manager.send(&intent, &signer).await.unwrap();

    manager.connector().set_fee(Ok(RawFeeData::PerByte {
        rates: vec![dec!(1)],
    }));
    let err = manager.get_fee(&sat(5_000), BTC_RECIPIENT).await.unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds { .. }));

    let tiers = manager.get_fee(&sat(1_000), BTC_RECIPIENT).await.unwrap();
    assert_eq!(tiers, FeeTiers::Single(utxo_fee(141, 1, 1)));
}

#[tokio::test]
async fn negative_amount_never_reaches_the_node() {
    let (manager, _) = manager_with(vec![utxo(1, 5_000)]).await;
    let negative = Amount::coin(Chain::Bitcoin, dec!(-0.0001));

    let err = manager.get_fee(&negative, BTC_RECIPIENT).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidAmount(_)));
    assert_eq!(manager.connector().fee_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn node_fee_errors_are_mapped() {
    let (manager, _) = manager_with(vec![utxo(1, 5_000)]).await;

    manager
        .connector()
        .set_fee(Err(ConnectorError::Transport("timeout".into())));
    assert!(matches!(
        manager.get_fee(&sat(1_000), BTC_RECIPIENT).await,
        Err(WalletError::Transport(_))
    ));

    manager
        .connector()
        .set_fee(Err(ConnectorError::InvalidResponse("no result".into())));
    assert!(matches!(
        manager.get_fee(&sat(1_000), BTC_RECIPIENT).await,
        Err(WalletError::FeeLoadFailure(_))
    ));

    manager.connector().set_fee(Ok(RawFeeData::PerKilobyte {
        rates: vec![dec!(0.0001), dec!(0), dec!(0.0003)],
    }));
    assert!(matches!(
        manager.get_fee(&sat(1_000), BTC_RECIPIENT).await,
        Err(WalletError::FeeLoadFailure(_))
    ));
}

#[tokio::test]
async fn two_rates_are_not_a_valid_tier_set() {
    let (manager, _) = manager_with(vec![utxo(1, 50_000)]).await;
    manager.connector().set_fee(Ok(RawFeeData::PerByte {
        rates: vec![dec!(2), dec!(3)],
    }));

    assert!(matches!(
        manager.get_fee(&sat(1_000), BTC_RECIPIENT).await,
        Err(WalletError::FeeTierCountInvalid(2))
    ));
}
