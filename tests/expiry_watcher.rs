mod support;

use anyhow::{Context as _, Result};
use bitcoin::{OutPoint, Sequence};
use swap_watcher::swap::SwapStatus;
use swap_watcher::swap::events::SwapEvent;
use support::fixtures::{
    Harness, chain_swap, funding, htlc, lockup, lockup_script, reverse_swap, submarine_swap,
};

#[test]
fn expires_swaps_at_their_timeout() -> Result<()> {
    let mut harness = Harness::new(2_000_000)?;

    let mut due = submarine_swap("due", &htlc(1));
    due.timeout_block_height = 100;
    let mut later = submarine_swap("later", &htlc(2));
    later.timeout_block_height = 101;
    let mut failed = submarine_swap("failed", &htlc(3));
    failed.timeout_block_height = 90;
    failed.status = SwapStatus::TransactionLockupFailed;
    let mut elsewhere = submarine_swap("elsewhere", &htlc(4));
    elsewhere.timeout_block_height = 90;
    elsewhere.pair = "L-BTC/L-BTC".to_string();
    {
        let mut store = harness.store();
        for swap in [&due, &later, &failed, &elsewhere] {
            store.insert_swap(swap)?;
        }
    }

    harness.expiry.handle_block(&harness.currency, 100)?;

    let status = |id: &str| -> Result<SwapStatus> {
        Ok(harness.store().get_swap(id)?.context("swap missing")?.status)
    };
    assert_eq!(status("due")?, SwapStatus::Expired);
    assert_eq!(status("later")?, SwapStatus::InvoiceSet);
    assert_eq!(status("failed")?, SwapStatus::TransactionLockupFailed);
    assert_eq!(status("elsewhere")?, SwapStatus::InvoiceSet);
    assert_eq!(harness.chain.removed_output_filters(), vec![lockup_script(&htlc(1))]);

    match harness.drain_events().as_slice() {
        [SwapEvent::SwapExpired(swap)] => {
            assert_eq!(swap.id, "due");
            assert_eq!(swap.status, SwapStatus::Expired);
        }
        other => panic!("unexpected events {other:?}"),
    }

    // Nothing left to expire.
    harness.expiry.handle_block(&harness.currency, 100)?;
    assert!(harness.drain_events().is_empty());
    Ok(())
}

#[test]
fn expires_reverse_swap_and_drops_its_filters() -> Result<()> {
    let mut harness = Harness::new(2_000_000)?;
    let spec = htlc(1);
    let server_lockup = lockup(&funding(200_000, 1), &lockup_script(&spec), 100_000, Sequence::MAX);

    let mut reverse = reverse_swap("reverse", &spec);
    reverse.status = SwapStatus::TransactionConfirmed;
    reverse.transaction_id = Some(server_lockup.compute_txid().to_string());
    reverse.transaction_vout = Some(0);
    reverse.timeout_block_height = 50;
    harness.store().insert_reverse_swap(&reverse)?;

    harness.expiry.handle_block(&harness.currency, 60)?;

    let got = harness
        .store()
        .get_reverse_swap("reverse")?
        .context("reverse swap missing")?;
    assert_eq!(got.status, SwapStatus::Expired);
    assert_eq!(harness.chain.removed_output_filters(), vec![lockup_script(&spec)]);
    assert_eq!(
        harness.chain.removed_input_filters(),
        vec![OutPoint::new(server_lockup.compute_txid(), 0)]
    );
    assert!(matches!(
        harness.drain_events().as_slice(),
        [SwapEvent::ReverseSwapExpired(_)]
    ));
    Ok(())
}

#[test]
fn expires_chain_swap_on_receiving_chain() -> Result<()> {
    let mut harness = Harness::new(2_000_000)?;
    let spec = htlc(2);

    let mut chain = chain_swap("chain", &spec);
    chain.receiving.timeout_block_height = 70;
    harness.store().insert_chain_swap(&chain)?;

    harness.expiry.handle_block(&harness.currency, 69)?;
    assert!(harness.drain_events().is_empty());

    harness.expiry.handle_block(&harness.currency, 70)?;
    let got = harness
        .store()
        .get_chain_swap("chain")?
        .context("chain swap missing")?;
    assert_eq!(got.status, SwapStatus::Expired);
    assert_eq!(harness.chain.removed_output_filters(), vec![lockup_script(&spec)]);
    match harness.drain_events().as_slice() {
        [SwapEvent::ChainSwapExpired(swap)] => assert_eq!(swap.id, "chain"),
        other => panic!("unexpected events {other:?}"),
    }
    Ok(())
}
