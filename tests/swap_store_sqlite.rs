mod support;

use anyhow::{Context as _, Result};
use bitcoin::Sequence;
use swap_watcher::swap::store::{PendingLockupTransaction, SqliteStore};
use swap_watcher::swap::{LockupSwap, SwapStatus};
use support::fixtures::{
    chain_swap, funding, htlc, lockup, lockup_script, reverse_swap, store_path, submarine_swap,
};

#[test]
fn sqlite_store_insert_get_conditional_update() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store = SqliteStore::open(store_path(dir.path())).context("open sqlite store")?;

    let a = submarine_swap("swap-a", &htlc(1));
    store.insert_swap(&a).context("insert swap-a")?;

    let got = store
        .get_swap("swap-a")
        .context("get swap-a")?
        .context("swap-a missing")?;
    assert_eq!(got, a);

    let found = store
        .swap_by_lockup_address(&a.lockup_address, &[SwapStatus::InvoiceSet])
        .context("find swap-a by address")?;
    assert_eq!(found.map(|s| s.id), Some("swap-a".to_string()));
    let found = store
        .swap_by_lockup_address(&a.lockup_address, &[SwapStatus::Created])
        .context("find swap-a by address and other status")?;
    assert!(found.is_none());

    // Precondition does not hold: nothing changes.
    let updated = store
        .set_swap_status("swap-a", &[SwapStatus::Created], SwapStatus::Expired)
        .context("update swap-a from created")?;
    assert!(!updated);

    let updated = store
        .set_swap_lockup_transaction(
            "swap-a",
            &[SwapStatus::InvoiceSet],
            "txid-a",
            1,
            100_000,
            false,
        )
        .context("set swap-a lockup")?
        .context("swap-a lockup not recorded")?;
    assert_eq!(updated.status, SwapStatus::TransactionMempool);
    assert_eq!(updated.lockup_transaction_id.as_deref(), Some("txid-a"));
    assert_eq!(updated.lockup_transaction_vout, Some(1));
    assert_eq!(updated.onchain_amount, Some(100_000));

    let again = store
        .set_swap_lockup_transaction(
            "swap-a",
            &[SwapStatus::InvoiceSet],
            "txid-b",
            0,
            1,
            true,
        )
        .context("set swap-a lockup twice")?;
    assert!(again.is_none());

    assert!(store.get_swap("missing")?.is_none());
    Ok(())
}

#[test]
fn sqlite_store_expirable_skips_final_swaps() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store = SqliteStore::open(store_path(dir.path())).context("open sqlite store")?;

    let mut due = submarine_swap("due", &htlc(1));
    due.timeout_block_height = 100;
    let mut later = submarine_swap("later", &htlc(2));
    later.timeout_block_height = 101;
    let mut failed = submarine_swap("failed", &htlc(3));
    failed.timeout_block_height = 50;
    failed.status = SwapStatus::TransactionLockupFailed;
    for swap in [&due, &later, &failed] {
        store.insert_swap(swap)?;
    }

    let expirable: Vec<_> = store
        .swaps_expirable(100)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(expirable, vec!["due".to_string()]);

    let mut reverse = reverse_swap("reverse", &htlc(4));
    reverse.timeout_block_height = 90;
    store.insert_reverse_swap(&reverse)?;
    assert_eq!(store.reverse_swaps_expirable(89)?.len(), 0);
    assert_eq!(store.reverse_swaps_expirable(90)?.len(), 1);

    let mut chain = chain_swap("chain", &htlc(5));
    chain.receiving.timeout_block_height = 80;
    store.insert_chain_swap(&chain)?;
    assert_eq!(store.chain_swaps_expirable("BTC", 80)?.len(), 1);
    assert_eq!(store.chain_swaps_expirable("L-BTC", 80)?.len(), 0);

    Ok(())
}

#[test]
fn sqlite_store_chain_and_reverse_lookups() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let mut store = SqliteStore::open(store_path(dir.path())).context("open sqlite store")?;

    let mut chain = chain_swap("chain", &htlc(1));
    chain.status = SwapStatus::TransactionServerMempool;
    chain.sending.transaction_id = Some("sending-txid".to_string());
    chain.sending.transaction_vout = Some(2);
    store.insert_chain_swap(&chain)?;

    let got = store.get_chain_swap("chain")?.context("chain swap missing")?;
    assert_eq!(got, chain);
    assert!(
        store
            .chain_swap_by_sending_outpoint("sending-txid", 2, &[SwapStatus::TransactionServerMempool])?
            .is_some()
    );
    assert!(
        store
            .chain_swap_by_sending_outpoint("sending-txid", 1, &[SwapStatus::TransactionServerMempool])?
            .is_none()
    );

    let mut reverse = reverse_swap("reverse", &htlc(2));
    reverse.status = SwapStatus::TransactionMempool;
    reverse.transaction_id = Some("reverse-txid".to_string());
    reverse.transaction_vout = Some(0);
    store.insert_reverse_swap(&reverse)?;
    let got = store
        .reverse_swap_by_transaction_id("reverse-txid", &[SwapStatus::TransactionMempool])?
        .context("reverse swap missing")?;
    assert_eq!(got, reverse);
    assert!(
        store
            .set_reverse_swap_status(
                "reverse",
                &[SwapStatus::TransactionMempool],
                SwapStatus::TransactionConfirmed,
            )?
    );

    match store.lockup_swap("chain")? {
        Some(LockupSwap::Chain(swap)) => assert_eq!(swap.id, "chain"),
        other => panic!("unexpected lockup swap {other:?}"),
    }
    assert!(store.lockup_swap("reverse")?.is_none());

    Ok(())
}

#[test]
fn sqlite_store_pending_lockups_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let spec = htlc(1);
    let parent = funding(200_000, 1);
    let tx = lockup(&parent, &lockup_script(&spec), 100_000, Sequence::MAX);

    {
        let mut store = SqliteStore::open(store_path(dir.path()))?;
        store.insert_pending_lockup(&PendingLockupTransaction::new("swap-a", "BTC", &tx))?;
        store.insert_pending_lockup(&PendingLockupTransaction::new("swap-b", "L-BTC", &tx))?;
        // Upsert keyed by swap id.
        store.insert_pending_lockup(&PendingLockupTransaction::new("swap-a", "BTC", &parent))?;
    }

    let mut store = SqliteStore::open(store_path(dir.path())).context("reopen sqlite store")?;
    let btc = store.pending_lockups_for_chain("BTC")?;
    assert_eq!(btc.len(), 1);
    assert_eq!(btc[0].transaction()?, parent);
    assert_eq!(store.pending_lockups()?.len(), 2);

    assert!(store.delete_pending_lockup("swap-a")?);
    assert!(!store.delete_pending_lockup("swap-a")?);
    assert!(store.get_pending_lockup("swap-a")?.is_none());
    assert_eq!(
        store
            .get_pending_lockup("swap-b")?
            .context("swap-b missing")?
            .transaction()?,
        tx
    );

    Ok(())
}
