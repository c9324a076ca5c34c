use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use bitcoin::Transaction;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension as _, Params, Row, params};

use super::{
    ChainSwap, ChainSwapData, LockupSwap, OrderSide, ReverseSwap, ServerLockupSwap, Swap,
    SwapStatus,
};

/// Unconfirmed lockup accepted with 0-conf whose amount is still at risk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLockupTransaction {
    pub swap_id: String,
    pub chain_symbol: String,
    pub transaction_hex: String,
}

impl PendingLockupTransaction {
    pub fn new(swap_id: &str, chain_symbol: &str, transaction: &Transaction) -> Self {
        Self {
            swap_id: swap_id.to_string(),
            chain_symbol: chain_symbol.to_string(),
            transaction_hex: hex::encode(bitcoin::consensus::serialize(transaction)),
        }
    }

    pub fn transaction(&self) -> Result<Transaction> {
        let bytes = hex::decode(&self.transaction_hex)
            .with_context(|| format!("decode pending lockup hex of swap {}", self.swap_id))?;
        bitcoin::consensus::deserialize(&bytes)
            .with_context(|| format!("parse pending lockup of swap {}", self.swap_id))
    }
}

const SWAP_COLUMNS: &str = r#"
  id,
  pair,
  order_side,
  status,
  lockup_address,
  redeem_script,
  expected_amount,
  accept_zero_conf,
  lockup_transaction_id,
  lockup_transaction_vout,
  onchain_amount,
  timeout_block_height
"#;

const REVERSE_SWAP_COLUMNS: &str = r#"
  id,
  pair,
  order_side,
  status,
  lockup_address,
  onchain_amount,
  transaction_id,
  transaction_vout,
  timeout_block_height
"#;

const CHAIN_SWAP_COLUMNS: &str = r#"
  id,
  pair,
  order_side,
  status,
  accept_zero_conf,
  receiving_symbol,
  receiving_lockup_address,
  receiving_redeem_script,
  receiving_expected_amount,
  receiving_amount,
  receiving_transaction_id,
  receiving_transaction_vout,
  receiving_timeout_block_height,
  sending_symbol,
  sending_lockup_address,
  sending_redeem_script,
  sending_expected_amount,
  sending_amount,
  sending_transaction_id,
  sending_transaction_vout,
  sending_timeout_block_height
"#;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create swap store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Submarine swaps

    pub fn insert_swap(&mut self, swap: &Swap) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO swaps ({SWAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
                params![
                    &swap.id,
                    &swap.pair,
                    order_side_to_str(swap.order_side),
                    status_to_str(swap.status),
                    &swap.lockup_address,
                    &swap.redeem_script_hex,
                    swap.expected_amount,
                    swap.accept_zero_conf,
                    &swap.lockup_transaction_id,
                    swap.lockup_transaction_vout,
                    swap.onchain_amount,
                    swap.timeout_block_height,
                ],
            )
            .with_context(|| format!("insert swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_swap(&self, id: &str) -> Result<Option<Swap>> {
        Ok(self.query_swaps("id = ?1", params![id])?.pop())
    }

    pub fn swap_by_lockup_address(
        &self,
        address: &str,
        statuses: &[SwapStatus],
    ) -> Result<Option<Swap>> {
        let clause = format!("lockup_address = ?1 AND status IN ({})", status_list(statuses));
        Ok(self.query_swaps(&clause, params![address])?.pop())
    }

    pub fn swaps_by_status(&self, statuses: &[SwapStatus]) -> Result<Vec<Swap>> {
        let clause = format!("status IN ({})", status_list(statuses));
        self.query_swaps(&clause, [])
    }

    /// Swaps that are not final yet and whose timeout is at or below `height`.
    pub fn swaps_expirable(&self, height: u32) -> Result<Vec<Swap>> {
        let clause = format!(
            "status NOT IN ({}) AND timeout_block_height <= ?1",
            status_list(&SwapStatus::FINAL)
        );
        self.query_swaps(&clause, params![height])
    }

    /// Records the lockup transaction of a swap that is still in one of
    /// `from`; `None` if the swap moved on in the meantime.
    pub fn set_swap_lockup_transaction(
        &mut self,
        id: &str,
        from: &[SwapStatus],
        transaction_id: &str,
        vout: u32,
        amount: u64,
        confirmed: bool,
    ) -> Result<Option<Swap>> {
        let rows = self
            .conn
            .execute(
                &format!(
                    r#"
UPDATE swaps SET
  lockup_transaction_id = ?2,
  lockup_transaction_vout = ?3,
  onchain_amount = ?4,
  status = ?5
WHERE id = ?1 AND status IN ({})
"#,
                    status_list(from)
                ),
                params![
                    id,
                    transaction_id,
                    vout,
                    amount,
                    status_to_str(lockup_status(confirmed)),
                ],
            )
            .with_context(|| format!("set lockup transaction of swap {id}"))?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_swap(id)
    }

    pub fn set_swap_status(&mut self, id: &str, from: &[SwapStatus], to: SwapStatus) -> Result<bool> {
        self.update_status("swaps", id, from, to)
    }

    // Reverse swaps

    pub fn insert_reverse_swap(&mut self, swap: &ReverseSwap) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO reverse_swaps ({REVERSE_SWAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    &swap.id,
                    &swap.pair,
                    order_side_to_str(swap.order_side),
                    status_to_str(swap.status),
                    &swap.lockup_address,
                    swap.onchain_amount,
                    &swap.transaction_id,
                    swap.transaction_vout,
                    swap.timeout_block_height,
                ],
            )
            .with_context(|| format!("insert reverse swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_reverse_swap(&self, id: &str) -> Result<Option<ReverseSwap>> {
        Ok(self.query_reverse_swaps("id = ?1", params![id])?.pop())
    }

    pub fn reverse_swap_by_outpoint(
        &self,
        transaction_id: &str,
        vout: u32,
        statuses: &[SwapStatus],
    ) -> Result<Option<ReverseSwap>> {
        let clause = format!(
            "transaction_id = ?1 AND transaction_vout = ?2 AND status IN ({})",
            status_list(statuses)
        );
        Ok(self
            .query_reverse_swaps(&clause, params![transaction_id, vout])?
            .pop())
    }

    pub fn reverse_swap_by_transaction_id(
        &self,
        transaction_id: &str,
        statuses: &[SwapStatus],
    ) -> Result<Option<ReverseSwap>> {
        let clause = format!(
            "transaction_id = ?1 AND status IN ({})",
            status_list(statuses)
        );
        Ok(self
            .query_reverse_swaps(&clause, params![transaction_id])?
            .pop())
    }

    pub fn reverse_swaps_by_status(&self, statuses: &[SwapStatus]) -> Result<Vec<ReverseSwap>> {
        let clause = format!("status IN ({})", status_list(statuses));
        self.query_reverse_swaps(&clause, [])
    }

    pub fn reverse_swaps_expirable(&self, height: u32) -> Result<Vec<ReverseSwap>> {
        let clause = format!(
            "status NOT IN ({}) AND timeout_block_height <= ?1",
            status_list(&SwapStatus::FINAL)
        );
        self.query_reverse_swaps(&clause, params![height])
    }

    pub fn set_reverse_swap_status(
        &mut self,
        id: &str,
        from: &[SwapStatus],
        to: SwapStatus,
    ) -> Result<bool> {
        self.update_status("reverse_swaps", id, from, to)
    }

    // Chain swaps

    pub fn insert_chain_swap(&mut self, swap: &ChainSwap) -> Result<()> {
        let receiving = &swap.receiving;
        let sending = &swap.sending;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO chain_swaps ({CHAIN_SWAP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
                ),
                params![
                    &swap.id,
                    &swap.pair,
                    order_side_to_str(swap.order_side),
                    status_to_str(swap.status),
                    swap.accept_zero_conf,
                    &receiving.symbol,
                    &receiving.lockup_address,
                    &receiving.redeem_script_hex,
                    receiving.expected_amount,
                    receiving.amount,
                    &receiving.transaction_id,
                    receiving.transaction_vout,
                    receiving.timeout_block_height,
                    &sending.symbol,
                    &sending.lockup_address,
                    &sending.redeem_script_hex,
                    sending.expected_amount,
                    sending.amount,
                    &sending.transaction_id,
                    sending.transaction_vout,
                    sending.timeout_block_height,
                ],
            )
            .with_context(|| format!("insert chain swap {}", swap.id))?;
        Ok(())
    }

    pub fn get_chain_swap(&self, id: &str) -> Result<Option<ChainSwap>> {
        Ok(self.query_chain_swaps("id = ?1", params![id])?.pop())
    }

    pub fn chain_swap_by_receiving_address(
        &self,
        address: &str,
        statuses: &[SwapStatus],
    ) -> Result<Option<ChainSwap>> {
        let clause = format!(
            "receiving_lockup_address = ?1 AND status IN ({})",
            status_list(statuses)
        );
        Ok(self.query_chain_swaps(&clause, params![address])?.pop())
    }

    pub fn chain_swap_by_sending_outpoint(
        &self,
        transaction_id: &str,
        vout: u32,
        statuses: &[SwapStatus],
    ) -> Result<Option<ChainSwap>> {
        let clause = format!(
            "sending_transaction_id = ?1 AND sending_transaction_vout = ?2 AND status IN ({})",
            status_list(statuses)
        );
        Ok(self
            .query_chain_swaps(&clause, params![transaction_id, vout])?
            .pop())
    }

    pub fn chain_swap_by_sending_transaction_id(
        &self,
        transaction_id: &str,
        statuses: &[SwapStatus],
    ) -> Result<Option<ChainSwap>> {
        let clause = format!(
            "sending_transaction_id = ?1 AND status IN ({})",
            status_list(statuses)
        );
        Ok(self
            .query_chain_swaps(&clause, params![transaction_id])?
            .pop())
    }

    pub fn chain_swaps_by_status(&self, statuses: &[SwapStatus]) -> Result<Vec<ChainSwap>> {
        let clause = format!("status IN ({})", status_list(statuses));
        self.query_chain_swaps(&clause, [])
    }

    /// Chain swaps receiving on `symbol` whose receiving timeout passed.
    pub fn chain_swaps_expirable(&self, symbol: &str, height: u32) -> Result<Vec<ChainSwap>> {
        let clause = format!(
            "status NOT IN ({}) AND receiving_symbol = ?1 AND receiving_timeout_block_height <= ?2",
            status_list(&SwapStatus::FINAL)
        );
        self.query_chain_swaps(&clause, params![symbol, height])
    }

    pub fn set_chain_swap_user_lockup(
        &mut self,
        id: &str,
        from: &[SwapStatus],
        transaction_id: &str,
        vout: u32,
        amount: u64,
        confirmed: bool,
    ) -> Result<Option<ChainSwap>> {
        let rows = self
            .conn
            .execute(
                &format!(
                    r#"
UPDATE chain_swaps SET
  receiving_transaction_id = ?2,
  receiving_transaction_vout = ?3,
  receiving_amount = ?4,
  status = ?5
WHERE id = ?1 AND status IN ({})
"#,
                    status_list(from)
                ),
                params![
                    id,
                    transaction_id,
                    vout,
                    amount,
                    status_to_str(lockup_status(confirmed)),
                ],
            )
            .with_context(|| format!("set user lockup of chain swap {id}"))?;
        if rows == 0 {
            return Ok(None);
        }
        self.get_chain_swap(id)
    }

    pub fn set_chain_swap_status(
        &mut self,
        id: &str,
        from: &[SwapStatus],
        to: SwapStatus,
    ) -> Result<bool> {
        self.update_status("chain_swaps", id, from, to)
    }

    // Both swap kinds

    /// The swap with a user lockup that has the id `id`, whatever its kind.
    pub fn lockup_swap(&self, id: &str) -> Result<Option<LockupSwap>> {
        if let Some(swap) = self.get_swap(id)? {
            return Ok(Some(LockupSwap::Submarine(swap)));
        }
        Ok(self.get_chain_swap(id)?.map(LockupSwap::Chain))
    }

    pub fn set_lockup_transaction(
        &mut self,
        swap: &LockupSwap,
        transaction_id: &str,
        vout: u32,
        amount: u64,
        confirmed: bool,
    ) -> Result<Option<LockupSwap>> {
        let from = [swap.status()];
        Ok(match swap {
            LockupSwap::Submarine(swap) => self
                .set_swap_lockup_transaction(&swap.id, &from, transaction_id, vout, amount, confirmed)?
                .map(LockupSwap::Submarine),
            LockupSwap::Chain(swap) => self
                .set_chain_swap_user_lockup(&swap.id, &from, transaction_id, vout, amount, confirmed)?
                .map(LockupSwap::Chain),
        })
    }

    pub fn set_lockup_swap_status(&mut self, swap: &LockupSwap, to: SwapStatus) -> Result<bool> {
        let from = [swap.status()];
        match swap {
            LockupSwap::Submarine(swap) => self.set_swap_status(&swap.id, &from, to),
            LockupSwap::Chain(swap) => self.set_chain_swap_status(&swap.id, &from, to),
        }
    }

    pub fn set_server_lockup_status(
        &mut self,
        swap: &ServerLockupSwap,
        to: SwapStatus,
    ) -> Result<bool> {
        let from = [swap.status()];
        match swap {
            ServerLockupSwap::Reverse(swap) => self.set_reverse_swap_status(&swap.id, &from, to),
            ServerLockupSwap::Chain(swap) => self.set_chain_swap_status(&swap.id, &from, to),
        }
    }

    // Pending lockup transactions

    pub fn insert_pending_lockup(&mut self, entry: &PendingLockupTransaction) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO pending_lockup_transactions (swap_id, chain_symbol, transaction_hex)
VALUES (?1, ?2, ?3)
ON CONFLICT(swap_id) DO UPDATE SET
  chain_symbol = excluded.chain_symbol,
  transaction_hex = excluded.transaction_hex
"#,
                params![&entry.swap_id, &entry.chain_symbol, &entry.transaction_hex],
            )
            .with_context(|| format!("insert pending lockup of swap {}", entry.swap_id))?;
        Ok(())
    }

    pub fn get_pending_lockup(&self, swap_id: &str) -> Result<Option<PendingLockupTransaction>> {
        self.conn
            .query_row(
                "SELECT swap_id, chain_symbol, transaction_hex FROM pending_lockup_transactions WHERE swap_id = ?1",
                params![swap_id],
                pending_lockup_from_row,
            )
            .optional()
            .with_context(|| format!("get pending lockup of swap {swap_id}"))
    }

    pub fn pending_lockups_for_chain(&self, symbol: &str) -> Result<Vec<PendingLockupTransaction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT swap_id, chain_symbol, transaction_hex FROM pending_lockup_transactions WHERE chain_symbol = ?1 ORDER BY swap_id",
            )
            .context("prepare pending lockups query")?;
        let rows = stmt
            .query_map(params![symbol], pending_lockup_from_row)
            .context("query pending lockups")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read pending lockup row")
    }

    pub fn pending_lockups(&self) -> Result<Vec<PendingLockupTransaction>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT swap_id, chain_symbol, transaction_hex FROM pending_lockup_transactions ORDER BY chain_symbol, swap_id",
            )
            .context("prepare pending lockups query")?;
        let rows = stmt
            .query_map([], pending_lockup_from_row)
            .context("query pending lockups")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read pending lockup row")
    }

    pub fn delete_pending_lockup(&mut self, swap_id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM pending_lockup_transactions WHERE swap_id = ?1",
                params![swap_id],
            )
            .with_context(|| format!("delete pending lockup of swap {swap_id}"))?;
        Ok(rows == 1)
    }

    fn update_status(
        &mut self,
        table: &str,
        id: &str,
        from: &[SwapStatus],
        to: SwapStatus,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                &format!(
                    "UPDATE {table} SET status = ?2 WHERE id = ?1 AND status IN ({})",
                    status_list(from)
                ),
                params![id, status_to_str(to)],
            )
            .with_context(|| format!("update {table} status of {id}"))?;
        Ok(rows == 1)
    }

    fn query_swaps(&self, clause: &str, params: impl Params) -> Result<Vec<Swap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SWAP_COLUMNS} FROM swaps WHERE {clause} ORDER BY id"
            ))
            .context("prepare swaps query")?;
        let rows = stmt
            .query_map(params, swap_from_row)
            .context("query swaps")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read swap row")
    }

    fn query_reverse_swaps(&self, clause: &str, params: impl Params) -> Result<Vec<ReverseSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {REVERSE_SWAP_COLUMNS} FROM reverse_swaps WHERE {clause} ORDER BY id"
            ))
            .context("prepare reverse swaps query")?;
        let rows = stmt
            .query_map(params, reverse_swap_from_row)
            .context("query reverse swaps")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read reverse swap row")
    }

    fn query_chain_swaps(&self, clause: &str, params: impl Params) -> Result<Vec<ChainSwap>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CHAIN_SWAP_COLUMNS} FROM chain_swaps WHERE {clause} ORDER BY id"
            ))
            .context("prepare chain swaps query")?;
        let rows = stmt
            .query_map(params, chain_swap_from_row)
            .context("query chain swaps")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read chain swap row")
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  status TEXT NOT NULL,
  lockup_address TEXT NOT NULL,
  redeem_script TEXT NOT NULL,
  expected_amount INTEGER,
  accept_zero_conf INTEGER NOT NULL,
  lockup_transaction_id TEXT,
  lockup_transaction_vout INTEGER,
  onchain_amount INTEGER,
  timeout_block_height INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS swaps_status_idx ON swaps(status);
CREATE INDEX IF NOT EXISTS swaps_lockup_address_idx ON swaps(lockup_address);

CREATE TABLE IF NOT EXISTS reverse_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  status TEXT NOT NULL,
  lockup_address TEXT NOT NULL,
  onchain_amount INTEGER NOT NULL,
  transaction_id TEXT,
  transaction_vout INTEGER,
  timeout_block_height INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS reverse_swaps_status_idx ON reverse_swaps(status);
CREATE INDEX IF NOT EXISTS reverse_swaps_transaction_idx ON reverse_swaps(transaction_id);

CREATE TABLE IF NOT EXISTS chain_swaps (
  id TEXT PRIMARY KEY,
  pair TEXT NOT NULL,
  order_side TEXT NOT NULL,
  status TEXT NOT NULL,
  accept_zero_conf INTEGER NOT NULL,
  receiving_symbol TEXT NOT NULL,
  receiving_lockup_address TEXT NOT NULL,
  receiving_redeem_script TEXT,
  receiving_expected_amount INTEGER,
  receiving_amount INTEGER,
  receiving_transaction_id TEXT,
  receiving_transaction_vout INTEGER,
  receiving_timeout_block_height INTEGER NOT NULL,
  sending_symbol TEXT NOT NULL,
  sending_lockup_address TEXT NOT NULL,
  sending_redeem_script TEXT,
  sending_expected_amount INTEGER,
  sending_amount INTEGER,
  sending_transaction_id TEXT,
  sending_transaction_vout INTEGER,
  sending_timeout_block_height INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS chain_swaps_status_idx ON chain_swaps(status);
CREATE INDEX IF NOT EXISTS chain_swaps_receiving_address_idx ON chain_swaps(receiving_lockup_address);
CREATE INDEX IF NOT EXISTS chain_swaps_sending_transaction_idx ON chain_swaps(sending_transaction_id);

CREATE TABLE IF NOT EXISTS pending_lockup_transactions (
  swap_id TEXT PRIMARY KEY,
  chain_symbol TEXT NOT NULL,
  transaction_hex TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS pending_lockup_transactions_chain_idx ON pending_lockup_transactions(chain_symbol);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn lockup_status(confirmed: bool) -> SwapStatus {
    if confirmed {
        SwapStatus::TransactionConfirmed
    } else {
        SwapStatus::TransactionMempool
    }
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<Swap> {
    Ok(Swap {
        id: row.get(0)?,
        pair: row.get(1)?,
        order_side: order_side_from_str(&row.get::<_, String>(2)?, 2)?,
        status: status_from_str(&row.get::<_, String>(3)?, 3)?,
        lockup_address: row.get(4)?,
        redeem_script_hex: row.get(5)?,
        expected_amount: optional_unsigned(row, 6)?,
        accept_zero_conf: row.get(7)?,
        lockup_transaction_id: row.get(8)?,
        lockup_transaction_vout: optional_unsigned(row, 9)?,
        onchain_amount: optional_unsigned(row, 10)?,
        timeout_block_height: unsigned(row, 11)?,
    })
}

fn reverse_swap_from_row(row: &Row<'_>) -> rusqlite::Result<ReverseSwap> {
    Ok(ReverseSwap {
        id: row.get(0)?,
        pair: row.get(1)?,
        order_side: order_side_from_str(&row.get::<_, String>(2)?, 2)?,
        status: status_from_str(&row.get::<_, String>(3)?, 3)?,
        lockup_address: row.get(4)?,
        onchain_amount: unsigned(row, 5)?,
        transaction_id: row.get(6)?,
        transaction_vout: optional_unsigned(row, 7)?,
        timeout_block_height: unsigned(row, 8)?,
    })
}

fn chain_swap_from_row(row: &Row<'_>) -> rusqlite::Result<ChainSwap> {
    Ok(ChainSwap {
        id: row.get(0)?,
        pair: row.get(1)?,
        order_side: order_side_from_str(&row.get::<_, String>(2)?, 2)?,
        status: status_from_str(&row.get::<_, String>(3)?, 3)?,
        accept_zero_conf: row.get(4)?,
        receiving: chain_swap_data_from_row(row, 5)?,
        sending: chain_swap_data_from_row(row, 13)?,
    })
}

fn chain_swap_data_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ChainSwapData> {
    Ok(ChainSwapData {
        symbol: row.get(offset)?,
        lockup_address: row.get(offset + 1)?,
        redeem_script_hex: row.get(offset + 2)?,
        expected_amount: optional_unsigned(row, offset + 3)?,
        amount: optional_unsigned(row, offset + 4)?,
        transaction_id: row.get(offset + 5)?,
        transaction_vout: optional_unsigned(row, offset + 6)?,
        timeout_block_height: unsigned(row, offset + 7)?,
    })
}

fn pending_lockup_from_row(row: &Row<'_>) -> rusqlite::Result<PendingLockupTransaction> {
    Ok(PendingLockupTransaction {
        swap_id: row.get(0)?,
        chain_symbol: row.get(1)?,
        transaction_hex: row.get(2)?,
    })
}

fn unsigned<T: TryFrom<i64>>(row: &Row<'_>, col: usize) -> rusqlite::Result<T> {
    let value: i64 = row.get(col)?;
    T::try_from(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Integer,
            format!("invalid unsigned value {value}").into(),
        )
    })
}

fn optional_unsigned<T: TryFrom<i64>>(row: &Row<'_>, col: usize) -> rusqlite::Result<Option<T>> {
    let value: Option<i64> = row.get(col)?;
    value
        .map(|value| {
            T::try_from(value).map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    col,
                    Type::Integer,
                    format!("invalid unsigned value {value}").into(),
                )
            })
        })
        .transpose()
}

fn status_list(statuses: &[SwapStatus]) -> String {
    statuses
        .iter()
        .map(|status| format!("'{}'", status_to_str(*status)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn order_side_from_str(s: &str, col: usize) -> rusqlite::Result<OrderSide> {
    match s {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Text,
            format!("unknown order side: {other}").into(),
        )),
    }
}

pub fn status_to_str(status: SwapStatus) -> &'static str {
    match status {
        SwapStatus::Created => "created",
        SwapStatus::InvoiceSet => "invoice_set",
        SwapStatus::TransactionMempool => "transaction_mempool",
        SwapStatus::TransactionConfirmed => "transaction_confirmed",
        SwapStatus::TransactionZeroConfRejected => "transaction_zero_conf_rejected",
        SwapStatus::TransactionLockupFailed => "transaction_lockup_failed",
        SwapStatus::TransactionServerMempool => "transaction_server_mempool",
        SwapStatus::TransactionServerConfirmed => "transaction_server_confirmed",
        SwapStatus::TransactionClaimed => "transaction_claimed",
        SwapStatus::TransactionRefunded => "transaction_refunded",
        SwapStatus::Expired => "expired",
    }
}

fn status_from_str(s: &str, col: usize) -> rusqlite::Result<SwapStatus> {
    match s {
        "created" => Ok(SwapStatus::Created),
        "invoice_set" => Ok(SwapStatus::InvoiceSet),
        "transaction_mempool" => Ok(SwapStatus::TransactionMempool),
        "transaction_confirmed" => Ok(SwapStatus::TransactionConfirmed),
        "transaction_zero_conf_rejected" => Ok(SwapStatus::TransactionZeroConfRejected),
        "transaction_lockup_failed" => Ok(SwapStatus::TransactionLockupFailed),
        "transaction_server_mempool" => Ok(SwapStatus::TransactionServerMempool),
        "transaction_server_confirmed" => Ok(SwapStatus::TransactionServerConfirmed),
        "transaction_claimed" => Ok(SwapStatus::TransactionClaimed),
        "transaction_refunded" => Ok(SwapStatus::TransactionRefunded),
        "expired" => Ok(SwapStatus::Expired),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Text,
            format!("unknown swap status: {other}").into(),
        )),
    }
}
