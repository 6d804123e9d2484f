//! sled-backed [`TradeRepository`]
//!
//! Two trees are used. `details` is content addressed: the key is the sha256
//! of a [`TradeDetails`] CBOR encoding and the value is the encoding itself, so
//! a snapshot repeated across audit records is stored once. `trades` maps a
//! trade id to a [`StoredTrade`] whose audit records refer to their details by
//! hash.
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, abort,
};
use tokio_util::sync::CancellationToken;

use super::aggregate::Trade;
use super::audit::AuditRecord;
use super::error::{TradeError, checkpoint};
use super::execution::{ExecutionConfirmation, ExecutionReceipt};
use super::repository::{TradeRepository, ensure_next_version};
use super::trade::{TimeStamp, TradeDetails};
use super::transitions::{TradeAction, TradeState};

const TRADES_TREE: &str = "trades";
const DETAILS_TREE: &str = "details";

#[derive(Debug, Clone, Copy)]
enum CommitKind {
    Insert,
    Replace,
}

#[derive(Debug, minicbor::Encode, minicbor::Decode)]
struct StoredTrade {
    #[n(0)]
    trade_id: String,
    #[n(1)]
    requester: String,
    #[n(2)]
    approver: Option<String>,
    #[n(3)]
    state: TradeState,
    #[n(4)]
    state_before: TradeState,
    #[n(5)]
    version: u64,
    #[n(6)]
    details_hash: String,
    #[n(7)]
    audit: Vec<StoredAuditRecord>,
    #[n(8)]
    execution_receipt: Option<ExecutionReceipt>,
    #[n(9)]
    execution_confirmation: Option<ExecutionConfirmation>,
}

#[derive(Debug, minicbor::Encode, minicbor::Decode)]
struct StoredAuditRecord {
    #[n(0)]
    step: u64,
    #[n(1)]
    action: TradeAction,
    #[n(2)]
    user_id: String,
    #[n(3)]
    state_before: TradeState,
    #[n(4)]
    state_after: TradeState,
    #[n(5)]
    details_hash: String, // key into the details tree
    #[n(6)]
    timestamp: TimeStamp<Utc>,
    #[n(7)]
    note: Option<String>,
}

#[derive(Clone)]
pub struct SledTradeRepository {
    trades: sled::Tree,
    details: sled::Tree,
}

impl SledTradeRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TradeError> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("failed to open sled db at {}", path.display()))?;
        Self::new(&db)
    }

    pub fn new(db: &sled::Db) -> Result<Self, TradeError> {
        let trades = db.open_tree(TRADES_TREE).context("failed to open trades tree")?;
        let details = db.open_tree(DETAILS_TREE).context("failed to open details tree")?;
        Ok(Self { trades, details })
    }

    /// Number of distinct details snapshots held.
    pub fn snapshot_count(&self) -> usize {
        self.details.len()
    }

    // Builds the stored record plus the snapshots it refers to, keyed by hash.
    fn encode(trade: &Trade) -> Result<(BTreeMap<String, Vec<u8>>, Vec<u8>), TradeError> {
        let mut snapshots = BTreeMap::new();
        let mut put = |details: &TradeDetails| -> Result<String, TradeError> {
            let (hash, cbor) = details.finalise()?;
            snapshots.entry(hash.clone()).or_insert(cbor);
            Ok(hash)
        };

        let details_hash = put(&trade.details)?;
        let audit = trade
            .audit
            .iter()
            .map(|record| -> Result<StoredAuditRecord, TradeError> {
                Ok(StoredAuditRecord {
                    step: record.step,
                    action: record.action,
                    user_id: record.user_id.clone(),
                    state_before: record.state_before,
                    state_after: record.state_after,
                    details_hash: put(&record.details)?,
                    timestamp: record.timestamp.clone(),
                    note: record.note.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let stored = StoredTrade {
            trade_id: trade.trade_id.clone(),
            requester: trade.requester.clone(),
            approver: trade.approver.clone(),
            state: trade.state,
            state_before: trade.state_before,
            version: trade.version,
            details_hash,
            audit,
            execution_receipt: trade.execution_receipt.clone(),
            execution_confirmation: trade.execution_confirmation.clone(),
        };
        let bytes = minicbor::to_vec(&stored).context("failed to encode trade record")?;

        Ok((snapshots, bytes))
    }

    /// Writes the record and its snapshots in one transaction over both trees.
    ///
    /// `CommitKind::Insert` requires the id to be absent. `CommitKind::Replace`
    /// requires the stored version to be exactly one below the incoming one.
    /// Nothing is written when either check fails, so a lost race leaves no
    /// snapshots behind.
    fn commit(&self, trade: &Trade, kind: CommitKind) -> Result<(), TradeError> {
        let (snapshots, bytes) = Self::encode(trade)?;
        let key = trade.trade_id.as_bytes();

        let outcome = (&self.trades, &self.details).transaction(
            |(trades, details)| -> ConflictableTransactionResult<(), TradeError> {
                let current = trades.get(key)?;
                match (kind, current) {
                    (CommitKind::Insert, Some(_)) => {
                        return abort(TradeError::AlreadyExists(trade.trade_id.clone()));
                    }
                    (CommitKind::Replace, None) => {
                        let missing = format!("trade {} not found", trade.trade_id);
                        return abort(TradeError::NotFound(missing));
                    }
                    (CommitKind::Replace, Some(current)) => {
                        let stored = Self::decode_record(&current)
                            .map_err(ConflictableTransactionError::Abort)?;
                        ensure_next_version(stored.version, trade)
                            .map_err(ConflictableTransactionError::Abort)?;
                    }
                    (CommitKind::Insert, None) => {}
                }

                for (hash, cbor) in &snapshots {
                    details.insert(hash.as_bytes(), cbor.as_slice())?;
                }
                trades.insert(key, bytes.as_slice())?;
                Ok(())
            },
        );

        match outcome {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => {
                Err(anyhow::Error::new(err).context("failed to write trade record").into())
            }
        }
    }

    fn decode_record(bytes: &[u8]) -> Result<StoredTrade, TradeError> {
        Ok(minicbor::decode(bytes).context("failed to decode trade record")?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Trade, TradeError> {
        let stored = Self::decode_record(bytes)?;
        let mut cache: HashMap<String, TradeDetails> = HashMap::new();
        let mut load = |hash: &str| -> Result<TradeDetails, TradeError> {
            if let Some(details) = cache.get(hash) {
                return Ok(details.clone());
            }
            let cbor = self
                .details
                .get(hash.as_bytes())
                .context("failed to read details snapshot")?
                .with_context(|| format!("details snapshot {hash} is missing"))?;
            let details: TradeDetails =
                minicbor::decode(&cbor).context("failed to decode details snapshot")?;
            cache.insert(hash.to_string(), details.clone());
            Ok(details)
        };

        let audit = stored
            .audit
            .into_iter()
            .map(|record| -> Result<AuditRecord, TradeError> {
                Ok(AuditRecord {
                    step: record.step,
                    action: record.action,
                    user_id: record.user_id,
                    state_before: record.state_before,
                    state_after: record.state_after,
                    details: load(&record.details_hash)?,
                    timestamp: record.timestamp,
                    note: record.note,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Trade {
            trade_id: stored.trade_id,
            requester: stored.requester,
            approver: stored.approver,
            state: stored.state,
            state_before: stored.state_before,
            version: stored.version,
            details: load(&stored.details_hash)?,
            audit,
            execution_receipt: stored.execution_receipt,
            execution_confirmation: stored.execution_confirmation,
        })
    }
}

#[async_trait]
impl TradeRepository for SledTradeRepository {
    async fn add(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "add trade")?;

        self.commit(trade, CommitKind::Insert)?;

        tracing::debug!(trade_id = %trade.trade_id, version = trade.version, "trade added to sled");
        Ok(trade.clone())
    }

    async fn get_by_id(&self, trade_id: &str, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "load trade")?;

        let bytes = self
            .trades
            .get(trade_id.as_bytes())
            .context("failed to read trade record")?
            .ok_or_else(|| TradeError::NotFound(format!("trade {trade_id} not found")))?;
        let trade = self.decode(&bytes)?;

        checkpoint(token, "load trade")?;
        Ok(trade)
    }

    async fn update(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "update trade")?;

        self.commit(trade, CommitKind::Replace)?;

        tracing::debug!(trade_id = %trade.trade_id, version = trade.version, "trade updated in sled");
        Ok(trade.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{Direction, TradeStyle};

    fn details(amount: u64) -> TradeDetails {
        let day = TimeStamp::new_with(2025, 1, 2, 0, 0, 0).unwrap();
        TradeDetails::builder()
            .set_trading_entity("BankA")
            .set_counterparty("BankB")
            .set_direction(Direction::Buy)
            .set_style(TradeStyle::Forward)
            .set_notional_currency("USD")
            .set_notional_amount(amount)
            .set_underlying("USD/EUR")
            .set_trade_date(day.clone())
            .set_value_date(day.plus_days(2))
            .set_delivery_date(day.plus_days(5))
            .build()
            .unwrap()
    }

    #[test]
    fn stored_record_round_trips_through_both_trees() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledTradeRepository::open(dir.path().join("trades.sled")).unwrap();

        let at = TimeStamp::new_with(2025, 1, 2, 3, 4, 5).unwrap();
        let mut trade = Trade::new("trade_1", "alice", details(1_000_000));
        trade.change("alice", TradeAction::Create, at.clone()).unwrap();
        trade.change("alice", TradeAction::Submit, at.clone()).unwrap();
        trade.replace_details(details(2_000_000));
        trade.change("bob", TradeAction::Update, at).unwrap();

        repo.commit(&trade, CommitKind::Insert).unwrap();
        let bytes = repo.trades.get(trade.trade_id.as_bytes()).unwrap().unwrap();
        let decoded = repo.decode(&bytes).unwrap();

        assert_eq!(decoded, trade);
        // create and submit share one snapshot, the update adds the second
        assert_eq!(repo.snapshot_count(), 2);
    }

    #[test]
    fn rejected_writes_leave_no_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SledTradeRepository::open(dir.path().join("trades.sled")).unwrap();

        let at = TimeStamp::new_with(2025, 1, 2, 3, 4, 5).unwrap();
        let mut trade = Trade::new("trade_1", "alice", details(1_000_000));
        trade.change("alice", TradeAction::Create, at.clone()).unwrap();
        repo.commit(&trade, CommitKind::Insert).unwrap();

        let mut other = Trade::new("trade_1", "alice", details(3_000_000));
        other.change("alice", TradeAction::Create, at.clone()).unwrap();
        let err = repo.commit(&other, CommitKind::Insert).unwrap_err();
        assert!(matches!(err, TradeError::AlreadyExists(_)));

        // two versions ahead of the stored one
        trade.replace_details(details(4_000_000));
        trade.change("alice", TradeAction::Update, at.clone()).unwrap();
        trade.change("alice", TradeAction::Submit, at).unwrap();
        let err = repo.commit(&trade, CommitKind::Replace).unwrap_err();
        assert!(matches!(err, TradeError::Concurrency { expected: 2, found: 1, .. }));

        assert_eq!(repo.snapshot_count(), 1);
    }
}
