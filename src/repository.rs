//! Persistence contract for trade aggregates, plus an in-memory implementation
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::aggregate::Trade;
use super::error::{TradeError, checkpoint};

/// Stores independent copies of aggregates. Nothing a caller holds is ever
/// aliased by the store, and nothing the store returns aliases its contents.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Persists a new aggregate. Fails with [`TradeError::AlreadyExists`] on a duplicate id.
    async fn add(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError>;

    /// Loads a copy of the aggregate. Fails with [`TradeError::NotFound`].
    async fn get_by_id(&self, trade_id: &str, token: &CancellationToken) -> Result<Trade, TradeError>;

    /// Replaces the stored aggregate, provided the stored version is exactly
    /// `trade.version() - 1`. Otherwise fails with [`TradeError::Concurrency`].
    async fn update(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError>;
}

pub(crate) fn ensure_next_version(stored: u64, incoming: &Trade) -> Result<(), TradeError> {
    if incoming.version() != stored + 1 {
        tracing::warn!(
            trade_id = incoming.trade_id(),
            stored,
            incoming = incoming.version(),
            "stale trade version rejected"
        );
        return Err(TradeError::Concurrency {
            trade_id: incoming.trade_id().to_string(),
            expected: incoming.version().saturating_sub(1),
            found: stored,
        });
    }
    Ok(())
}

/// Process-local store for tests and prototyping. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryTradeRepository {
    trades: RwLock<HashMap<String, Trade>>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.trades.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.trades.read().await.is_empty()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn add(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "add trade")?;

        let mut trades = self.trades.write().await;
        if trades.contains_key(trade.trade_id()) {
            return Err(TradeError::AlreadyExists(trade.trade_id().to_string()));
        }
        trades.insert(trade.trade_id().to_string(), trade.clone());

        tracing::debug!(trade_id = trade.trade_id(), version = trade.version(), "trade added");
        Ok(trade.clone())
    }

    async fn get_by_id(&self, trade_id: &str, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "load trade")?;

        let trade = self
            .trades
            .read()
            .await
            .get(trade_id)
            .cloned()
            .ok_or_else(|| TradeError::NotFound(format!("trade {trade_id} not found")))?;

        checkpoint(token, "load trade")?;
        Ok(trade)
    }

    async fn update(&self, trade: &Trade, token: &CancellationToken) -> Result<Trade, TradeError> {
        checkpoint(token, "update trade")?;

        let mut trades = self.trades.write().await;
        let stored = trades.get(trade.trade_id()).ok_or_else(|| {
            TradeError::NotFound(format!("trade {} not found", trade.trade_id()))
        })?;
        ensure_next_version(stored.version(), trade)?;
        trades.insert(trade.trade_id().to_string(), trade.clone());

        tracing::debug!(trade_id = trade.trade_id(), version = trade.version(), "trade updated");
        Ok(trade.clone())
    }
}
