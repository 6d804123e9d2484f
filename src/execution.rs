//! Execution venue contract and the artifacts it produces
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::aggregate::Trade;
use super::clock::TimeProvider;
use super::error::{TradeError, checkpoint};
use super::trade::{Strike, TimeStamp};

/// Issued by the venue when a trade is sent for execution.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    #[n(0)]
    pub ticket_id: String,
    #[n(1)]
    pub sent_at: TimeStamp<Utc>,
    #[n(2)]
    pub venue: String,
    #[n(3)]
    pub status: String,
    #[n(4)]
    pub notes: String,
}

/// Supplied by the booking user once the counterparty has confirmed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfirmation {
    #[n(0)]
    pub ticket_id: String,
    #[n(1)]
    pub confirmation_id: String,
    #[n(2)]
    pub counterparty: String,
    #[n(3)]
    pub strike: Strike,
    #[n(4)]
    pub timestamp: TimeStamp<Utc>,
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Submits the trade to the venue. Implementations must honour `token`.
    async fn send(
        &self,
        trade: &Trade,
        token: &CancellationToken,
    ) -> Result<ExecutionReceipt, TradeError>;
}

/// Stand-in venue: waits `latency`, then acknowledges every trade.
pub struct SimulatedExecutor {
    venue: String,
    latency: Duration,
    clock: Arc<dyn TimeProvider>,
}

impl SimulatedExecutor {
    pub fn new(venue: impl Into<String>, latency: Duration, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            venue: venue.into(),
            latency,
            clock,
        }
    }
}

#[async_trait]
impl TradeExecutor for SimulatedExecutor {
    async fn send(
        &self,
        trade: &Trade,
        token: &CancellationToken,
    ) -> Result<ExecutionReceipt, TradeError> {
        checkpoint(token, "send to execution venue")?;

        tokio::select! {
            () = token.cancelled() => {
                return Err(TradeError::Cancelled(format!(
                    "send of trade {} to {} was cancelled",
                    trade.trade_id(),
                    self.venue
                )));
            }
            () = tokio::time::sleep(self.latency) => {}
        }

        tracing::debug!(trade_id = trade.trade_id(), venue = %self.venue, "trade sent to venue");

        Ok(ExecutionReceipt {
            ticket_id: format!("TICKET-{}", trade.trade_id()),
            sent_at: self.clock.now(),
            venue: self.venue.clone(),
            status: "SENT".to_string(),
            notes: "Simulated execution".to_string(),
        })
    }
}
