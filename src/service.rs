//! Service layer API for trade workflow operations
//!
//! These are the seams a transport layer binds to. Each call builds the
//! matching command and runs it; no state is kept between calls.
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::aggregate::Trade;
use super::audit::{TradeDiff, TradeHistory};
use super::clock::{SystemClock, TimeProvider};
use super::commands::{
    ApproveCommand, BookCommand, CancelCommand, CreateCommand, DifferencesCommand, HistoryCommand,
    SendToExecuteCommand, SubmitCommand, UpdateCommand,
};
use super::config::{StorageBackend, WorkflowConfig};
use super::error::TradeError;
use super::execution::{ExecutionConfirmation, SimulatedExecutor, TradeExecutor};
use super::repository::{InMemoryTradeRepository, TradeRepository};
use super::store::SledTradeRepository;
use super::trade::TradeDetails;
use super::transitions::TRANSITION_TABLE;

#[derive(Clone)]
pub struct TradeApprovalService {
    executor: Arc<dyn TradeExecutor>,
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl TradeApprovalService {
    pub fn new(
        executor: Arc<dyn TradeExecutor>,
        repository: Arc<dyn TradeRepository>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            executor,
            repository,
            clock,
        }
    }

    /// Create a draft trade; `user` becomes its requester
    pub async fn create(
        &self,
        user: &str,
        details: TradeDetails,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        CreateCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, details, token)
            .await
    }

    /// Replace trade details. From pending approval this requires re-approval.
    pub async fn update(
        &self,
        user: &str,
        trade_id: &str,
        details: TradeDetails,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        UpdateCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, trade_id, details, token)
            .await
    }

    /// Submit a draft for approval
    pub async fn submit(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        SubmitCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, trade_id, token)
            .await
    }

    pub async fn approve(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        ApproveCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, trade_id, token)
            .await
    }

    pub async fn cancel(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        CancelCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, trade_id, token)
            .await
    }

    /// Send approved trade to execution
    pub async fn send_to_execute(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        SendToExecuteCommand::new(
            self.executor.clone(),
            self.repository.clone(),
            self.clock.clone(),
        )
        .run(user, trade_id, token)
        .await
    }

    /// Book an executed trade
    pub async fn book(
        &self,
        user: &str,
        trade_id: &str,
        confirmation: ExecutionConfirmation,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        BookCommand::new(self.repository.clone(), self.clock.clone())
            .run(user, trade_id, confirmation, token)
            .await
    }
}

#[derive(Clone)]
pub struct TradeHistoryService {
    repository: Arc<dyn TradeRepository>,
}

impl TradeHistoryService {
    pub fn new(repository: Arc<dyn TradeRepository>) -> Self {
        Self { repository }
    }

    pub async fn get_history(
        &self,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<TradeHistory, TradeError> {
        HistoryCommand::new(self.repository.clone())
            .run(trade_id, token)
            .await
    }

    pub async fn get_differences(
        &self,
        trade_id: &str,
        version_a: u64,
        version_b: u64,
        token: &CancellationToken,
    ) -> Result<TradeDiff, TradeError> {
        DifferencesCommand::new(self.repository.clone())
            .run(trade_id, version_a, version_b, token)
            .await
    }
}

/// Both services wired over one repository.
#[derive(Clone)]
pub struct TradeWorkflow {
    pub approvals: TradeApprovalService,
    pub history: TradeHistoryService,
}

impl TradeWorkflow {
    pub fn new(
        executor: Arc<dyn TradeExecutor>,
        repository: Arc<dyn TradeRepository>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            approvals: TradeApprovalService::new(executor, repository.clone(), clock),
            history: TradeHistoryService::new(repository),
        }
    }

    /// Verifies the transition table, then builds the configured repository and executor.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, TradeError> {
        TRANSITION_TABLE.verify()?;

        let clock: Arc<dyn TimeProvider> = Arc::new(SystemClock);
        let repository: Arc<dyn TradeRepository> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryTradeRepository::new()),
            StorageBackend::Sled => Arc::new(SledTradeRepository::open(&config.storage.sled_path)?),
        };
        let executor: Arc<dyn TradeExecutor> = Arc::new(SimulatedExecutor::new(
            config.executor.venue.clone(),
            Duration::from_millis(config.executor.latency_ms),
            clock.clone(),
        ));

        tracing::info!(
            backend = ?config.storage.backend,
            venue = %config.executor.venue,
            "trade workflow ready"
        );

        Ok(Self::new(executor, repository, clock))
    }
}
