//! One command per workflow action
//!
//! Every mutating command follows the same protocol: load the aggregate,
//! validate the action against the transition table, mutate, then persist with
//! the repository's optimistic version check. Commands hold no state of their
//! own beyond handles to their collaborators.
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::aggregate::Trade;
use super::audit::{TradeDiff, TradeHistory};
use super::clock::TimeProvider;
use super::error::{TradeError, checkpoint};
use super::execution::{ExecutionConfirmation, TradeExecutor};
use super::repository::TradeRepository;
use super::trade::TradeDetails;
use super::transitions::TradeAction;
use super::utils;

pub struct CreateCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl CreateCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "create_trade", skip_all, fields(user = %user))]
    pub async fn run(
        &self,
        user: &str,
        details: TradeDetails,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = Trade::new(utils::new_trade_id()?, user, details);

        // details must be valid from the outset
        trade.validate(user, TradeAction::Create, Some(trade.details()))?;

        trade.change(user, TradeAction::Create, self.clock.now())?;

        self.repository.add(&trade, token).await
    }
}

pub struct UpdateCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl UpdateCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "update_trade", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        new_details: TradeDetails,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::Update, Some(&new_details))?;

        trade.replace_details(new_details);
        trade.change(user, TradeAction::Update, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct SubmitCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl SubmitCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "submit_trade", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::Submit, None)?;

        trade.change(user, TradeAction::Submit, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct ApproveCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl ApproveCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "approve_trade", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::Approve, None)?;

        // The table does not assign the approver; whoever approves becomes it.
        trade.assign_approver(user);
        trade.change(user, TradeAction::Approve, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct CancelCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl CancelCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "cancel_trade", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::Cancel, None)?;

        trade.change(user, TradeAction::Cancel, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct SendToExecuteCommand {
    executor: Arc<dyn TradeExecutor>,
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl SendToExecuteCommand {
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

    #[tracing::instrument(name = "send_to_execute", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::SendToExecute, None)?;

        let receipt = self.executor.send(&trade, token).await?;
        checkpoint(token, "send to execute")?;
        trade.attach_receipt(receipt);
        trade.change(user, TradeAction::SendToExecute, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct BookCommand {
    repository: Arc<dyn TradeRepository>,
    clock: Arc<dyn TimeProvider>,
}

impl BookCommand {
    pub fn new(repository: Arc<dyn TradeRepository>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repository, clock }
    }

    #[tracing::instrument(name = "book_trade", skip_all, fields(user = %user, trade_id = %trade_id))]
    pub async fn run(
        &self,
        user: &str,
        trade_id: &str,
        confirmation: ExecutionConfirmation,
        token: &CancellationToken,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.repository.get_by_id(trade_id, token).await?;

        trade.validate(user, TradeAction::Book, None)?;
        if !confirmation.timestamp.is_encodable() {
            return Err(TradeError::validation(
                "timestamp",
                "is outside the supported date range",
            ));
        }

        let booked = trade
            .details()
            .with_booking(confirmation.strike, &confirmation.confirmation_id);
        trade.attach_confirmation(confirmation);
        trade.replace_details(booked);
        trade.change(user, TradeAction::Book, self.clock.now())?;

        self.repository.update(&trade, token).await
    }
}

pub struct HistoryCommand {
    repository: Arc<dyn TradeRepository>,
}

impl HistoryCommand {
    pub fn new(repository: Arc<dyn TradeRepository>) -> Self {
        Self { repository }
    }

    pub async fn run(
        &self,
        trade_id: &str,
        token: &CancellationToken,
    ) -> Result<TradeHistory, TradeError> {
        let trade = self.repository.get_by_id(trade_id, token).await?;

        Ok(trade.to_history())
    }
}

pub struct DifferencesCommand {
    repository: Arc<dyn TradeRepository>,
}

impl DifferencesCommand {
    pub fn new(repository: Arc<dyn TradeRepository>) -> Self {
        Self { repository }
    }

    pub async fn run(
        &self,
        trade_id: &str,
        version_a: u64,
        version_b: u64,
        token: &CancellationToken,
    ) -> Result<TradeDiff, TradeError> {
        let trade = self.repository.get_by_id(trade_id, token).await?;

        trade.get_differences(version_a, version_b)
    }
}
