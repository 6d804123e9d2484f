//! Shared fixture for the integration tests
//!
//! Everything here is deterministic: a fixed clock, fixed users and a trade
//! whose dates are derived from the fixed instant.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use trade_approval::clock::{FixedClock, TimeProvider};
use trade_approval::execution::{ExecutionConfirmation, SimulatedExecutor, TradeExecutor};
use trade_approval::repository::{InMemoryTradeRepository, TradeRepository};
use trade_approval::{
    Direction, TimeStamp, Trade, TradeAction, TradeDetails, TradeState, TradeStyle, TradeWorkflow,
};

pub const REQUESTER: &str = "requester";
pub const CHECKER: &str = "checker";
pub const OUTSIDER: &str = "outsider";
pub const FIXTURE_TRADE_ID: &str = "trade_fixture";

pub fn fixed_now() -> TimeStamp<Utc> {
    TimeStamp::new_with(2025, 1, 2, 3, 4, 5).expect("valid fixture instant")
}

/// BankA buys a 1,000,000 USD/EUR forward. Value date T+2, delivery T+5.
pub fn valid_details() -> TradeDetails {
    let today = fixed_now();
    TradeDetails::builder()
        .set_trading_entity("BankA")
        .set_counterparty("BankB")
        .set_direction(Direction::Buy)
        .set_style(TradeStyle::Forward)
        .set_notional_currency("USD")
        .set_notional_amount(1_000_000)
        .set_underlying("USD/EUR")
        .set_trade_date(today.clone())
        .set_value_date(today.plus_days(2))
        .set_delivery_date(today.plus_days(5))
        .build()
        .expect("fixture details are valid")
}

pub fn details_with_notional(amount: u64) -> TradeDetails {
    TradeDetails {
        notional_amount: amount,
        ..valid_details()
    }
}

pub fn confirmation(ticket_id: &str) -> ExecutionConfirmation {
    ExecutionConfirmation {
        ticket_id: ticket_id.to_string(),
        confirmation_id: "CONF12345".to_string(),
        counterparty: "BankB".to_string(),
        strike: "1.2345".parse().expect("valid strike"),
        timestamp: fixed_now(),
    }
}

/// Shortest path of `(user, action)` steps from a fresh aggregate to `state`.
pub fn path_to(state: TradeState) -> Vec<(&'static str, TradeAction)> {
    use TradeAction::*;

    let to_pending = vec![(REQUESTER, Create), (REQUESTER, Submit)];
    let to_approved = [to_pending.clone(), vec![(CHECKER, Approve)]].concat();
    let to_sent = [to_approved.clone(), vec![(CHECKER, SendToExecute)]].concat();

    match state {
        TradeState::Initial => vec![],
        TradeState::Draft => vec![(REQUESTER, Create)],
        TradeState::PendingApproval => to_pending,
        TradeState::NeedsReapproval => [to_pending, vec![(CHECKER, Update)]].concat(),
        TradeState::Approved => to_approved,
        TradeState::SentToCounterparty => to_sent,
        TradeState::Executed => [to_sent, vec![(REQUESTER, Book)]].concat(),
        TradeState::Cancelled => vec![(REQUESTER, Create), (REQUESTER, Cancel)],
    }
}

/// Drives a fixture trade to `state` through the aggregate API alone.
pub fn trade_in(state: TradeState) -> Trade {
    let mut trade = Trade::new(FIXTURE_TRADE_ID, REQUESTER, valid_details());
    for (user, action) in path_to(state) {
        if action == TradeAction::Approve {
            trade.assign_approver(user);
        }
        trade
            .change(user, action, fixed_now())
            .expect("fixture path follows the table");
    }
    assert_eq!(trade.state(), state);
    trade
}

pub struct Fixture {
    pub repository: Arc<InMemoryTradeRepository>,
    pub clock: Arc<dyn TimeProvider>,
    pub executor: Arc<dyn TradeExecutor>,
    pub workflow: TradeWorkflow,
    pub token: CancellationToken,
}

impl Fixture {
    pub fn new() -> Self {
        let repository = Arc::new(InMemoryTradeRepository::new());
        let clock: Arc<dyn TimeProvider> = Arc::new(FixedClock::new(fixed_now()));
        let executor: Arc<dyn TradeExecutor> =
            Arc::new(SimulatedExecutor::new("TEST", Duration::ZERO, clock.clone()));
        let workflow = TradeWorkflow::new(executor.clone(), repository.clone(), clock.clone());

        Self {
            repository,
            clock,
            executor,
            workflow,
            token: CancellationToken::new(),
        }
    }

    pub fn repository(&self) -> Arc<dyn TradeRepository> {
        self.repository.clone()
    }

    /// Stores a fixture trade already in `state` and returns its id.
    pub async fn seed(&self, state: TradeState) -> String {
        let trade = trade_in(state);
        self.repository
            .add(&trade, &self.token)
            .await
            .expect("seeding an empty repository");
        trade.trade_id().to_string()
    }
}
