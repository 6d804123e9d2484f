//! Walks one trade through its whole lifecycle on a throwaway sled database,
//! then prints the audit trail and the diff introduced by the re-approval cycle.
//!
//! Run with `cargo run --example sled`. Set `RUST_LOG=trade_approval=debug` to
//! see repository traffic.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use trade_approval::clock::{SystemClock, TimeProvider};
use trade_approval::config::WorkflowConfig;
use trade_approval::execution::{ExecutionConfirmation, SimulatedExecutor};
use trade_approval::store::SledTradeRepository;
use trade_approval::telemetry::init_tracing;
use trade_approval::{Direction, TimeStamp, TradeDetails, TradeStyle, TradeWorkflow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkflowConfig::load(None)?;
    init_tracing(&config.logging.filter)?;

    let temp_dir = tempfile::tempdir()?;
    let repository = Arc::new(SledTradeRepository::open(temp_dir.path().join("demo.sled"))?);
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemClock);
    let executor = Arc::new(SimulatedExecutor::new(
        config.executor.venue.clone(),
        Duration::from_millis(config.executor.latency_ms),
        clock.clone(),
    ));
    let workflow = TradeWorkflow::new(executor, repository.clone(), clock);
    let token = CancellationToken::new();

    let requester = "alice";
    let checker = "bob";
    let today = TimeStamp::new();

    let details = TradeDetails::builder()
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
        .build()?;

    let trade = workflow.approvals.create(requester, details, &token).await?;
    let trade_id = trade.trade_id().to_string();
    workflow.approvals.submit(requester, &trade_id, &token).await?;

    // a checker amends the notional, which sends the trade back for re-approval
    let amended = TradeDetails {
        notional_amount: 2_000_000,
        ..trade.details().clone()
    };
    workflow
        .approvals
        .update(checker, &trade_id, amended, &token)
        .await?;
    workflow.approvals.approve(requester, &trade_id, &token).await?;

    let trade = workflow
        .approvals
        .send_to_execute(requester, &trade_id, &token)
        .await?;
    let receipt = trade
        .execution_receipt()
        .context("send to execute did not attach a receipt")?;

    let confirmation = ExecutionConfirmation {
        ticket_id: receipt.ticket_id.clone(),
        confirmation_id: "CONF12345".to_string(),
        counterparty: trade.details().counterparty.clone(),
        strike: "1.2345".parse()?,
        timestamp: TimeStamp::new(),
    };
    let trade = workflow
        .approvals
        .book(requester, &trade_id, confirmation, &token)
        .await?;

    println!("trade {} is {}", trade.trade_id(), trade.state());

    let history = workflow.history.get_history(&trade_id, &token).await?;
    for record in &history.records {
        println!("{record}");
    }

    let diff = workflow
        .history
        .get_differences(&trade_id, 2, trade.version(), &token)
        .await?;
    for (field, (before, after)) in &diff.changes {
        println!("{field}: {before} -> {after}");
    }

    println!(
        "{} audit records share {} stored detail snapshots",
        history.records.len(),
        repository.snapshot_count()
    );

    Ok(())
}
