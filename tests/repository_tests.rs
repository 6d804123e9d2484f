//! Repository and cancellation tests
//!
//! Both repositories are held to the same contract. Sled uses file-based
//! locking, so every sled test opens its own database under a tempdir.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CHECKER, Fixture, REQUESTER, details_with_notional, fixed_now, trade_in};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use trade_approval::clock::FixedClock;
use trade_approval::execution::{SimulatedExecutor, TradeExecutor};
use trade_approval::repository::{InMemoryTradeRepository, TradeRepository};
use trade_approval::store::SledTradeRepository;
use trade_approval::{
    ErrorKind, TimeStamp, TradeAction, TradeApprovalService, TradeDetails, TradeState,
};

async fn stale_copy_is_rejected(repo: &dyn TradeRepository) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    repo.add(&trade_in(TradeState::PendingApproval), &token).await?;

    // two users load the same version
    let mut first = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
    let mut second = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;

    first.assign_approver(CHECKER);
    first.change(CHECKER, TradeAction::Approve, fixed_now())?;
    repo.update(&first, &token).await?;

    second.change(CHECKER, TradeAction::Cancel, fixed_now())?;
    let err = repo.update(&second, &token).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Concurrency);
    assert!(err.to_string().contains("found 3"));
    let stored = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
    assert_eq!(stored.state(), TradeState::Approved);
    Ok(())
}

async fn duplicate_add_is_rejected(repo: &dyn TradeRepository) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    repo.add(&trade_in(TradeState::Draft), &token).await?;

    let err = repo
        .add(&trade_in(TradeState::Cancelled), &token)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    let stored = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
    assert_eq!(stored.state(), TradeState::Draft);
    Ok(())
}

async fn loads_are_independent_copies(repo: &dyn TradeRepository) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let original = trade_in(TradeState::Draft);
    repo.add(&original, &token).await?;

    let mut loaded = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
    loaded.change(REQUESTER, TradeAction::Submit, fixed_now())?;

    let reloaded = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
    assert_eq!(reloaded, original);
    Ok(())
}

async fn missing_trade_is_not_found(repo: &dyn TradeRepository) -> anyhow::Result<()> {
    let token = CancellationToken::new();

    let err = repo.get_by_id("trade_missing", &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut trade = trade_in(TradeState::Draft);
    trade.change(REQUESTER, TradeAction::Submit, fixed_now())?;
    let err = repo.update(&trade, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

async fn cancelled_token_touches_nothing(repo: &dyn TradeRepository) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    token.cancel();

    let err = repo.add(&trade_in(TradeState::Draft), &token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_domain());

    let live = CancellationToken::new();
    let err = repo.get_by_id(common::FIXTURE_TRADE_ID, &live).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

// IN-MEMORY REPOSITORY
#[cfg(test)]
mod in_memory_tests {
    use super::*;

    #[tokio::test]
    async fn stale_copy() -> anyhow::Result<()> {
        stale_copy_is_rejected(&InMemoryTradeRepository::new()).await
    }

    #[tokio::test]
    async fn duplicate_add() -> anyhow::Result<()> {
        duplicate_add_is_rejected(&InMemoryTradeRepository::new()).await
    }

    #[tokio::test]
    async fn independent_copies() -> anyhow::Result<()> {
        loads_are_independent_copies(&InMemoryTradeRepository::new()).await
    }

    #[tokio::test]
    async fn not_found() -> anyhow::Result<()> {
        missing_trade_is_not_found(&InMemoryTradeRepository::new()).await
    }

    #[tokio::test]
    async fn cancelled_token() -> anyhow::Result<()> {
        let repo = InMemoryTradeRepository::new();
        cancelled_token_touches_nothing(&repo).await?;
        assert!(repo.is_empty().await);
        Ok(())
    }
}

// SLED REPOSITORY
#[cfg(test)]
mod sled_tests {
    use super::*;

    fn open_repo(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<SledTradeRepository> {
        Ok(SledTradeRepository::open(dir.path().join(name))?)
    }

    #[tokio::test]
    async fn stale_copy() -> anyhow::Result<()> {
        let dir = tempdir()?;
        stale_copy_is_rejected(&open_repo(&dir, "stale.sled")?).await
    }

    #[tokio::test]
    async fn duplicate_add() -> anyhow::Result<()> {
        let dir = tempdir()?;
        duplicate_add_is_rejected(&open_repo(&dir, "duplicate.sled")?).await
    }

    #[tokio::test]
    async fn independent_copies() -> anyhow::Result<()> {
        let dir = tempdir()?;
        loads_are_independent_copies(&open_repo(&dir, "copies.sled")?).await
    }

    #[tokio::test]
    async fn not_found() -> anyhow::Result<()> {
        let dir = tempdir()?;
        missing_trade_is_not_found(&open_repo(&dir, "missing.sled")?).await
    }

    #[tokio::test]
    async fn cancelled_token() -> anyhow::Result<()> {
        let dir = tempdir()?;
        cancelled_token_touches_nothing(&open_repo(&dir, "cancelled.sled")?).await
    }

    /// Records survive closing and reopening the database
    #[tokio::test]
    async fn trades_persist_across_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reopen.sled");
        let token = CancellationToken::new();
        let trade = trade_in(TradeState::Executed);

        {
            let repo = SledTradeRepository::open(&path)?;
            repo.add(&trade, &token).await?;
        }

        let repo = SledTradeRepository::open(&path)?;
        let loaded = repo.get_by_id(trade.trade_id(), &token).await?;

        assert_eq!(loaded, trade);
        assert_eq!(loaded.audit().len(), 5);
        Ok(())
    }

    /// Unchanged details across steps are stored once
    #[tokio::test]
    async fn identical_snapshots_are_deduplicated() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let repo = open_repo(&dir, "dedup.sled")?;
        let token = CancellationToken::new();

        repo.add(&trade_in(TradeState::SentToCounterparty), &token).await?;

        assert_eq!(repo.snapshot_count(), 1);
        Ok(())
    }

    /// A write that loses its version or existence check stores none of its snapshots
    #[tokio::test]
    async fn rejected_writes_store_no_snapshots() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let repo = open_repo(&dir, "rejected.sled")?;
        let token = CancellationToken::new();
        repo.add(&trade_in(TradeState::Draft), &token).await?;

        let mut first = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
        let mut second = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
        first.change(REQUESTER, TradeAction::Submit, fixed_now())?;
        repo.update(&first, &token).await?;

        second.replace_details(details_with_notional(7_000_000));
        second.change(REQUESTER, TradeAction::Update, fixed_now())?;
        let err = repo.update(&second, &token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Concurrency);

        let mut duplicate = trade_in(TradeState::Draft);
        duplicate.replace_details(details_with_notional(9_000_000));
        let err = repo.add(&duplicate, &token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        assert_eq!(repo.snapshot_count(), 1);
        let stored = repo.get_by_id(common::FIXTURE_TRADE_ID, &token).await?;
        assert_eq!(stored, first);
        Ok(())
    }

    /// Dates past 2262 cannot be stored, so creation rejects them as invalid input
    #[tokio::test]
    async fn out_of_range_dates_are_rejected_before_storage() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let repository = Arc::new(open_repo(&dir, "range.sled")?);
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let executor = Arc::new(SimulatedExecutor::new("TEST", Duration::ZERO, clock.clone()));
        let service = TradeApprovalService::new(executor, repository.clone(), clock);
        let details = TradeDetails {
            delivery_date: TimeStamp::new_with(2300, 1, 1, 0, 0, 0).unwrap(),
            ..common::valid_details()
        };

        let err = service
            .create(REQUESTER, details, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("delivery_date"), "{err}");
        assert_eq!(repository.snapshot_count(), 0);
        Ok(())
    }
}

// CANCELLATION THROUGH THE SERVICE
#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_submit_leaves_the_stored_trade_alone() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.seed(TradeState::Draft).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = fx
            .workflow
            .approvals
            .submit(REQUESTER, &id, &token)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let stored = fx.repository.get_by_id(&id, &fx.token).await?;
        assert_eq!(stored.state(), TradeState::Draft);
        assert_eq!(stored.version(), 1);
        Ok(())
    }

    /// Cancelling while the venue is still working aborts the send
    #[tokio::test]
    async fn cancel_during_send_aborts_before_persisting() -> anyhow::Result<()> {
        let fx = Fixture::new();
        let id = fx.seed(TradeState::Approved).await;
        let slow_venue: Arc<dyn TradeExecutor> = Arc::new(SimulatedExecutor::new(
            "SLOW",
            Duration::from_secs(30),
            Arc::new(FixedClock::new(fixed_now())),
        ));
        let service = TradeApprovalService::new(slow_venue, fx.repository(), fx.clock.clone());

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = service
            .send_to_execute(CHECKER, &id, &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let stored = fx.repository.get_by_id(&id, &fx.token).await?;
        assert_eq!(stored.state(), TradeState::Approved);
        assert!(stored.execution_receipt().is_none());
        Ok(())
    }
}
