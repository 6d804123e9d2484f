//! The trade aggregate: current state, version and append-only audit trail
use chrono::Utc;

use super::audit::{AuditRecord, TradeDiff, TradeHistory};
use super::error::TradeError;
use super::execution::{ExecutionConfirmation, ExecutionReceipt};
use super::trade::{TimeStamp, TradeDetails};
use super::transitions::{TRANSITION_TABLE, TradeAction, TradeState};

/// Unit of consistency and versioning. Repositories hand out independent
/// copies, so an instance is only ever mutated by the command holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub(crate) trade_id: String,
    pub(crate) requester: String,
    pub(crate) approver: Option<String>,
    pub(crate) state: TradeState,
    pub(crate) state_before: TradeState,
    pub(crate) version: u64, // optimistic concurrency token, +1 per transition
    pub(crate) details: TradeDetails,
    pub(crate) audit: Vec<AuditRecord>,
    pub(crate) execution_receipt: Option<ExecutionReceipt>,
    pub(crate) execution_confirmation: Option<ExecutionConfirmation>,
}

impl Trade {
    /// A fresh aggregate in [`TradeState::Initial`] at version 0.
    pub fn new(trade_id: impl Into<String>, requester: impl Into<String>, details: TradeDetails) -> Self {
        Self {
            trade_id: trade_id.into(),
            requester: requester.into(),
            approver: None,
            state: TradeState::Initial,
            state_before: TradeState::Initial,
            version: 0,
            details,
            audit: vec![],
            execution_receipt: None,
            execution_confirmation: None,
        }
    }

    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }
    pub fn requester(&self) -> &str {
        &self.requester
    }
    pub fn approver(&self) -> Option<&str> {
        self.approver.as_deref()
    }
    pub fn state(&self) -> TradeState {
        self.state
    }
    pub fn state_before(&self) -> TradeState {
        self.state_before
    }
    pub fn version(&self) -> u64 {
        self.version
    }
    pub fn details(&self) -> &TradeDetails {
        &self.details
    }
    pub fn audit(&self) -> &[AuditRecord] {
        &self.audit
    }
    pub fn execution_receipt(&self) -> Option<&ExecutionReceipt> {
        self.execution_receipt.as_ref()
    }
    pub fn execution_confirmation(&self) -> Option<&ExecutionConfirmation> {
        self.execution_confirmation.as_ref()
    }

    pub fn assign_approver(&mut self, user: &str) {
        self.approver = Some(user.to_string());
    }
    pub fn replace_details(&mut self, details: TradeDetails) {
        self.details = details;
    }
    pub fn attach_receipt(&mut self, receipt: ExecutionReceipt) {
        self.execution_receipt = Some(receipt);
    }
    pub fn attach_confirmation(&mut self, confirmation: ExecutionConfirmation) {
        self.execution_confirmation = Some(confirmation);
    }

    pub fn available_actions(&self) -> Vec<TradeAction> {
        TRANSITION_TABLE.available_actions(self.state)
    }

    pub fn is_terminal(&self) -> bool {
        TRANSITION_TABLE.is_terminal(self.state)
    }

    /// Checks that `user` may perform `action` from the current state.
    ///
    /// Authorization is decided before `new_details` is looked at, so an
    /// unauthorised update reports [`TradeError::Authorization`] even when the
    /// proposed details are invalid as well.
    pub fn validate(
        &self,
        user: &str,
        action: TradeAction,
        new_details: Option<&TradeDetails>,
    ) -> Result<(), TradeError> {
        if !TRANSITION_TABLE.is_state_registered(self.state) {
            return Err(TradeError::InvalidTransition(format!(
                "state {} is not registered in the transition table",
                self.state
            )));
        }

        if !TRANSITION_TABLE.is_action_available(self.state, action) {
            tracing::warn!(trade_id = %self.trade_id, %action, state = %self.state, "action not available");
            return Err(TradeError::InvalidTransition(format!(
                "action {action} is not allowed from state {}",
                self.state
            )));
        }

        if !TRANSITION_TABLE.is_user_authorized(self, user, action) {
            tracing::warn!(trade_id = %self.trade_id, %action, user, "user not authorised");
            return Err(TradeError::Authorization(format!(
                "user {user} may not perform {action} from state {}",
                self.state
            )));
        }

        if let Some(details) = new_details {
            details.validate()?;
        }

        Ok(())
    }

    /// Applies the transition for `action` and appends its audit record.
    ///
    /// Does not re-check authorization; call [`Trade::validate`] first.
    pub fn change(
        &mut self,
        user: &str,
        action: TradeAction,
        timestamp: TimeStamp<Utc>,
    ) -> Result<(), TradeError> {
        let (next_state, note) = TRANSITION_TABLE
            .get_transition(self.state, action)
            .ok_or_else(|| {
                TradeError::InvalidTransition(format!(
                    "no transition for {action} from state {}",
                    self.state
                ))
            })?;

        self.version += 1;
        self.state_before = self.state;
        self.state = next_state;
        self.audit.push(AuditRecord {
            step: self.version,
            action,
            user_id: user.to_string(),
            state_before: self.state_before,
            state_after: self.state,
            details: self.details.clone(),
            timestamp: timestamp.clone(),
            note: Some(note.to_string()),
        });

        tracing::info!(
            trade_id = %self.trade_id,
            %action,
            user,
            state = %self.state,
            version = self.version,
            at = %timestamp,
            "trade transitioned"
        );

        Ok(())
    }

    pub fn to_history(&self) -> TradeHistory {
        TradeHistory {
            trade_id: self.trade_id.clone(),
            requester: self.requester.clone(),
            approver: self.approver.clone(),
            records: self.audit.clone(),
        }
    }

    /// Field-level differences between the details at two versions.
    ///
    /// The current version resolves to the live details, any other version to
    /// the snapshot held by the audit record with that step.
    pub fn get_differences(&self, version_a: u64, version_b: u64) -> Result<TradeDiff, TradeError> {
        let before = self.details_at(version_a)?;
        let after = self.details_at(version_b)?;

        Ok(TradeDiff::between(before, after))
    }

    fn details_at(&self, version: u64) -> Result<&TradeDetails, TradeError> {
        if version == self.version {
            return Ok(&self.details);
        }

        self.audit
            .iter()
            .find(|record| record.step == version)
            .map(|record| &record.details)
            .ok_or_else(|| {
                TradeError::NotFound(format!(
                    "version {version} not found for trade {}",
                    self.trade_id
                ))
            })
    }
}
