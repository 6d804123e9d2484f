//! The workflow rulebook: which action is allowed from which state, where it
//! leads, and who may perform it.
//!
//! The table is a fixed `static` slice. Authorization predicates are plain
//! function pointers and read the live [`Trade`] handed to them, so a change to
//! `requester` or `approver` is visible to the very next check.
use std::collections::HashSet;
use std::fmt;

use super::aggregate::Trade;
use super::error::TradeError;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeState {
    #[n(0)]
    Initial,
    #[n(1)]
    Draft,
    #[n(2)]
    PendingApproval,
    #[n(3)]
    NeedsReapproval,
    #[n(4)]
    Approved,
    #[n(5)]
    SentToCounterparty,
    #[n(6)]
    Executed,
    #[n(7)]
    Cancelled,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    #[n(0)]
    Create,
    #[n(1)]
    Update,
    #[n(2)]
    Submit,
    #[n(3)]
    Cancel,
    #[n(4)]
    Approve,
    #[n(5)]
    SendToExecute,
    #[n(6)]
    Book,
}

/// Capability check evaluated against the aggregate at validation time.
pub type Authorize = fn(&Trade, &str) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: TradeState,
    pub action: TradeAction,
    pub to: TradeState,
    pub note: &'static str,
    pub authorize: Authorize,
}

#[derive(Debug)]
pub struct StateTransitionTable {
    states: &'static [TradeState],
    rows: &'static [Transition],
}

/// The rulebook every aggregate validates against.
pub static TRANSITION_TABLE: StateTransitionTable = StateTransitionTable {
    states: &REGISTERED_STATES,
    rows: &TRANSITIONS,
};

// Terminal states are registered but have no rows.
const REGISTERED_STATES: [TradeState; 8] = [
    TradeState::Initial,
    TradeState::Draft,
    TradeState::PendingApproval,
    TradeState::NeedsReapproval,
    TradeState::Approved,
    TradeState::SentToCounterparty,
    TradeState::Executed,
    TradeState::Cancelled,
];

#[rustfmt::skip]
const TRANSITIONS: [Transition; 13] = [
    //  from                             action                      to                              note                               authorized when
    row(TradeState::Initial,             TradeAction::Create,        TradeState::Draft,              "Trade created",                   anyone),
    row(TradeState::Draft,               TradeAction::Update,        TradeState::Draft,              "Trade updated",                   is_requester),
    row(TradeState::Draft,               TradeAction::Cancel,        TradeState::Cancelled,          "Trade cancelled",                 is_requester),
    row(TradeState::Draft,               TradeAction::Submit,        TradeState::PendingApproval,    "Trade submitted",                 is_requester),
    row(TradeState::PendingApproval,     TradeAction::Update,        TradeState::NeedsReapproval,    "Trade updated, need reapproval",  is_not_requester),
    row(TradeState::PendingApproval,     TradeAction::Cancel,        TradeState::Cancelled,          "Trade cancelled",                 is_not_requester),
    row(TradeState::PendingApproval,     TradeAction::Approve,       TradeState::Approved,           "Trade approved",                  is_not_requester),
    row(TradeState::NeedsReapproval,     TradeAction::Approve,       TradeState::Approved,           "Trade reapproved",                is_requester),
    row(TradeState::NeedsReapproval,     TradeAction::Cancel,        TradeState::Cancelled,          "Trade cancelled",                 is_requester),
    row(TradeState::Approved,            TradeAction::SendToExecute, TradeState::SentToCounterparty, "Trade sent to counterparty",      is_approver),
    row(TradeState::Approved,            TradeAction::Cancel,        TradeState::Cancelled,          "Trade cancelled",                 is_approver),
    row(TradeState::SentToCounterparty,  TradeAction::Book,          TradeState::Executed,           "Trade executed",                  is_requester_or_approver),
    row(TradeState::SentToCounterparty,  TradeAction::Cancel,        TradeState::Cancelled,          "Trade cancelled",                 is_requester_or_approver),
];

const fn row(
    from: TradeState,
    action: TradeAction,
    to: TradeState,
    note: &'static str,
    authorize: Authorize,
) -> Transition {
    Transition {
        from,
        action,
        to,
        note,
        authorize,
    }
}

fn anyone(_: &Trade, _: &str) -> bool {
    true
}

fn is_requester(trade: &Trade, user: &str) -> bool {
    trade.requester() == user
}

// separation of duties: anyone but the requester
fn is_not_requester(trade: &Trade, user: &str) -> bool {
    trade.requester() != user
}

fn is_approver(trade: &Trade, user: &str) -> bool {
    trade.approver() == Some(user)
}

fn is_requester_or_approver(trade: &Trade, user: &str) -> bool {
    is_requester(trade, user) || is_approver(trade, user)
}

impl TradeState {
    pub const ALL: [TradeState; 8] = REGISTERED_STATES;
}

impl TradeAction {
    pub const ALL: [TradeAction; 7] = [
        TradeAction::Create,
        TradeAction::Update,
        TradeAction::Submit,
        TradeAction::Cancel,
        TradeAction::Approve,
        TradeAction::SendToExecute,
        TradeAction::Book,
    ];
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeState::Initial => "INITIAL",
            TradeState::Draft => "DRAFT",
            TradeState::PendingApproval => "PENDING_APPROVAL",
            TradeState::NeedsReapproval => "NEEDS_REAPPROVAL",
            TradeState::Approved => "APPROVED",
            TradeState::SentToCounterparty => "SENT_TO_COUNTERPARTY",
            TradeState::Executed => "EXECUTED",
            TradeState::Cancelled => "CANCELLED",
        })
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeAction::Create => "CREATE",
            TradeAction::Update => "UPDATE",
            TradeAction::Submit => "SUBMIT",
            TradeAction::Cancel => "CANCEL",
            TradeAction::Approve => "APPROVE",
            TradeAction::SendToExecute => "SEND_TO_EXECUTE",
            TradeAction::Book => "BOOK",
        })
    }
}

impl StateTransitionTable {
    fn lookup(&self, state: TradeState, action: TradeAction) -> Option<&Transition> {
        self.rows
            .iter()
            .find(|row| row.from == state && row.action == action)
    }

    pub fn is_state_registered(&self, state: TradeState) -> bool {
        self.states.contains(&state)
    }

    pub fn is_action_available(&self, state: TradeState, action: TradeAction) -> bool {
        self.lookup(state, action).is_some()
    }

    /// Evaluates the predicate for `trade.state()` and `action`. False when no such row exists.
    pub fn is_user_authorized(&self, trade: &Trade, user: &str, action: TradeAction) -> bool {
        self.lookup(trade.state(), action)
            .is_some_and(|row| (row.authorize)(trade, user))
    }

    pub fn get_transition(
        &self,
        state: TradeState,
        action: TradeAction,
    ) -> Option<(TradeState, &'static str)> {
        self.lookup(state, action).map(|row| (row.to, row.note))
    }

    /// Actions leaving `state`, in table order.
    pub fn available_actions(&self, state: TradeState) -> Vec<TradeAction> {
        self.rows
            .iter()
            .filter(|row| row.from == state)
            .map(|row| row.action)
            .collect()
    }

    pub fn is_terminal(&self, state: TradeState) -> bool {
        self.is_state_registered(state) && self.available_actions(state).is_empty()
    }

    pub fn rows(&self) -> &'static [Transition] {
        self.rows
    }

    /// Completeness check run at startup.
    pub fn verify(&self) -> Result<(), TradeError> {
        for state in TradeState::ALL {
            if !self.is_state_registered(state) {
                return Err(TradeError::InvalidTransition(format!(
                    "state {state} is not registered"
                )));
            }
        }

        let mut seen = HashSet::new();
        for row in self.rows {
            if !seen.insert((row.from, row.action)) {
                return Err(TradeError::InvalidTransition(format!(
                    "duplicate rule for {} from {}",
                    row.action, row.from
                )));
            }
            if !self.is_state_registered(row.from) || !self.is_state_registered(row.to) {
                return Err(TradeError::InvalidTransition(format!(
                    "rule {} from {} references an unregistered state",
                    row.action, row.from
                )));
            }
        }

        for terminal in [TradeState::Executed, TradeState::Cancelled] {
            if !self.is_terminal(terminal) {
                return Err(TradeError::InvalidTransition(format!(
                    "terminal state {terminal} has outgoing rules"
                )));
            }
        }

        Ok(())
    }
}
