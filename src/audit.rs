//! Audit trail records and the read projections built from them
use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;

use super::trade::{TimeStamp, TradeDetails};
use super::transitions::{TradeAction, TradeState};

/// One entry per transition. `step` equals the trade version after the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub step: u64,
    pub action: TradeAction,
    pub user_id: String,
    pub state_before: TradeState,
    pub state_after: TradeState,
    pub details: TradeDetails, // snapshot at this step
    pub timestamp: TimeStamp<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeHistory {
    pub trade_id: String,
    pub requester: String,
    pub approver: Option<String>,
    pub records: Vec<AuditRecord>,
}

/// Changed fields between two detail snapshots, as `(before, after)` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeDiff {
    pub changes: BTreeMap<String, (String, String)>,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step: {} | Action: {} | User ID: {} | State Before: {} | State After: {} | Notes: {}",
            self.step,
            self.action,
            self.user_id,
            self.state_before,
            self.state_after,
            self.note.as_deref().unwrap_or("None")
        )
    }
}

impl TradeDiff {
    /// Field-by-field comparison of the string renderings.
    pub fn between(before: &TradeDetails, after: &TradeDetails) -> Self {
        let changes = before
            .field_values()
            .into_iter()
            .zip(after.field_values())
            .filter(|((_, a), (_, b))| a != b)
            .map(|((field, a), (_, b))| (field.to_string(), (a, b)))
            .collect();

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<(&str, &str)> {
        self.changes
            .get(field)
            .map(|(before, after)| (before.as_str(), after.as_str()))
    }
}
