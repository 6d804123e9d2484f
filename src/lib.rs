//! Trade approval workflow.
//!
//! A trade moves from draft through approval, execution and booking. Every
//! move is checked against a static transition table that also decides who may
//! perform it, bumps the trade's version and appends an audit record, from
//! which earlier versions of the trade details can be reconstructed and diffed.

pub mod aggregate;
pub mod audit;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod execution;
pub mod repository;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod trade;
pub mod transitions;
pub mod utils;

pub use aggregate::Trade;
pub use audit::{AuditRecord, TradeDiff, TradeHistory};
pub use error::{ErrorKind, TradeError};
pub use service::{TradeApprovalService, TradeHistoryService, TradeWorkflow};
pub use trade::{Direction, Strike, TimeStamp, TradeDetails, TradeStyle};
pub use transitions::{TradeAction, TradeState};
