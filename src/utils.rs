//! Identifier generation

use anyhow::Context;
use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::TradeError;

/// Human readable prefix for trade identifiers.
pub const TRADE_ID_HRP: &str = "trade_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// A fresh, time-ordered trade id such as `trade_1qy...`.
pub fn new_trade_id() -> Result<String, TradeError> {
    let id = new_uuid_to_bech32(TRADE_ID_HRP).context("failed to generate trade id")?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_ids_carry_prefix_and_are_unique() {
        let a = new_trade_id().unwrap();
        let b = new_trade_id().unwrap();

        assert!(a.starts_with("trade_1"));
        assert_ne!(a, b);
    }
}
