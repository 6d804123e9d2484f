//! Core trade details and the value types they are built from
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Days, TimeZone, Utc};
use rust_decimal::Decimal;

use super::error::TradeError;

/// ISO 4217 codes accepted as a notional currency.
pub const SUPPORTED_CURRENCIES: [&str; 14] = [
    "USD", "EUR", "GBP", "CHF", "JPY", "AUD", "CAD", "NZD", "SEK", "NOK", "DKK", "ZAR", "INR",
    "CNY",
];

pub fn is_supported_currency(code: &str) -> bool {
    let code = code.to_ascii_uppercase();
    SUPPORTED_CURRENCIES.contains(&code.as_str())
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Direction {
    #[n(0)]
    Buy,
    #[n(1)]
    Sell,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum TradeStyle {
    #[n(0)]
    Spot,
    #[n(1)]
    Forward,
    #[n(2)]
    NonDeliverableForward,
    #[n(3)]
    Swap,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

/// An agreed rate. Wraps [`Decimal`] so it can carry a CBOR codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Strike(Decimal);

// Key is the hash of this struct encoded into CBOR
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct TradeDetails {
    #[n(0)]
    pub trading_entity: String,
    #[n(1)]
    pub counterparty: String,
    #[n(2)]
    pub direction: Direction,
    #[n(3)]
    pub style: TradeStyle,
    #[n(4)]
    pub notional_currency: String, // ISO 4217
    #[n(5)]
    pub notional_amount: u64, // Use integers for currency
    #[n(6)]
    pub underlying: String, // e.g. "USD/EUR", must mention the notional currency
    #[n(7)]
    pub trade_date: TimeStamp<Utc>,
    #[n(8)]
    pub value_date: TimeStamp<Utc>,
    #[n(9)]
    pub delivery_date: TimeStamp<Utc>,
    #[n(10)]
    pub strike: Option<Strike>, // set on booking
    #[n(11)]
    pub confirmation_id: Option<String>, // set on booking
}

/// Used for constructing drafts. Every field is optional until [`TradeDetailsBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct TradeDetailsBuilder {
    trading_entity: Option<String>,
    counterparty: Option<String>,
    direction: Option<Direction>,
    style: Option<TradeStyle>,
    notional_currency: Option<String>,
    notional_amount: u64,
    underlying: Option<String>,
    trade_date: Option<TimeStamp<Utc>>,
    value_date: Option<TimeStamp<Utc>>,
    delivery_date: Option<TimeStamp<Utc>>,
    strike: Option<Strike>,
    confirmation_id: Option<String>,
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_days(&self, days: u64) -> Self {
        Self(self.0 + Days::new(days))
    }
    /// False outside the i64 nanosecond range (1677-09-21 to 2262-04-11) the CBOR codec stores.
    pub fn is_encodable(&self) -> bool {
        self.0.timestamp_nanos_opt().is_some()
    }
}

// Utc has no ordering of its own, so compare the instants.
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

impl FromStr for Strike {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s).map(Self)
    }
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        })
    }
}

impl fmt::Display for TradeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeStyle::Spot => "SPOT",
            TradeStyle::Forward => "FORWARD",
            TradeStyle::NonDeliverableForward => "NON_DELIVERABLE_FORWARD",
            TradeStyle::Swap => "SWAP",
        })
    }
}

impl TradeDetails {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn builder() -> TradeDetailsBuilder {
        TradeDetailsBuilder::default()
    }

    /// Checks if the predicate `trade_date <= value_date <= delivery_date` holds
    pub fn validate_dates(&self) -> bool {
        self.trade_date <= self.value_date && self.value_date <= self.delivery_date
    }

    /// Runs every rule in order and reports the first violated field.
    pub fn validate(&self) -> Result<(), TradeError> {
        if self.trading_entity.trim().is_empty() {
            return Err(TradeError::validation("trading_entity", "is required"));
        }
        if self.counterparty.trim().is_empty() {
            return Err(TradeError::validation("counterparty", "is required"));
        }
        if self.notional_currency.trim().is_empty() {
            return Err(TradeError::validation("notional_currency", "is required"));
        }
        if !is_supported_currency(&self.notional_currency) {
            return Err(TradeError::validation(
                "notional_currency",
                format!("has unsupported currency code {}", self.notional_currency),
            ));
        }
        if self.notional_amount == 0 {
            return Err(TradeError::validation("notional_amount", "must be positive"));
        }
        if self.underlying.trim().is_empty() {
            return Err(TradeError::validation("underlying", "is required"));
        }
        if !self.underlying.contains(self.notional_currency.as_str()) {
            return Err(TradeError::validation(
                "underlying",
                format!("must include notional currency {}", self.notional_currency),
            ));
        }
        for (field, date) in [
            ("trade_date", &self.trade_date),
            ("value_date", &self.value_date),
            ("delivery_date", &self.delivery_date),
        ] {
            if !date.is_encodable() {
                return Err(TradeError::validation(
                    field,
                    "is outside the supported date range",
                ));
            }
        }
        if self.trade_date > self.value_date {
            return Err(TradeError::validation(
                "trade_date",
                "must be on or before value_date",
            ));
        }
        if self.value_date > self.delivery_date {
            return Err(TradeError::validation(
                "value_date",
                "must be on or before delivery_date",
            ));
        }
        Ok(())
    }

    /// Copy of these terms with the booking fields filled in.
    pub fn with_booking(&self, strike: Strike, confirmation_id: &str) -> Self {
        Self {
            strike: Some(strike),
            confirmation_id: Some(confirmation_id.to_string()),
            ..self.clone()
        }
    }

    /// Every field rendered as a string, in declaration order. Basis of field-level diffs.
    pub fn field_values(&self) -> [(&'static str, String); 12] {
        fn optional<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| "None".to_string(), ToString::to_string)
        }

        [
            ("trading_entity", self.trading_entity.clone()),
            ("counterparty", self.counterparty.clone()),
            ("direction", self.direction.to_string()),
            ("style", self.style.to_string()),
            ("notional_currency", self.notional_currency.clone()),
            ("notional_amount", self.notional_amount.to_string()),
            ("underlying", self.underlying.clone()),
            ("trade_date", self.trade_date.to_string()),
            ("value_date", self.value_date.to_string()),
            ("delivery_date", self.delivery_date.to_string()),
            ("strike", optional(&self.strike)),
            ("confirmation_id", optional(&self.confirmation_id)),
        ]
    }

    /// Serialises to CBOR and returns the sha256 of the encoding alongside the bytes.
    pub fn finalise(&self) -> Result<(String, Vec<u8>), TradeError> {
        let contents = minicbor::to_vec(self).context("failed to encode trade details")?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

impl TradeDetailsBuilder {
    pub fn set_trading_entity(mut self, entity: &str) -> Self {
        self.trading_entity = Some(entity.to_string());
        self
    }
    pub fn set_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty = Some(counterparty.to_string());
        self
    }
    pub fn set_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn set_style(mut self, style: TradeStyle) -> Self {
        self.style = Some(style);
        self
    }
    pub fn set_notional_currency(mut self, code: &str) -> Self {
        self.notional_currency = Some(code.to_string());
        self
    }
    pub fn set_notional_amount(mut self, amount: u64) -> Self {
        self.notional_amount = amount;
        self
    }
    pub fn set_underlying(mut self, underlying: &str) -> Self {
        self.underlying = Some(underlying.to_string());
        self
    }
    pub fn set_trade_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.trade_date = Some(date);
        self
    }
    pub fn set_value_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.value_date = Some(date);
        self
    }
    pub fn set_delivery_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.delivery_date = Some(date);
        self
    }
    pub fn set_strike(mut self, strike: Strike) -> Self {
        self.strike = Some(strike);
        self
    }
    pub fn set_confirmation_id(mut self, confirmation_id: &str) -> Self {
        self.confirmation_id = Some(confirmation_id.to_string());
        self
    }

    /// Checks required fields are present, then runs [`TradeDetails::validate`].
    pub fn build(self) -> Result<TradeDetails, TradeError> {
        fn required<T>(value: Option<T>, field: &'static str) -> Result<T, TradeError> {
            value.ok_or_else(|| TradeError::validation(field, "is required"))
        }

        let details = TradeDetails {
            trading_entity: required(self.trading_entity, "trading_entity")?,
            counterparty: required(self.counterparty, "counterparty")?,
            direction: required(self.direction, "direction")?,
            style: required(self.style, "style")?,
            notional_currency: required(self.notional_currency, "notional_currency")?,
            notional_amount: self.notional_amount,
            underlying: required(self.underlying, "underlying")?,
            trade_date: required(self.trade_date, "trade_date")?,
            value_date: required(self.value_date, "value_date")?,
            delivery_date: required(self.delivery_date, "delivery_date")?,
            strike: self.strike,
            confirmation_id: self.confirmation_id,
        };
        details.validate()?;

        Ok(details)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl<C> minicbor::Encode<C> for Strike {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0.serialize())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Strike {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let bytes: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("strike must be 16 bytes"))?;

        Ok(Strike(Decimal::deserialize(bytes)))
    }
}
