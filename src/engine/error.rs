//! Exchange error taxonomy.

use crate::models::Instrument;
use rust_decimal::Decimal;

/// Every failure the engine reports to callers. Matching itself never fails;
/// running out of opposite-side liquidity is a normal terminal condition.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("instrument is not supported: {0}")]
    UnsupportedInstrument(Instrument),

    #[error("instrument already exists: {0}")]
    InstrumentAlreadyExists(Instrument),

    #[error("instrument was not found: {0}")]
    InstrumentMissing(Instrument),

    #[error("wrong credentials: {0}")]
    WrongCredentials(String),

    #[error("account {0} still has open orders")]
    AccountNotEmpty(String),

    #[error("price rounds to zero or below")]
    IncorrectPrice,

    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("insufficient funds: reservation of {amount} {symbol} exceeds available balance")]
    InsufficientFunds { symbol: String, amount: Decimal },

    #[error("unknown order id: {0}")]
    WrongOrderId(u64),

    #[error("order cannot be cancelled: {0}")]
    OrderCancellation(&'static str),

    #[error("order cannot be created: {0}")]
    OrderCreation(&'static str),
}
