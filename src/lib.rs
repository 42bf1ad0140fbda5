//! In-process spot-trading backend: per-instrument limit order books,
//! price-time priority matching for limit and market orders, and wallet
//! settlement with maker/taker fees and reserved-funds accounting.

pub mod api;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use engine::{
    EngineEvent, EventBus, EventKind, Exchange, ExchangeError, OrderBookSnapshot, Subscription,
};
pub use models::{
    Account, AccountResponse, FeeSchedule, Instrument, Order, OrderResponse, OrderStatus,
    OrderType, Side,
};
pub use services::{Agent, AgentControl, Instruction};
