//! The matching-and-settlement engine.
//!
//! # Architecture
//!
//! ```text
//! caller (HTTP handler, agent, test)
//!   ↓
//! Exchange (coordinator)
//!   ├→ reservation ledger + account wallets
//!   ├→ OrderBook (one per instrument, behind its own lock)
//!   │    └→ MatchModel (price-time priority matching)
//!   └→ EventBus (bounded broadcast fan-out)
//! ```
//!
//! Matching on one instrument is serialized by that book's lock; the lock is
//! held for a taker's whole pass, so reports are applied atomically from the
//! point of view of any other taker on the same book.

pub mod book;
pub mod error;
pub mod events;
pub mod exchange;
pub mod matching;

pub use book::{OrderBook, OrderBookSnapshot};
pub use error::ExchangeError;
pub use events::{EngineEvent, EventBus, EventKind, Subscription};
pub use exchange::{Exchange, Reservation};
pub use matching::{FillKind, MatchModel, MatchReport, ReportOwner};
