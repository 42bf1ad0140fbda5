//! Order domain types.

use crate::models::Instrument;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Limit => write!(f, "limit"),
            OrderType::Market => write!(f, "market"),
        }
    }
}

/// Order lifecycle status. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Opened,
    Matching,
    Closed,
}

#[derive(Debug)]
struct OrderState {
    filled: Decimal,
    status: OrderStatus,
}

/// A single trading intent.
///
/// Identity, side, type, price, and amount are fixed at creation; fill
/// progress and status are interior-mutable and only ever change under the
/// owning book's lock. The `done` signal resolves once the order's own
/// matching pass has finished, which is what cancellation waits on.
#[derive(Debug)]
pub struct Order {
    order_id: u64,
    side: Side,
    order_type: OrderType,
    price: Option<Decimal>,
    amount: Decimal,
    instrument: Instrument,
    account: String,
    created_at: DateTime<Utc>,
    state: RwLock<OrderState>,
    done: watch::Sender<bool>,
}

impl Order {
    fn new(
        instrument: Instrument,
        price: Option<Decimal>,
        side: Side,
        amount: Decimal,
        account: impl Into<String>,
        order_type: OrderType,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            order_id: NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed),
            side,
            order_type,
            price,
            amount,
            instrument,
            account: account.into(),
            created_at: Utc::now(),
            state: RwLock::new(OrderState {
                filled: Decimal::ZERO,
                status: OrderStatus::Opened,
            }),
            done,
        }
    }

    pub fn limit(
        instrument: Instrument,
        price: Decimal,
        side: Side,
        amount: Decimal,
        account: impl Into<String>,
    ) -> Self {
        Self::new(instrument, Some(price), side, amount, account, OrderType::Limit)
    }

    pub fn market(
        instrument: Instrument,
        side: Side,
        amount: Decimal,
        account: impl Into<String>,
    ) -> Self {
        Self::new(instrument, None, side, amount, account, OrderType::Market)
    }

    pub fn order_id(&self) -> u64 {
        self.order_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn filled(&self) -> Decimal {
        self.state.read().filled
    }

    pub fn remaining(&self) -> Decimal {
        self.amount - self.state.read().filled
    }

    pub fn status(&self) -> OrderStatus {
        self.state.read().status
    }

    pub fn fill(&self, amount: Decimal) {
        self.state.write().filled += amount;
    }

    pub fn mark_opened(&self) {
        self.state.write().status = OrderStatus::Opened;
    }

    pub fn mark_matching(&self) {
        self.state.write().status = OrderStatus::Matching;
    }

    pub fn mark_closed(&self) {
        self.state.write().status = OrderStatus::Closed;
    }

    /// Signal that this order has left the matching phase.
    pub fn finish_matching(&self) {
        self.done.send_replace(true);
    }

    /// Wait until the order's matching pass is complete. Returns immediately
    /// if the order is not currently matching.
    pub async fn matched(&self) {
        if self.status() != OrderStatus::Matching {
            return;
        }
        let mut rx = self.done.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Order projection for transport and audit.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: u64,
    pub instrument: String,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub filled: Decimal,
    pub price: Option<Decimal>,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        let state = order.state.read();
        Self {
            order_id: order.order_id,
            instrument: order.instrument.to_string(),
            status: state.status,
            amount: order.amount,
            filled: state.filled,
            price: order.price,
            side: order.side,
            order_type: order.order_type,
            created_at: order.created_at,
        }
    }
}
