//! Per-instrument limit order book.
//!
//! Price levels are `BTreeMap` keys; each level holds a FIFO queue, so
//! priority is best price first, oldest order first within a level. An id
//! index gives O(log n) membership checks and cancellation.

use crate::models::{Instrument, Order, Side};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Prices are rounded to this many decimal places on entry.
pub const PRICE_SCALE: u32 = 6;

/// Smallest representable price tick (10^-6).
pub fn min_price() -> Decimal {
    Decimal::new(1, PRICE_SCALE)
}

/// Relative tolerance for amount comparisons (10^-8).
pub fn min_amount() -> Decimal {
    Decimal::new(1, 8)
}

/// Tolerant equality: `|a - b| <= atol + rtol * |b|` with `atol = 10^-8`.
pub fn is_close(a: Decimal, b: Decimal, rtol: Decimal) -> bool {
    (a - b).abs() <= Decimal::new(1, 8) + rtol * b.abs()
}

fn near_zero(value: Decimal) -> bool {
    value.abs() <= min_amount() / Decimal::TEN
}

/// Two-sided price-time priority book for one instrument.
#[derive(Debug)]
pub struct OrderBook {
    instrument: Instrument,
    asks: BTreeMap<Decimal, VecDeque<Arc<Order>>>,
    bids: BTreeMap<Decimal, VecDeque<Arc<Order>>>,
    /// Aggregate remaining amount resting at each price. Entries are dropped
    /// once within `min_amount / 10` of zero.
    amount_per_price: HashMap<Decimal, Decimal>,
    index: HashMap<u64, (Side, Decimal)>,
}

impl OrderBook {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            asks: BTreeMap::new(),
            bids: BTreeMap::new(),
            amount_per_price: HashMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn side_levels(&mut self, side: Side) -> &mut BTreeMap<Decimal, VecDeque<Arc<Order>>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Insert a limit order behind every resting order at its price.
    pub fn add(&mut self, order: Arc<Order>) {
        let price = order.price().expect("only limit orders rest on the book");
        let remaining = order.remaining();
        let side = order.side();
        self.index.insert(order.order_id(), (side, price));
        self.side_levels(side).entry(price).or_default().push_back(order);
        *self.amount_per_price.entry(price).or_insert(Decimal::ZERO) += remaining;
    }

    /// Remove an order by identity. Silently no-ops if the order is absent,
    /// tolerating double removal during races with matching.
    pub fn remove(&mut self, order: &Order) {
        let Some((side, price)) = self.index.remove(&order.order_id()) else {
            return;
        };
        let levels = self.side_levels(side);
        if let Some(queue) = levels.get_mut(&price) {
            if let Some(position) = queue.iter().position(|o| o.order_id() == order.order_id()) {
                queue.remove(position);
            }
            if queue.is_empty() {
                levels.remove(&price);
            }
        }
        self.reduce_depth(price, order.remaining());
    }

    /// Best resting order on a side: lowest ask or highest bid.
    pub fn best(&self, side: Side) -> Option<Arc<Order>> {
        match side {
            Side::Sell => self.asks.values().next(),
            Side::Buy => self.bids.values().next_back(),
        }
        .and_then(|queue| queue.front().cloned())
    }

    pub fn best_price(&self, side: Side) -> Option<Decimal> {
        match side {
            Side::Sell => self.asks.keys().next().copied(),
            Side::Buy => self.bids.keys().next_back().copied(),
        }
    }

    /// Remove and return the best order on a side.
    pub fn pop_best(&mut self, side: Side) -> Option<Arc<Order>> {
        let price = self.best_price(side)?;
        let levels = self.side_levels(side);
        let queue = levels.get_mut(&price)?;
        let order = queue.pop_front()?;
        if queue.is_empty() {
            levels.remove(&price);
        }
        self.index.remove(&order.order_id());
        self.reduce_depth(price, order.remaining());
        Some(order)
    }

    pub fn contains_id(&self, order_id: u64) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Aggregate remaining amount resting at a price, zero if none.
    pub fn depth(&self, price: Decimal) -> Decimal {
        self.amount_per_price.get(&price).copied().unwrap_or(Decimal::ZERO)
    }

    /// Account for `amount` being consumed at `price`.
    pub fn reduce_depth(&mut self, price: Decimal, amount: Decimal) {
        let entry = self.amount_per_price.entry(price).or_insert(Decimal::ZERO);
        *entry -= amount;
        if near_zero(*entry) {
            self.amount_per_price.remove(&price);
        }
    }

    /// Total number of resting orders.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.asks.clear();
        self.bids.clear();
        self.amount_per_price.clear();
        self.index.clear();
    }

    /// Asks in matching priority order (price ascending, FIFO per level).
    pub fn asks(&self) -> impl Iterator<Item = &Arc<Order>> {
        self.asks.values().flat_map(|queue| queue.iter())
    }

    /// Bids in matching priority order (price descending, FIFO per level).
    pub fn bids(&self) -> impl Iterator<Item = &Arc<Order>> {
        self.bids.values().rev().flat_map(|queue| queue.iter())
    }

    /// Price-level snapshot, best levels first on both sides.
    pub fn snapshot(&self, levels: usize) -> OrderBookSnapshot {
        let aggregate =
            |queue: &VecDeque<Arc<Order>>| queue.iter().map(|o| o.remaining()).sum::<Decimal>();

        let bids = self
            .bids
            .iter()
            .rev()
            .take(levels)
            .map(|(price, queue)| [*price, aggregate(queue)])
            .collect();
        let asks = self
            .asks
            .iter()
            .take(levels)
            .map(|(price, queue)| [*price, aggregate(queue)])
            .collect();

        OrderBookSnapshot {
            pair: self.instrument.to_string(),
            bids,
            asks,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Aggregated book state for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookSnapshot {
    pub pair: String,
    pub bids: Vec<[Decimal; 2]>,
    pub asks: Vec<[Decimal; 2]>,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> Instrument {
        Instrument::new("btc", "usdt")
    }

    fn limit(price: Decimal, side: Side, amount: Decimal) -> Arc<Order> {
        Arc::new(Order::limit(btc_usdt(), price, side, amount, "maker"))
    }

    #[test]
    fn test_ask_priority_is_price_ascending() {
        let mut book = OrderBook::new(btc_usdt());
        book.add(limit(dec!(3), Side::Sell, dec!(1)));
        book.add(limit(dec!(1), Side::Sell, dec!(1)));
        book.add(limit(dec!(2), Side::Sell, dec!(1)));

        let prices: Vec<Decimal> = book.asks().map(|o| o.price().unwrap()).collect();
        assert_eq!(prices, vec![dec!(1), dec!(2), dec!(3)]);
        assert_eq!(book.best_price(Side::Sell), Some(dec!(1)));
    }

    #[test]
    fn test_bid_priority_is_price_descending() {
        let mut book = OrderBook::new(btc_usdt());
        book.add(limit(dec!(1), Side::Buy, dec!(1)));
        book.add(limit(dec!(3), Side::Buy, dec!(1)));
        book.add(limit(dec!(2), Side::Buy, dec!(1)));

        let prices: Vec<Decimal> = book.bids().map(|o| o.price().unwrap()).collect();
        assert_eq!(prices, vec![dec!(3), dec!(2), dec!(1)]);
        assert_eq!(book.best_price(Side::Buy), Some(dec!(3)));
    }

    #[test]
    fn test_fifo_within_a_price_level() {
        let mut book = OrderBook::new(btc_usdt());
        let first = limit(dec!(2), Side::Sell, dec!(1));
        let second = limit(dec!(2), Side::Sell, dec!(1));
        book.add(first.clone());
        book.add(second.clone());

        assert_eq!(book.pop_best(Side::Sell).unwrap().order_id(), first.order_id());
        assert_eq!(book.pop_best(Side::Sell).unwrap().order_id(), second.order_id());
        assert!(book.is_empty());
    }

    #[test]
    fn test_depth_tracks_remaining_amounts() {
        let mut book = OrderBook::new(btc_usdt());
        let partly_filled = limit(dec!(2), Side::Sell, dec!(10));
        partly_filled.fill(dec!(4));
        book.add(partly_filled);
        book.add(limit(dec!(2), Side::Sell, dec!(5)));

        assert_eq!(book.depth(dec!(2)), dec!(11));
        book.reduce_depth(dec!(2), dec!(3));
        assert_eq!(book.depth(dec!(2)), dec!(8));
    }

    #[test]
    fn test_depth_entry_dropped_near_zero() {
        let mut book = OrderBook::new(btc_usdt());
        book.add(limit(dec!(2), Side::Sell, dec!(5)));
        book.reduce_depth(dec!(2), dec!(5));
        assert_eq!(book.depth(dec!(2)), Decimal::ZERO);
    }

    #[test]
    fn test_remove_is_tolerant_of_double_removal() {
        let mut book = OrderBook::new(btc_usdt());
        let order = limit(dec!(2), Side::Buy, dec!(1));
        book.add(order.clone());

        book.remove(&order);
        assert!(!book.contains_id(order.order_id()));
        book.remove(&order);
        assert!(book.is_empty());
    }

    #[test]
    fn test_snapshot_aggregates_levels() {
        let mut book = OrderBook::new(btc_usdt());
        book.add(limit(dec!(1), Side::Buy, dec!(1)));
        book.add(limit(dec!(1), Side::Buy, dec!(2)));
        book.add(limit(dec!(1.5), Side::Sell, dec!(4)));

        let snapshot = book.snapshot(10);
        assert_eq!(snapshot.pair, "btc/usdt");
        assert_eq!(snapshot.bids, vec![[dec!(1), dec!(3)]]);
        assert_eq!(snapshot.asks, vec![[dec!(1.5), dec!(4)]]);
    }

    #[test]
    fn test_is_close_tolerance() {
        assert!(is_close(dec!(1.000000001), dec!(1), min_amount()));
        assert!(!is_close(dec!(1.001), dec!(1), min_amount()));
        assert!(is_close(Decimal::ZERO, Decimal::ZERO, min_amount()));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut book = OrderBook::new(btc_usdt());
        book.add(limit(dec!(1), Side::Buy, dec!(1)));
        book.add(limit(dec!(2), Side::Sell, dec!(1)));
        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.depth(dec!(1)), Decimal::ZERO);
        assert!(book.best(Side::Buy).is_none());
    }
}
