//! The exchange coordinator.
//!
//! Owns every account, order book, and the reservation ledger. Each order
//! book sits behind its own async lock, so matching is serialized per
//! instrument while instruments proceed concurrently. Reservation happens
//! under the account lock, released before the book lock is requested; the
//! one path that inverts this is the market buy, which must read the ask
//! side to size its reservation and therefore reserves and matches under a
//! single book-lock hold. No path ever holds an account lock while waiting
//! for a book, so the two lock kinds cannot form a cycle.

use crate::engine::book::{min_amount, OrderBook, OrderBookSnapshot, PRICE_SCALE};
use crate::engine::error::ExchangeError;
use crate::engine::events::{EngineEvent, EventBus};
use crate::engine::matching::{FillKind, MatchModel, MatchReport, ReportOwner};
use crate::metrics;
use crate::models::{
    Account, AccountResponse, FeeSchedule, Instrument, Order, OrderStatus, OrderType, Side,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

type SharedBook = Arc<Mutex<OrderBook>>;

/// Funds held against a live order: subtracted from the account's available
/// balance until the order is fully matched or cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub symbol: String,
    pub amount: Decimal,
}

/// The matching-and-settlement engine. Construct one per process and hand it
/// to collaborators behind an `Arc`.
pub struct Exchange {
    accounts: DashMap<String, Arc<Account>>,
    books: DashMap<Instrument, SharedBook>,
    orders: DashMap<u64, Arc<Order>>,
    reservations: DashMap<u64, Reservation>,
    events: EventBus,
    fees: FeeSchedule,
}

impl Exchange {
    pub fn new() -> Self {
        Self::with_settings(FeeSchedule::default(), 1024)
    }

    pub fn with_settings(fees: FeeSchedule, event_capacity: usize) -> Self {
        Self {
            accounts: DashMap::new(),
            books: DashMap::new(),
            orders: DashMap::new(),
            reservations: DashMap::new(),
            events: EventBus::new(event_capacity),
            fees,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Pair management
    // ========================================================================

    pub fn create_pair(&self, instrument: Instrument) -> Result<(), ExchangeError> {
        match self.books.entry(instrument.clone()) {
            Entry::Occupied(_) => Err(ExchangeError::InstrumentAlreadyExists(instrument)),
            Entry::Vacant(slot) => {
                info!(%instrument, "pair created");
                slot.insert(Arc::new(Mutex::new(OrderBook::new(instrument))));
                Ok(())
            }
        }
    }

    pub fn delete_pair(&self, instrument: &Instrument) -> Result<(), ExchangeError> {
        self.books
            .remove(instrument)
            .map(|_| info!(%instrument, "pair deleted"))
            .ok_or_else(|| ExchangeError::InstrumentMissing(instrument.clone()))
    }

    pub fn pairs(&self) -> Vec<Instrument> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    pub async fn clear_order_book(&self, instrument: &Instrument) -> Result<(), ExchangeError> {
        let book = self.book(instrument)?;
        book.lock().await.clear();
        Ok(())
    }

    pub async fn order_book_snapshot(
        &self,
        instrument: &Instrument,
        levels: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let book = self.book(instrument)?;
        let snapshot = book.lock().await.snapshot(levels);
        Ok(snapshot)
    }

    /// Aggregate remaining amount resting at a price.
    pub async fn depth(
        &self,
        instrument: &Instrument,
        price: Decimal,
    ) -> Result<Decimal, ExchangeError> {
        let book = self.book(instrument)?;
        let depth = book.lock().await.depth(price);
        Ok(depth)
    }

    /// Number of orders resting on the book.
    pub async fn resting_orders(&self, instrument: &Instrument) -> Result<usize, ExchangeError> {
        let book = self.book(instrument)?;
        let len = book.lock().await.len();
        Ok(len)
    }

    fn book(&self, instrument: &Instrument) -> Result<SharedBook, ExchangeError> {
        self.books
            .get(instrument)
            .map(|entry| entry.clone())
            .ok_or_else(|| ExchangeError::UnsupportedInstrument(instrument.clone()))
    }

    // ========================================================================
    // Account management
    // ========================================================================

    pub fn create_account(
        &self,
        name: &str,
        balances: HashMap<String, Decimal>,
    ) -> Result<Arc<Account>, ExchangeError> {
        if let Some(bad) = balances.values().find(|v| **v < Decimal::ZERO) {
            return Err(ExchangeError::InvalidAmount(*bad));
        }
        match self.accounts.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ExchangeError::WrongCredentials(format!(
                "account {name} already exists"
            ))),
            Entry::Vacant(slot) => {
                info!(account = name, "account created");
                let account = Arc::new(Account::new(name, balances, self.fees));
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    pub fn get_account(&self, name: &str) -> Result<Arc<Account>, ExchangeError> {
        self.accounts
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                ExchangeError::WrongCredentials(format!("account {name} was not found"))
            })
    }

    /// Destroy an account. Fails while the account still has live orders.
    pub async fn delete_account(&self, name: &str) -> Result<(), ExchangeError> {
        let account = self.get_account(name)?;
        {
            let wallet = account.wallet().await;
            if !wallet.open_orders.is_empty() {
                return Err(ExchangeError::AccountNotEmpty(name.to_string()));
            }
        }
        self.accounts.remove(name);
        info!(account = name, "account deleted");
        Ok(())
    }

    /// Add funds to an account. Deltas must be non-negative; there is no
    /// debit path through refill.
    pub async fn refill_account(
        &self,
        name: &str,
        deltas: HashMap<String, Decimal>,
    ) -> Result<(), ExchangeError> {
        if let Some(bad) = deltas.values().find(|v| **v < Decimal::ZERO) {
            return Err(ExchangeError::InvalidAmount(*bad));
        }
        let account = self.get_account(name)?;
        let mut wallet = account.wallet().await;
        for (symbol, delta) in &deltas {
            wallet.credit(symbol, *delta);
        }
        Ok(())
    }

    pub async fn account_snapshots(&self) -> Vec<AccountResponse> {
        let accounts: Vec<Arc<Account>> =
            self.accounts.iter().map(|entry| entry.clone()).collect();
        let mut snapshots = Vec::with_capacity(accounts.len());
        for account in accounts {
            snapshots.push(account.snapshot().await);
        }
        snapshots
    }

    // ========================================================================
    // Order management
    // ========================================================================

    pub fn get_order(&self, order_id: u64) -> Result<Arc<Order>, ExchangeError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.clone())
            .ok_or(ExchangeError::WrongOrderId(order_id))
    }

    /// Funds currently held against a live order, if any.
    pub fn reservation(&self, order_id: u64) -> Option<Reservation> {
        self.reservations.get(&order_id).map(|entry| entry.clone())
    }

    pub async fn create_limit(
        &self,
        instrument: Instrument,
        price: Decimal,
        side: Side,
        amount: Decimal,
        account_name: &str,
    ) -> Result<Arc<Order>, ExchangeError> {
        let book = self.book(&instrument)?;
        let account = self.get_account(account_name)?;

        let price = price.round_dp(PRICE_SCALE);
        if price <= Decimal::ZERO {
            return Err(ExchangeError::IncorrectPrice);
        }
        if amount <= min_amount() {
            return Err(ExchangeError::InvalidAmount(amount));
        }

        let order = Arc::new(Order::limit(instrument, price, side, amount, account_name));
        debug!(
            order_id = order.order_id(),
            instrument = %order.instrument(),
            %side,
            %price,
            %amount,
            account = account_name,
            "limit order received"
        );
        self.submit(book, order, account).await
    }

    pub async fn create_market(
        &self,
        instrument: Instrument,
        side: Side,
        amount: Decimal,
        account_name: &str,
    ) -> Result<Arc<Order>, ExchangeError> {
        let book = self.book(&instrument)?;
        let account = self.get_account(account_name)?;

        if amount <= min_amount() {
            return Err(ExchangeError::InvalidAmount(amount));
        }

        let order = Arc::new(Order::market(instrument, side, amount, account_name));
        debug!(
            order_id = order.order_id(),
            instrument = %order.instrument(),
            %side,
            %amount,
            account = account_name,
            "market order received"
        );
        self.submit(book, order, account).await
    }

    /// Cancel a resting limit order.
    ///
    /// If the order is mid-matching this waits for the pass to finish before
    /// deciding; an order fully consumed by that pass can no longer be
    /// cancelled.
    pub async fn cancel_order(
        &self,
        instrument: &Instrument,
        order_id: u64,
    ) -> Result<(), ExchangeError> {
        let order = self.get_order(order_id)?;
        let book = self.book(instrument)?;
        if order.order_type() == OrderType::Market {
            return Err(ExchangeError::OrderCancellation(
                "market orders cannot be cancelled",
            ));
        }

        order.matched().await;
        if order.status() == OrderStatus::Closed {
            return Err(ExchangeError::OrderCancellation("order is already closed"));
        }

        let mut guard = book.lock().await;
        if order.status() == OrderStatus::Closed {
            return Err(ExchangeError::OrderCancellation("order is already closed"));
        }
        if guard.contains_id(order_id) {
            order.mark_closed();
            self.events.emit(EngineEvent::OrderCancelled { order_id });
            guard.remove(&order);

            let account = self
                .accounts
                .get(order.account())
                .map(|entry| entry.clone())
                .expect("live orders reference existing accounts");
            let mut wallet = account.wallet().await;
            wallet.open_orders.remove(&order_id);
            if let Some((_, reservation)) = self.reservations.remove(&order_id) {
                wallet.credit(&reservation.symbol, reservation.amount);
            }
            metrics::record_order_cancelled();
            info!(order_id, "order cancelled");
        }
        Ok(())
    }

    // ========================================================================
    // Submission pipeline
    // ========================================================================

    async fn submit(
        &self,
        book: SharedBook,
        order: Arc<Order>,
        account: Arc<Account>,
    ) -> Result<Arc<Order>, ExchangeError> {
        let started = Instant::now();
        let instrument = order.instrument();

        // Reservation runs under the account lock before the book lock is
        // taken. Market buys are the one exception: their reservation is
        // sized from the ask side, and keeping that same book-lock hold
        // through the match keeps the estimate in step with what the walk
        // actually consumes.
        let mut sizing_guard = None;
        let reservation = match (order.order_type(), order.side()) {
            (OrderType::Market, Side::Buy) => {
                let guard = book.lock().await;
                let amount = Self::market_quote_size(&guard, order.amount());
                sizing_guard = Some(guard);
                Reservation {
                    symbol: instrument.quote.clone(),
                    amount,
                }
            }
            (_, Side::Buy) => {
                let price = order.price().expect("limit order carries a price");
                Reservation {
                    symbol: instrument.quote.clone(),
                    amount: order.amount() * price,
                }
            }
            (_, Side::Sell) => Reservation {
                symbol: instrument.base.clone(),
                amount: order.amount(),
            },
        };
        self.register(&order, &account, reservation).await?;

        let mut guard = match sizing_guard {
            Some(guard) => guard,
            None => book.lock().await,
        };
        let reports = match order.order_type() {
            OrderType::Limit => MatchModel::limit_match(&order, &mut guard).await,
            OrderType::Market => MatchModel::market_match(&order, &mut guard).await,
        };
        self.apply_reports(&order, reports).await;
        metrics::set_order_book_depth(&guard.instrument().to_string(), guard.len());
        drop(guard);

        metrics::record_order_match_duration(started.elapsed().as_secs_f64());
        info!(
            order_id = order.order_id(),
            status = ?order.status(),
            filled = %order.filled(),
            "order processed"
        );
        Ok(order)
    }

    /// Reserve funds under the account lock and register the order. On
    /// reservation failure nothing is registered and no event is emitted.
    async fn register(
        &self,
        order: &Arc<Order>,
        account: &Arc<Account>,
        reservation: Reservation,
    ) -> Result<(), ExchangeError> {
        {
            let mut wallet = account.wallet().await;
            if wallet.balance(&reservation.symbol) < reservation.amount {
                return Err(ExchangeError::InsufficientFunds {
                    symbol: reservation.symbol,
                    amount: reservation.amount,
                });
            }
            wallet.debit(&reservation.symbol, reservation.amount);
            wallet.open_orders.insert(order.order_id());
        }
        self.reservations.insert(order.order_id(), reservation);
        self.orders.insert(order.order_id(), order.clone());

        self.events.emit(EngineEvent::OrderCreated {
            order_id: order.order_id(),
        });
        metrics::record_order_submitted(order.side(), order.order_type());
        Ok(())
    }

    /// Quote needed to fill `amount` base units by walking the current asks.
    /// If the book cannot cover the whole amount, only the coverable part is
    /// costed; the surplus, if any, is refunded during settlement.
    fn market_quote_size(book: &OrderBook, amount: Decimal) -> Decimal {
        let mut need = amount;
        let mut required = Decimal::ZERO;
        for maker in book.asks() {
            if need <= Decimal::ZERO {
                break;
            }
            let take = maker.remaining().min(need);
            required += take * maker.price().expect("resting orders carry a price");
            need -= take;
        }
        required
    }

    /// Translate match reports into balance mutations, fee deductions,
    /// reservation adjustments, and events. Runs under the book lock so no
    /// other taker on this instrument can observe a half-applied state.
    async fn apply_reports(&self, taker: &Arc<Order>, reports: Vec<MatchReport>) {
        let mut taker_spent = Decimal::ZERO;
        let mut trade_volume = Decimal::ZERO;
        let mut touched: HashSet<(Decimal, Side)> = HashSet::new();
        let mut closed: Vec<u64> = Vec::new();
        let mut closed_seen: HashSet<u64> = HashSet::new();

        for report in &reports {
            let order = &report.order;
            let instrument = order.instrument();
            let account = self
                .accounts
                .get(order.account())
                .map(|entry| entry.clone())
                .expect("live orders reference existing accounts");
            let fee = match report.owner {
                ReportOwner::Maker => account.maker_fee(),
                ReportOwner::Taker => account.taker_fee(),
            };
            let keep = Decimal::ONE - fee;
            if let Some(price) = order.price() {
                touched.insert((price, order.side()));
            }

            let mut wallet = account.wallet().await;
            match order.side() {
                // Fees are a haircut on the received side only; the spent
                // side settles through the reservation at full value.
                Side::Buy => {
                    wallet.credit(&instrument.base, report.base_matched * keep);
                    match report.owner {
                        ReportOwner::Maker => {
                            self.consume_reservation(order.order_id(), report.quote_matched)
                        }
                        ReportOwner::Taker => taker_spent += report.quote_matched,
                    }
                }
                Side::Sell => {
                    wallet.credit(&instrument.quote, report.quote_matched * keep);
                    match report.owner {
                        ReportOwner::Maker => {
                            self.consume_reservation(order.order_id(), report.base_matched)
                        }
                        ReportOwner::Taker => taker_spent += report.base_matched,
                    }
                }
            }
            if report.kind == FillKind::Full {
                wallet.open_orders.remove(&order.order_id());
            }
            drop(wallet);

            if report.owner == ReportOwner::Maker {
                trade_volume += report.quote_matched;
            }
            if order.status() == OrderStatus::Closed && closed_seen.insert(order.order_id()) {
                closed.push(order.order_id());
            }
        }

        for (price, side) in touched {
            self.events.emit(EngineEvent::OrderBookUpdated {
                instrument: taker.instrument().clone(),
                side,
                price,
            });
        }

        self.settle_taker(taker, taker_spent).await;

        if taker.status() == OrderStatus::Closed && closed_seen.insert(taker.order_id()) {
            closed.push(taker.order_id());
        }
        for order_id in closed {
            self.reservations.remove(&order_id);
            self.events.emit(EngineEvent::OrderClosed { order_id });
        }

        if !reports.is_empty() {
            metrics::record_trades_executed(
                reports.len() / 2,
                trade_volume.to_f64().unwrap_or(0.0),
            );
        }
    }

    /// A maker trades at its own price, so each step consumes exactly the
    /// matched value from its reservation.
    fn consume_reservation(&self, order_id: u64, consumed: Decimal) {
        if let Some(mut reservation) = self.reservations.get_mut(&order_id) {
            reservation.amount -= consumed;
        }
    }

    /// Release the gap between what the taker had reserved for its fills and
    /// what the fills actually cost: price improvement on limit orders, the
    /// whole unspent estimate on market orders.
    async fn settle_taker(&self, taker: &Arc<Order>, actual_spent: Decimal) {
        let (symbol, expected) = {
            let Some(mut reservation) = self.reservations.get_mut(&taker.order_id()) else {
                return;
            };
            let expected = match taker.order_type() {
                OrderType::Market => reservation.amount,
                OrderType::Limit => {
                    let expected = match taker.side() {
                        Side::Sell => taker.filled(),
                        Side::Buy => {
                            taker.filled() * taker.price().expect("limit order carries a price")
                        }
                    };
                    reservation.amount -= expected;
                    expected
                }
            };
            (reservation.symbol.clone(), expected)
        };

        let account = self
            .accounts
            .get(taker.account())
            .map(|entry| entry.clone())
            .expect("live orders reference existing accounts");
        let mut wallet = account.wallet().await;
        wallet.credit(&symbol, expected - actual_spent);
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
