//! The matching model: a pure algorithm over one order book and an incoming
//! taker. It mutates order fill state and the book, and reports every match
//! step; settlement of the reports is the coordinator's job.

use crate::engine::book::{is_close, min_amount, OrderBook};
use crate::models::{Order, OrderStatus, Side};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Whose side of a match step a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOwner {
    Maker,
    Taker,
}

/// Whether the step left the order fully matched or partially matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    Full,
    Partial,
}

/// One order's view of a single match step. The trade price is always the
/// resting maker's price, so `quote_matched = base_matched * maker_price`.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub owner: ReportOwner,
    pub kind: FillKind,
    pub order: Arc<Order>,
    pub quote_matched: Decimal,
    pub base_matched: Decimal,
}

pub struct MatchModel;

impl MatchModel {
    /// Match a limit taker against the opposite side while it crosses. The
    /// residual, if any, is rested on the taker's own side of the book.
    pub async fn limit_match(taker: &Arc<Order>, book: &mut OrderBook) -> Vec<MatchReport> {
        taker.mark_matching();
        let limit = taker.price().expect("limit order carries a price");
        let maker_side = taker.side().opposite();
        let mut reports = Vec::new();

        while !is_close(taker.filled(), taker.amount(), min_amount()) {
            let Some(maker) = book.best(maker_side) else {
                Self::rest(book, taker);
                break;
            };
            let maker_price = maker.price().expect("resting orders carry a price");
            let crosses = match taker.side() {
                Side::Buy => limit >= maker_price,
                Side::Sell => limit <= maker_price,
            };
            if !crosses {
                Self::rest(book, taker);
                break;
            }

            let (maker_report, taker_report) = Self::match_step(taker, &maker);
            book.reduce_depth(maker_price, maker_report.base_matched);
            if maker_report.order.status() == OrderStatus::Closed {
                let _ = book.pop_best(maker_side);
            }
            reports.push(maker_report);
            reports.push(taker_report);

            // Fairness: let other tasks run between steps of a long walk.
            tokio::task::yield_now().await;
        }

        taker.finish_matching();
        reports
    }

    /// Match a market taker against the opposite side until filled or the
    /// book is exhausted. Market orders never rest; the taker closes with
    /// whatever filled.
    pub async fn market_match(taker: &Arc<Order>, book: &mut OrderBook) -> Vec<MatchReport> {
        taker.mark_matching();
        let maker_side = taker.side().opposite();
        let mut reports = Vec::new();

        while !is_close(taker.filled(), taker.amount(), min_amount()) {
            let Some(maker) = book.best(maker_side) else {
                break;
            };
            let maker_price = maker.price().expect("resting orders carry a price");

            let (maker_report, taker_report) = Self::match_step(taker, &maker);
            book.reduce_depth(maker_price, maker_report.base_matched);
            if maker_report.order.status() == OrderStatus::Closed {
                let _ = book.pop_best(maker_side);
            }
            reports.push(maker_report);
            reports.push(taker_report);

            tokio::task::yield_now().await;
        }

        taker.mark_closed();
        taker.finish_matching();
        reports
    }

    fn rest(book: &mut OrderBook, taker: &Arc<Order>) {
        taker.mark_opened();
        book.add(taker.clone());
    }

    /// Execute one step between the taker and the current best maker.
    fn match_step(taker: &Arc<Order>, maker: &Arc<Order>) -> (MatchReport, MatchReport) {
        let matched = taker.remaining().min(maker.remaining());
        taker.fill(matched);
        maker.fill(matched);

        let price = maker.price().expect("resting orders carry a price");
        let quote_matched = matched * price;

        let taker_kind = if is_close(taker.filled(), taker.amount(), min_amount()) {
            taker.mark_closed();
            FillKind::Full
        } else {
            FillKind::Partial
        };
        let maker_kind = if is_close(maker.filled(), maker.amount(), min_amount()) {
            maker.mark_closed();
            FillKind::Full
        } else {
            FillKind::Partial
        };

        (
            MatchReport {
                owner: ReportOwner::Maker,
                kind: maker_kind,
                order: maker.clone(),
                quote_matched,
                base_matched: matched,
            },
            MatchReport {
                owner: ReportOwner::Taker,
                kind: taker_kind,
                order: taker.clone(),
                quote_matched,
                base_matched: matched,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instrument;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> Instrument {
        Instrument::new("btc", "usdt")
    }

    fn resting(price: Decimal, side: Side, amount: Decimal) -> Arc<Order> {
        Arc::new(Order::limit(btc_usdt(), price, side, amount, "maker"))
    }

    fn book_with_asks(asks: &[(Decimal, Decimal)]) -> (OrderBook, Vec<Arc<Order>>) {
        let mut book = OrderBook::new(btc_usdt());
        let orders: Vec<Arc<Order>> = asks
            .iter()
            .map(|(price, amount)| resting(*price, Side::Sell, *amount))
            .collect();
        for order in &orders {
            book.add(order.clone());
        }
        (book, orders)
    }

    #[tokio::test]
    async fn test_full_cross_closes_both_sides() {
        let (mut book, makers) = book_with_asks(&[(dec!(1), dec!(10))]);
        let taker = Arc::new(Order::limit(btc_usdt(), dec!(1), Side::Buy, dec!(10), "taker"));

        let reports = MatchModel::limit_match(&taker, &mut book).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].owner, ReportOwner::Maker);
        assert_eq!(reports[0].kind, FillKind::Full);
        assert_eq!(reports[1].owner, ReportOwner::Taker);
        assert_eq!(reports[1].kind, FillKind::Full);
        assert_eq!(taker.status(), OrderStatus::Closed);
        assert_eq!(makers[0].status(), OrderStatus::Closed);
        assert!(book.is_empty());
    }

    #[tokio::test]
    async fn test_partial_taker_rests_residual() {
        let (mut book, makers) = book_with_asks(&[(dec!(1), dec!(4))]);
        let taker = Arc::new(Order::limit(btc_usdt(), dec!(1), Side::Buy, dec!(10), "taker"));

        let reports = MatchModel::limit_match(&taker, &mut book).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(makers[0].status(), OrderStatus::Closed);
        assert_eq!(taker.status(), OrderStatus::Opened);
        assert_eq!(taker.filled(), dec!(4));
        assert!(book.contains_id(taker.order_id()));
        assert_eq!(book.depth(dec!(1)), dec!(6));
    }

    #[tokio::test]
    async fn test_non_crossing_taker_rests_untouched() {
        let (mut book, _makers) = book_with_asks(&[(dec!(2), dec!(5))]);
        let taker = Arc::new(Order::limit(btc_usdt(), dec!(1), Side::Buy, dec!(5), "taker"));

        let reports = MatchModel::limit_match(&taker, &mut book).await;

        assert!(reports.is_empty());
        assert_eq!(taker.status(), OrderStatus::Opened);
        assert!(book.contains_id(taker.order_id()));
        assert_eq!(book.len(), 2);
    }

    #[tokio::test]
    async fn test_trade_price_is_the_maker_price() {
        let (mut book, _makers) = book_with_asks(&[(dec!(1.5), dec!(5))]);
        let taker = Arc::new(Order::limit(btc_usdt(), dec!(3), Side::Buy, dec!(5), "taker"));

        let reports = MatchModel::limit_match(&taker, &mut book).await;

        assert_eq!(reports[0].base_matched, dec!(5));
        assert_eq!(reports[0].quote_matched, dec!(7.5));
    }

    #[tokio::test]
    async fn test_market_walks_levels_in_price_order() {
        let (mut book, makers) =
            book_with_asks(&[(dec!(1), dec!(10)), (dec!(2), dec!(10)), (dec!(3), dec!(10))]);
        let taker = Arc::new(Order::market(btc_usdt(), Side::Buy, dec!(25), "taker"));

        let reports = MatchModel::market_match(&taker, &mut book).await;

        let maker_reports: Vec<&MatchReport> =
            reports.iter().filter(|r| r.owner == ReportOwner::Maker).collect();
        assert_eq!(maker_reports.len(), 3);
        assert_eq!(maker_reports[0].order.order_id(), makers[0].order_id());
        assert_eq!(maker_reports[2].base_matched, dec!(5));
        assert_eq!(taker.status(), OrderStatus::Closed);
        assert_eq!(taker.filled(), dec!(25));
        assert_eq!(makers[2].filled(), dec!(5));
        assert_eq!(makers[2].status(), OrderStatus::Opened);
    }

    #[tokio::test]
    async fn test_market_closes_on_exhausted_book() {
        let (mut book, _makers) = book_with_asks(&[(dec!(1), dec!(15))]);
        let taker = Arc::new(Order::market(btc_usdt(), Side::Buy, dec!(50), "taker"));

        MatchModel::market_match(&taker, &mut book).await;

        assert_eq!(taker.status(), OrderStatus::Closed);
        assert_eq!(taker.filled(), dec!(15));
        assert!(book.is_empty());
        assert!(!book.contains_id(taker.order_id()));
    }

    #[tokio::test]
    async fn test_time_priority_at_equal_price() {
        let mut book = OrderBook::new(btc_usdt());
        let first = resting(dec!(1), Side::Sell, dec!(10));
        let second = resting(dec!(1), Side::Sell, dec!(10));
        book.add(first.clone());
        book.add(second.clone());

        let taker = Arc::new(Order::limit(btc_usdt(), dec!(1), Side::Buy, dec!(15), "taker"));
        MatchModel::limit_match(&taker, &mut book).await;

        assert_eq!(first.status(), OrderStatus::Closed);
        assert_eq!(second.status(), OrderStatus::Opened);
        assert_eq!(second.filled(), dec!(5));
    }

    #[tokio::test]
    async fn test_sell_taker_matches_descending_bids() {
        let mut book = OrderBook::new(btc_usdt());
        let high = resting(dec!(3), Side::Buy, dec!(5));
        let low = resting(dec!(1), Side::Buy, dec!(5));
        book.add(low.clone());
        book.add(high.clone());

        let taker = Arc::new(Order::limit(btc_usdt(), dec!(2), Side::Sell, dec!(10), "taker"));
        MatchModel::limit_match(&taker, &mut book).await;

        // Crosses the bid at 3, stops before the bid at 1, rests the residual.
        assert_eq!(high.status(), OrderStatus::Closed);
        assert_eq!(low.status(), OrderStatus::Opened);
        assert_eq!(low.filled(), Decimal::ZERO);
        assert_eq!(taker.status(), OrderStatus::Opened);
        assert_eq!(taker.filled(), dec!(5));
    }
}
