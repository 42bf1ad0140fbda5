//! Account and wallet state.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::{Mutex, MutexGuard};

/// Maker/taker fee rates as fractions in [0, 1).
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            maker: Decimal::new(5, 3), // 0.5%
            taker: Decimal::new(8, 3), // 0.8%
        }
    }
}

/// The mutable part of an account: available balances and the set of live
/// order ids. Guarded by the per-account lock so two concurrent reservations
/// cannot both observe the same balance.
#[derive(Debug, Default)]
pub struct Wallet {
    balances: HashMap<String, Decimal>,
    pub open_orders: HashSet<u64>,
}

impl Wallet {
    /// Available (unreserved) balance; unknown symbols read as zero.
    pub fn balance(&self, symbol: &str) -> Decimal {
        self.balances.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn credit(&mut self, symbol: &str, amount: Decimal) {
        *self.balances.entry(symbol.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    pub fn debit(&mut self, symbol: &str, amount: Decimal) {
        *self.balances.entry(symbol.to_string()).or_insert(Decimal::ZERO) -= amount;
    }

    pub fn balances(&self) -> &HashMap<String, Decimal> {
        &self.balances
    }
}

/// A named holder of per-symbol balances plus its currently open orders.
///
/// Fee rates are fixed at creation; balance and open-order state live behind
/// the account lock.
#[derive(Debug)]
pub struct Account {
    name: String,
    maker_fee: Decimal,
    taker_fee: Decimal,
    wallet: Mutex<Wallet>,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        balances: HashMap<String, Decimal>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            name: name.into(),
            maker_fee: fees.maker,
            taker_fee: fees.taker,
            wallet: Mutex::new(Wallet {
                balances,
                open_orders: HashSet::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn maker_fee(&self) -> Decimal {
        self.maker_fee
    }

    pub fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    pub async fn wallet(&self) -> MutexGuard<'_, Wallet> {
        self.wallet.lock().await
    }

    pub async fn snapshot(&self) -> AccountResponse {
        let wallet = self.wallet.lock().await;
        let mut open_orders: Vec<u64> = wallet.open_orders.iter().copied().collect();
        open_orders.sort_unstable();
        AccountResponse {
            name: self.name.clone(),
            balances: wallet.balances.clone(),
            open_orders,
        }
    }
}

/// Account projection for transport.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub name: String,
    pub balances: HashMap<String, Decimal>,
    pub open_orders: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_unknown_symbol_reads_zero() {
        let account = Account::new("alice", HashMap::new(), FeeSchedule::default());
        let wallet = account.wallet().await;
        assert_eq!(wallet.balance("btc"), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let account = Account::new("alice", HashMap::new(), FeeSchedule::default());
        let mut wallet = account.wallet().await;
        wallet.credit("btc", dec!(2.5));
        wallet.debit("btc", dec!(1));
        assert_eq!(wallet.balance("btc"), dec!(1.5));
    }

    #[test]
    fn test_default_fee_schedule() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.maker, dec!(0.005));
        assert_eq!(fees.taker, dec!(0.008));
    }
}
