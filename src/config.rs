//! Application configuration, loaded from the environment with the
//! `EXCHANGE_` prefix (e.g. `EXCHANGE_PORT=9000`).

use crate::models::{FeeSchedule, Instrument};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated `base_quote` pairs seeded at startup.
    #[serde(default = "default_trading_pairs")]
    pub trading_pairs: String,
    #[serde(default = "default_maker_fee")]
    pub maker_fee: Decimal,
    #[serde(default = "default_taker_fee")]
    pub taker_fee: Decimal,
    /// Event-bus ring capacity; a subscriber lagging further than this loses
    /// the oldest events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_trading_pairs() -> String {
    "btc_usdt,eth_usdt".to_string()
}

fn default_maker_fee() -> Decimal {
    Decimal::new(5, 3)
}

fn default_taker_fee() -> Decimal {
    Decimal::new(8, 3)
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trading_pairs: default_trading_pairs(),
            maker_fee: default_maker_fee(),
            taker_fee: default_taker_fee(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXCHANGE"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn get_trading_pairs(&self) -> anyhow::Result<Vec<Instrument>> {
        self.trading_pairs
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| Ok(pair.parse()?))
            .collect()
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            maker: self.maker_fee,
            taker: self.taker_fee,
        }
    }
}
