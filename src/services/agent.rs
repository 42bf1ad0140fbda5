//! Scripted trading agent.
//!
//! Replays a list of instructions against a shared exchange. The agent keeps
//! its own mapping from caller-chosen client order ids to engine order ids,
//! so scripts can cancel by the ids they invented and duplicate client ids
//! are caught before they reach the engine.

use crate::engine::{Exchange, ExchangeError};
use crate::models::{Instrument, Side};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// One step of an agent script.
#[derive(Debug, Clone)]
pub enum Instruction {
    CreateLimit {
        pair: Instrument,
        price: Decimal,
        side: Side,
        amount: Decimal,
        account: String,
        client_id: u64,
    },
    CreateMarket {
        pair: Instrument,
        side: Side,
        amount: Decimal,
        account: String,
        client_id: u64,
    },
    CancelOrder {
        pair: Instrument,
        client_id: u64,
    },
    Sleep {
        seconds: u64,
    },
}

/// Pause/resume handle for a running agent. Takes effect between
/// instructions, never mid-instruction.
#[derive(Clone)]
pub struct AgentControl {
    gate: watch::Sender<bool>,
}

impl AgentControl {
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }
}

pub struct Agent {
    exchange: Arc<Exchange>,
    instructions: Vec<Instruction>,
    gate: watch::Receiver<bool>,
    placed: HashMap<u64, u64>,
}

impl Agent {
    pub fn new(exchange: Arc<Exchange>, instructions: Vec<Instruction>) -> (Self, AgentControl) {
        let (gate_tx, gate_rx) = watch::channel(true);
        (
            Self {
                exchange,
                instructions,
                gate: gate_rx,
                placed: HashMap::new(),
            },
            AgentControl { gate: gate_tx },
        )
    }

    /// Execute the script to completion. Returns the client-id → engine-id
    /// mapping of every order the script placed. The first failing
    /// instruction aborts the run.
    pub async fn run(mut self) -> Result<HashMap<u64, u64>, ExchangeError> {
        let instructions = std::mem::take(&mut self.instructions);
        for instruction in instructions {
            self.wait_until_running().await;
            debug!(?instruction, "agent instruction");
            match instruction {
                Instruction::CreateLimit {
                    pair,
                    price,
                    side,
                    amount,
                    account,
                    client_id,
                } => {
                    if self.placed.contains_key(&client_id) {
                        return Err(ExchangeError::OrderCreation("client order id already used"));
                    }
                    let order = self
                        .exchange
                        .create_limit(pair, price, side, amount, &account)
                        .await?;
                    self.placed.insert(client_id, order.order_id());
                }
                Instruction::CreateMarket {
                    pair,
                    side,
                    amount,
                    account,
                    client_id,
                } => {
                    if self.placed.contains_key(&client_id) {
                        return Err(ExchangeError::OrderCreation("client order id already used"));
                    }
                    let order = self
                        .exchange
                        .create_market(pair, side, amount, &account)
                        .await?;
                    self.placed.insert(client_id, order.order_id());
                }
                Instruction::CancelOrder { pair, client_id } => {
                    let order_id = *self
                        .placed
                        .get(&client_id)
                        .ok_or(ExchangeError::OrderCancellation("unknown client order id"))?;
                    self.exchange.cancel_order(&pair, order_id).await?;
                }
                Instruction::Sleep { seconds } => {
                    tokio::time::sleep(Duration::from_secs(seconds)).await;
                }
            }
        }
        Ok(self.placed)
    }

    async fn wait_until_running(&mut self) {
        while !*self.gate.borrow() {
            if self.gate.changed().await.is_err() {
                // Control handle dropped while paused; keep going.
                break;
            }
        }
    }
}
