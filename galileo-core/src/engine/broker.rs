//! Account and order collaborator.
//!
//! The engine never owns positions. It reads them through [`Broker`], sends
//! requests, and logs failures without retrying.

use crate::domain::{PositionId, PositionView, Quote, Side};
use crate::gates::DailyTally;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub side: Side,
    pub units: f64,
    pub label: String,
    /// Stop and target as whole-pip distances from the fill.
    pub sl_pips: i64,
    pub tp_pips: i64,
    /// Price the plan was built on; used to measure slippage.
    pub expected_price: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("position {0} not found")]
    UnknownPosition(PositionId),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

pub trait Broker {
    /// Open positions on this instrument whose label starts with `label_prefix`.
    fn positions(&self, label_prefix: &str) -> Vec<PositionView>;

    fn quote(&self) -> Quote;

    fn balance(&self) -> f64;

    /// Wins and losses among trades closed on `date`.
    fn daily_tally(&self, date: NaiveDate) -> DailyTally;

    /// Execute at market; returns the resulting position.
    fn market_order(&mut self, request: &MarketOrderRequest) -> Result<PositionView, BrokerError>;

    fn modify_position(
        &mut self,
        id: PositionId,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), BrokerError>;

    fn close_position(&mut self, id: PositionId) -> Result<(), BrokerError>;
}
