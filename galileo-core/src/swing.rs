//! Fractal swing (pivot) detection and leg construction.
//!
//! A bar is a swing low when its low is <= every low within `backstep` bars on
//! both sides (ties count); swing highs mirror that. Pivots are confirmed only
//! after `backstep` later bars exist, so the scan starts `backstep` bars before
//! the last closed bar. The bar under evaluation never takes part.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub is_high: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegDirection {
    Up,
    Down,
}

/// Directional move between two chained opposite swings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub start_index: usize,
    pub start_price: f64,
    pub end_index: usize,
    pub end_price: f64,
    pub direction: LegDirection,
}

impl Leg {
    /// Unsigned price distance covered by the leg.
    pub fn span(&self) -> f64 {
        (self.end_price - self.start_price).abs()
    }

    /// High end of the leg.
    pub fn high(&self) -> f64 {
        self.start_price.max(self.end_price)
    }

    /// Low end of the leg.
    pub fn low(&self) -> f64 {
        self.start_price.min(self.end_price)
    }
}

/// Pivot scanner over a bar history.
#[derive(Debug, Clone, Copy)]
pub struct SwingDetector<'a> {
    bars: &'a [Bar],
}

impl<'a> SwingDetector<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self { bars }
    }

    fn is_swing(&self, i: usize, backstep: usize, is_low: bool) -> bool {
        let window = &self.bars[i - backstep..=i + backstep];
        if is_low {
            let v = self.bars[i].low;
            window.iter().all(|b| !(v > b.low))
        } else {
            let v = self.bars[i].high;
            window.iter().all(|b| !(v < b.high))
        }
    }

    /// Candidate indices from newest to oldest, stopping above `floor` (exclusive).
    fn candidates(&self, backstep: usize, floor: Option<usize>) -> impl Iterator<Item = usize> {
        // Last closed bar is the one before the bar under evaluation.
        let newest = self
            .bars
            .len()
            .checked_sub(2)
            .and_then(|start| start.checked_sub(backstep));
        let lowest = floor.map_or(0, |f| f + 1).max(backstep);
        newest
            .into_iter()
            .flat_map(move |hi| (lowest..=hi).rev())
    }

    /// Most recent swing of the requested polarity within `lookback` bars.
    pub fn find_last_swing(
        &self,
        is_low: bool,
        backstep: usize,
        lookback: usize,
    ) -> Option<SwingPoint> {
        let backstep = backstep.max(1);
        let start = self.bars.len().checked_sub(2)?;
        let from = start.saturating_sub(lookback).max(backstep);
        self.candidates(backstep, from.checked_sub(1))
            .find(|&i| self.is_swing(i, backstep, is_low))
            .map(|i| SwingPoint {
                index: i,
                price: if is_low { self.bars[i].low } else { self.bars[i].high },
                is_high: !is_low,
            })
    }

    /// Most recent swing of the requested polarity strictly after `after`.
    fn find_swing_after(&self, is_low: bool, backstep: usize, after: usize) -> Option<SwingPoint> {
        self.candidates(backstep, Some(after))
            .find(|&i| self.is_swing(i, backstep, is_low))
            .map(|i| SwingPoint {
                index: i,
                price: if is_low { self.bars[i].low } else { self.bars[i].high },
                is_high: !is_low,
            })
    }

    fn build_leg(
        &self,
        direction: LegDirection,
        backstep: usize,
        lookback: usize,
        tick_size: f64,
    ) -> Option<Leg> {
        let backstep = backstep.max(1);
        let origin_is_low = direction == LegDirection::Up;
        let origin = self.find_last_swing(origin_is_low, backstep, lookback)?;
        let end = self.find_swing_after(!origin_is_low, backstep, origin.index)?;
        let leg = Leg {
            start_index: origin.index,
            start_price: origin.price,
            end_index: end.index,
            end_price: end.price,
            direction,
        };
        let rising = leg.end_price - leg.start_price;
        let signed_span = match direction {
            LegDirection::Up => rising,
            LegDirection::Down => -rising,
        };
        (signed_span > tick_size).then_some(leg)
    }

    /// Last swing low, then the most recent swing high after it.
    pub fn build_leg_up(&self, backstep: usize, lookback: usize, tick_size: f64) -> Option<Leg> {
        self.build_leg(LegDirection::Up, backstep, lookback, tick_size)
    }

    /// Last swing high, then the most recent swing low after it.
    pub fn build_leg_down(&self, backstep: usize, lookback: usize, tick_size: f64) -> Option<Leg> {
        self.build_leg(LegDirection::Down, backstep, lookback, tick_size)
    }
}
