use crate::domain::Side;
use serde::{Deserialize, Serialize};

/// Current top-of-book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Price a position of `side` would exit at (bid for longs, ask for shorts),
    /// falling back to `last_close` when the quote side is unusable.
    pub fn exit_price(&self, side: Side, last_close: f64) -> f64 {
        let px = match side {
            Side::Long => self.bid,
            Side::Short => self.ask,
        };
        if px > 0.0 && px.is_finite() {
            px
        } else {
            last_close
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_price_uses_side_of_book() {
        let q = Quote::new(1.1000, 1.1002);
        assert_eq!(q.exit_price(Side::Long, 1.2), 1.1000);
        assert_eq!(q.exit_price(Side::Short, 1.2), 1.1002);
    }

    #[test]
    fn exit_price_falls_back_to_close() {
        let q = Quote::new(0.0, f64::NAN);
        assert_eq!(q.exit_price(Side::Long, 1.2), 1.2);
        assert_eq!(q.exit_price(Side::Short, 1.2), 1.2);
    }
}
