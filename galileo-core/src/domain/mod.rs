//! Domain types for Galileo

pub mod bar;
pub mod instrument;
pub mod position;
pub mod quote;

pub use bar::{bar_interval_secs, Bar};
pub use instrument::{Instrument, InstrumentError, TickPolicy};
pub use position::{PositionId, PositionView, Side};
pub use quote::Quote;
