pub mod batch;
pub mod nsl;
pub mod trace;

pub use batch::{Batch, BatchClass};
pub use nsl::{query_codes, ChannelCode, ChannelSelector, Nsl, NslError, StationSelection};
pub use trace::Trace;
