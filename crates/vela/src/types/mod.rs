//! Runtime data types backing the value union.

pub mod bytes;
pub mod list;
pub mod map;
pub mod rational;
pub mod record;

pub use bytes::{Bits, Bytes};
pub use list::List;
pub use map::Map;
pub use rational::Rational;
pub use record::Record;
