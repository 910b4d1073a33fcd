//! Data models

mod interface;
mod slot;

pub use interface::*;
pub use slot::*;
