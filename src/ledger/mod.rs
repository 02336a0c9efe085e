//! Ledger module containing party ledgers, posting and the engine

pub mod aging;
pub mod book;
pub mod core;
pub mod party;
pub mod posting;

pub use aging::*;
pub use book::*;
pub use core::*;
pub use party::*;
pub use posting::*;
