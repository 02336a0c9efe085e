//! Reconciliation of returns against the documents they reverse

pub mod returns;

pub use returns::*;
