//! Single-node proof-of-work ledger with seed-derived wallets.

pub mod api;
pub mod blockchain;
pub mod config;
