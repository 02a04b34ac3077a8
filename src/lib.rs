// Proof-of-work ledger
//
// - `blockchain`: the ledger engine (blocks, transactions, wallets, storage)
// - `api`: actix-web handlers over a shared ledger
// - `config`: runtime settings

pub mod api;
pub mod blockchain;
pub mod config;
