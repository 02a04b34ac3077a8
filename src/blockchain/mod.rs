// Blockchain module
//
// This module contains the ledger engine:
// - Block structure and proof of work
// - Blockchain (chain, pending pool, wallet registry)
// - Transaction structure and signatures
// - Cryptography utilities
// - Persistence gateway

pub mod block;
pub mod chain;
pub mod crypto;
pub mod storage;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, BlockchainError, LedgerStats};
pub use crypto::{Address, DigitalSignature, Wallet};
pub use transaction::{Transaction, TransactionError, TransactionKind};
pub use wallet::{WalletInfo, WalletRecord};
