use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::crypto::sha256_hex;
use super::transaction::{Transaction, TransactionError};

/// Length of a hex SHA-256 digest; no hash has more leading zeros than this
pub const MAX_DIFFICULTY: u32 = 64;

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block, in hashed order
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Hash of the current block
    pub hash: String,

    /// Proof of work counter
    pub nonce: u64,

    /// Number of leading zero hex characters required in `hash`
    pub difficulty: u32,
}

impl Block {
    /// Creates a new block
    ///
    /// # Arguments
    ///
    /// * `transactions` - The list of transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    /// * `difficulty` - The proof-of-work target used by `mine`
    ///
    /// # Returns
    ///
    /// A new Block instance with its hash computed at nonce 0
    pub fn new(transactions: Vec<Transaction>, previous_hash: String, difficulty: u32) -> Self {
        Self::with_timestamp(Utc::now(), transactions, previous_hash, difficulty)
    }

    /// Creates a block with a fixed timestamp
    pub fn with_timestamp(
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: u32,
    ) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
            difficulty,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Calculates the hash of the block
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        // Struct field order makes the transaction JSON canonical
        let transactions = serde_json::to_string(&self.transactions).unwrap_or_default();

        let preimage = format!(
            "{}{}{}{}",
            self.previous_hash,
            self.timestamp.timestamp_millis(),
            transactions,
            self.nonce
        );

        sha256_hex(preimage.as_bytes())
    }

    /// Runs proof of work until the hash starts with `difficulty` zeros
    pub fn mine(&mut self) -> &str {
        while !self.meets_difficulty() {
            self.nonce += 1;
            self.hash = self.calculate_hash();
        }

        &self.hash
    }

    /// Checks whether the stored hash meets the block's difficulty
    pub fn meets_difficulty(&self) -> bool {
        let zeros = self.difficulty as usize;
        self.hash.len() >= zeros && self.hash.as_bytes()[..zeros].iter().all(|&b| b == b'0')
    }

    /// Checks every transaction in the block.
    ///
    /// Propagates `MissingSignature` from unsigned transfers.
    pub fn has_valid_transactions(&self) -> Result<bool, TransactionError> {
        for transaction in &self.transactions {
            if !transaction.is_valid()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
