use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::crypto::{sha256_hex, verify_signature, Address, DigitalSignature, Wallet};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Transaction is not signed")]
    MissingSignature,
}

/// The closed set of transaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Value moved between two wallets, signed by the sender
    Transfer,
    /// Block reward paid to the miner
    Reward,
    /// New supply credited to an address
    Mint,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Transfer => "transfer",
            TransactionKind::Reward => "reward",
            TransactionKind::Mint => "mint",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a transaction in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Sender's address, absent for system-issued transactions
    pub from_address: Option<Address>,

    /// Recipient's address
    pub to_address: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Kind of transaction
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Content hash over sender, recipient, amount, timestamp and kind
    pub hash: String,

    /// DER-encoded signature over `hash`
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transfer
    ///
    /// # Arguments
    ///
    /// * `from` - The address of the sender
    /// * `to` - The address of the recipient
    /// * `amount` - The amount to transfer
    pub fn new(from: Address, to: Address, amount: f64) -> Self {
        Self::build(Some(from), to, amount, TransactionKind::Transfer, Utc::now())
    }

    /// Creates a mining reward transaction
    pub fn new_reward(miner: Address, amount: f64) -> Self {
        Self::build(None, miner, amount, TransactionKind::Reward, Utc::now())
    }

    /// Creates a token mint transaction
    pub fn new_mint(to: Address, amount: f64) -> Self {
        Self::build(None, to, amount, TransactionKind::Mint, Utc::now())
    }

    fn build(
        from_address: Option<Address>,
        to_address: Address,
        amount: f64,
        kind: TransactionKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut transaction = Transaction {
            from_address,
            to_address,
            amount,
            timestamp,
            kind,
            hash: String::new(),
            signature: None,
        };
        transaction.hash = transaction.calculate_hash();
        transaction
    }

    /// Calculates the content hash of the transaction
    ///
    /// # Returns
    ///
    /// The SHA-256 hash as a hexadecimal string
    pub fn calculate_hash(&self) -> String {
        let from = self.from_address.as_ref().map(Address::as_str).unwrap_or("");
        let preimage = format!(
            "{}{}{}{}{}",
            from,
            self.to_address,
            self.amount,
            self.timestamp.timestamp_millis(),
            self.kind
        );

        sha256_hex(preimage.as_bytes())
    }

    /// Signs the transaction's content hash with a wallet.
    ///
    /// Signing again replaces the previous signature.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        let from = self.from_address.as_ref().ok_or_else(|| {
            TransactionError::Unauthorized(format!("{} transactions have no sender", self.kind))
        })?;

        if wallet.address() != from {
            return Err(TransactionError::Unauthorized(
                "cannot sign transactions for other wallets".to_string(),
            ));
        }

        self.signature = Some(wallet.sign(self.hash.as_bytes()));
        Ok(())
    }

    /// Checks the transaction's authenticity
    ///
    /// # Returns
    ///
    /// `Ok(true)` for system-issued transactions and for transfers whose
    /// signature verifies over the recomputed content hash
    pub fn is_valid(&self) -> Result<bool, TransactionError> {
        match (self.kind, &self.from_address) {
            (TransactionKind::Reward | TransactionKind::Mint, None) => Ok(true),
            (TransactionKind::Reward | TransactionKind::Mint, Some(_)) => Ok(false),
            (TransactionKind::Transfer, None) => Ok(false),
            (TransactionKind::Transfer, Some(from)) => {
                let signature = self
                    .signature
                    .as_ref()
                    .ok_or(TransactionError::MissingSignature)?;

                if self.hash != self.calculate_hash() {
                    return Ok(false);
                }

                match verify_signature(from, self.hash.as_bytes(), signature) {
                    Ok(valid) => Ok(valid),
                    Err(err) => {
                        debug!("Rejecting transaction {}: {}", self.hash, err);
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Checks if the transaction was issued by the system (reward or mint)
    pub fn is_system_issued(&self) -> bool {
        self.from_address.is_none()
    }
}
