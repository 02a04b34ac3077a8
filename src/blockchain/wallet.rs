use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use std::sync::Arc;

use super::crypto::{Address, CryptoError, Wallet};

/// A wallet tracked by the ledger.
///
/// `balance` is a cache refreshed after every mined block; the chain replay is
/// authoritative. The private key is stored in the clear for demo purposes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub id: String,
    pub address: Address,
    pub balance: f64,
    pub public_key: String,
    pub private_key: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a wallet record (no key material)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub id: String,
    pub address: Address,
    pub balance: f64,
    pub public_key: String,
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Creates a record for a freshly generated wallet
    pub fn from_wallet(wallet: &Wallet) -> Self {
        WalletRecord {
            id: Uuid::new_v4().to_string(),
            address: wallet.address().clone(),
            balance: 0.0,
            public_key: wallet.public_key_hex(),
            private_key: wallet.export_private_key(),
            created_at: Utc::now(),
        }
    }

    /// Restores the keypair; the address is re-derived from the private key
    pub fn to_wallet(&self) -> Result<Wallet, CryptoError> {
        Wallet::from_private_key(&self.private_key)
    }

    pub fn info(&self) -> WalletInfo {
        WalletInfo {
            id: self.id.clone(),
            address: self.address.clone(),
            balance: self.balance,
            public_key: self.public_key.clone(),
            created_at: self.created_at,
        }
    }
}

/// Registry of wallets known to the ledger, keyed by address
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    wallets: Arc<DashMap<Address, WalletRecord>>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from persisted records.
    ///
    /// Key material is authoritative: each record's address and public key are
    /// re-derived from its private key, and records with unusable keys are dropped.
    pub fn from_records(records: Vec<WalletRecord>) -> Self {
        let registry = Self::new();

        for mut record in records {
            match record.to_wallet() {
                Ok(wallet) => {
                    if wallet.address() != &record.address {
                        warn!(
                            "Wallet {} stored under a mismatched address, re-deriving",
                            record.id
                        );
                    }
                    record.address = wallet.address().clone();
                    record.public_key = wallet.public_key_hex();
                    registry.insert(record);
                }
                Err(err) => {
                    warn!("Dropping wallet {} with unusable key: {}", record.id, err);
                }
            }
        }

        registry
    }

    pub fn insert(&self, record: WalletRecord) {
        self.wallets.insert(record.address.clone(), record);
    }

    pub fn get(&self, address: &Address) -> Option<WalletRecord> {
        self.wallets.get(address).map(|entry| entry.value().clone())
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.wallets.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Updates the cached balance of a tracked wallet
    pub fn set_balance(&self, address: &Address, balance: f64) {
        if let Some(mut entry) = self.wallets.get_mut(address) {
            entry.balance = balance;
        }
    }

    pub fn records(&self) -> Vec<WalletRecord> {
        self.wallets.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
