use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, MAX_DIFFICULTY};
use super::crypto::{Address, Wallet};
use super::storage::{
    decode, encode, MemoryStore, SledStore, StateStore, StorageError, CHAIN_KEY, PENDING_KEY,
    WALLETS_KEY,
};
use super::transaction::{Transaction, TransactionError};
use super::wallet::{WalletRecord, WalletRegistry};

/// Errors that can occur during blockchain operations
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error(transparent)]
    TransactionError(#[from] TransactionError),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Chain tip changed while mining")]
    StaleBlock,

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Summary of the ledger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub chain_length: usize,
    pub pending_count: usize,
    pub wallet_count: usize,
    pub difficulty: u32,
    pub mining_reward: f64,
    pub is_valid: bool,
    pub is_mining: bool,
}

/// Chain and pending pool, always mutated together under one lock
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

/// Represents the blockchain
pub struct Blockchain {
    /// The chain of blocks and the pending pool
    state: Mutex<LedgerState>,

    /// Held for the whole of a mining pass
    mining: Mutex<()>,

    /// Wallets created through the ledger
    wallets: WalletRegistry,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: u32,

    /// Mining reward
    mining_reward: f64,

    /// Storage for ledger snapshots
    storage: Arc<dyn StateStore>,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("difficulty", &self.difficulty)
            .field("mining_reward", &self.mining_reward)
            .finish()
    }
}

/// Creates the genesis block (first block in the chain).
///
/// The genesis block is hashed but never mined.
pub fn create_genesis_block(difficulty: u32) -> Block {
    Block::new(Vec::new(), "0".to_string(), difficulty)
}

/// Sums every transaction in the chain that touches `address`
pub fn balance_in(chain: &[Block], address: &Address) -> f64 {
    let mut balance = 0.0;

    for block in chain {
        for transaction in &block.transactions {
            if transaction.from_address.as_ref() == Some(address) {
                balance -= transaction.amount;
            }

            if &transaction.to_address == address {
                balance += transaction.amount;
            }
        }
    }

    balance
}

/// Validates hash integrity, linkage and signatures of every block after genesis
pub fn is_valid_chain(chain: &[Block]) -> bool {
    for i in 1..chain.len() {
        let current_block = &chain[i];
        let previous_block = &chain[i - 1];

        if current_block.hash != current_block.calculate_hash() {
            warn!("Block {} hash does not match its contents", i);
            return false;
        }

        if current_block.previous_hash != previous_block.hash {
            warn!("Block {} is not linked to block {}", i, i - 1);
            return false;
        }

        match current_block.has_valid_transactions() {
            Ok(true) => {}
            Ok(false) => {
                warn!("Block {} contains an invalid transaction", i);
                return false;
            }
            Err(err) => {
                warn!("Block {} contains an invalid transaction: {}", i, err);
                return false;
            }
        }
    }

    true
}

impl Blockchain {
    /// Creates an in-memory blockchain with a genesis block
    pub fn new(difficulty: u32, mining_reward: f64) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), difficulty, mining_reward)
    }

    /// Creates a blockchain backed by a sled database at `storage_path`
    pub fn with_storage<P: AsRef<Path>>(
        storage_path: P,
        difficulty: u32,
        mining_reward: f64,
    ) -> Result<Self, BlockchainError> {
        let storage = SledStore::open(storage_path)?;
        Ok(Self::with_store(Arc::new(storage), difficulty, mining_reward))
    }

    /// Creates a blockchain hydrated from `storage`.
    ///
    /// The chain, wallets and pending pool load independently; each falls back
    /// to its initial value when absent or unreadable.
    pub fn with_store(storage: Arc<dyn StateStore>, difficulty: u32, mining_reward: f64) -> Self {
        let difficulty = if difficulty > MAX_DIFFICULTY {
            warn!(
                "Difficulty {} can never be met, capping at {}",
                difficulty, MAX_DIFFICULTY
            );
            MAX_DIFFICULTY
        } else {
            difficulty
        };

        let chain = match load_blob::<Vec<Block>>(storage.as_ref(), CHAIN_KEY) {
            Some(chain) if chain.first().map(|b| b.previous_hash.as_str()) == Some("0") => {
                info!("Loaded chain of {} blocks from storage", chain.len());
                if !is_valid_chain(&chain) {
                    warn!("Stored chain failed validation");
                }
                chain
            }
            Some(_) => {
                warn!("Stored chain does not start with a genesis block, starting fresh");
                vec![create_genesis_block(difficulty)]
            }
            None => vec![create_genesis_block(difficulty)],
        };

        let wallets = load_blob::<Vec<WalletRecord>>(storage.as_ref(), WALLETS_KEY)
            .map(WalletRegistry::from_records)
            .unwrap_or_default();

        let pending_transactions =
            load_blob::<Vec<Transaction>>(storage.as_ref(), PENDING_KEY).unwrap_or_default();

        let blockchain = Blockchain {
            state: Mutex::new(LedgerState {
                chain,
                pending_transactions,
            }),
            mining: Mutex::new(()),
            wallets,
            difficulty,
            mining_reward,
            storage,
        };

        let state = blockchain.state.lock();
        blockchain.refresh_wallet_balances(&state.chain);
        drop(state);

        blockchain
    }

    pub fn mining_reward(&self) -> f64 {
        self.mining_reward
    }

    /// Gets the last block in the chain
    pub fn get_latest_block(&self) -> Block {
        let state = self.state.lock();
        latest_block(&state.chain).clone()
    }

    /// Adds a signed transfer to the pending transactions
    ///
    /// # Returns
    ///
    /// The index of the block that will include this transaction
    pub fn add_transaction(&self, transaction: Transaction) -> Result<u64, BlockchainError> {
        if transaction.is_system_issued() {
            return Err(BlockchainError::InvalidTransaction(format!(
                "{} transactions are issued by the ledger",
                transaction.kind
            )));
        }

        let sender = match (&transaction.from_address, transaction.to_address.0.is_empty()) {
            (Some(sender), false) if !sender.0.is_empty() => sender.clone(),
            _ => {
                return Err(BlockchainError::InvalidTransaction(
                    "transaction must include sender and recipient addresses".to_string(),
                ))
            }
        };

        if !transaction.is_valid()? {
            return Err(BlockchainError::InvalidTransaction(
                "signature does not verify against the sender address".to_string(),
            ));
        }

        if !(transaction.amount.is_finite() && transaction.amount > 0.0) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "amount must be positive: {}",
                transaction.amount
            )));
        }

        let mut state = self.state.lock();

        // Transfers already admitted from this sender are reserved against its balance
        let reserved: f64 = state
            .pending_transactions
            .iter()
            .filter(|pending| pending.from_address.as_ref() == Some(&sender))
            .map(|pending| pending.amount)
            .sum();
        let available = balance_in(&state.chain, &sender) - reserved;

        if available < transaction.amount {
            return Err(BlockchainError::InsufficientBalance {
                required: transaction.amount,
                available,
            });
        }

        info!(
            "Transaction {} admitted: {} from {} to {}",
            transaction.hash, transaction.amount, sender, transaction.to_address
        );
        state.pending_transactions.push(transaction);
        self.checkpoint(&state);

        Ok(state.chain.len() as u64)
    }

    /// Mines a new block with all pending transactions plus a reward
    ///
    /// The pool is snapshotted under the ledger lock and the proof of work runs
    /// without it, so reads and admissions proceed while a block is mined.
    /// Transactions admitted meanwhile stay pending for the next block.
    ///
    /// # Arguments
    ///
    /// * `reward_address` - The address credited with the mining reward
    ///
    /// # Returns
    ///
    /// The newly mined block
    pub fn mine_pending_transactions(
        &self,
        reward_address: &Address,
    ) -> Result<Block, BlockchainError> {
        if reward_address.0.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "mining reward address is required".to_string(),
            ));
        }

        // Only one mining pass at a time; the tip cannot move underneath it
        let _mining = self.mining.lock();

        let (mut block, taken, height) = {
            let state = self.state.lock();
            let mut transactions = state.pending_transactions.clone();
            let taken = transactions.len();
            transactions.push(Transaction::new_reward(
                reward_address.clone(),
                self.mining_reward,
            ));
            let previous_hash = latest_block(&state.chain).hash.clone();
            (
                Block::new(transactions, previous_hash, self.difficulty),
                taken,
                state.chain.len(),
            )
        };

        info!(
            "Mining block {} with {} transactions at difficulty {}",
            height,
            block.transactions.len(),
            self.difficulty
        );
        let started = Instant::now();
        block.mine();
        info!(
            "Mined block {} in {:?}: nonce {}, hash {}",
            height,
            started.elapsed(),
            block.nonce,
            block.hash
        );

        let mut state = self.state.lock();
        if latest_block(&state.chain).hash != block.previous_hash {
            warn!("Chain tip moved while mining block {}, discarding it", height);
            return Err(BlockchainError::StaleBlock);
        }

        state.pending_transactions.drain(..taken);
        state.chain.push(block.clone());
        self.refresh_wallet_balances(&state.chain);
        self.checkpoint(&state);

        Ok(block)
    }

    /// Returns true while a block is being mined
    pub fn is_mining(&self) -> bool {
        self.mining.is_locked()
    }

    /// Credits `amount` of new supply to `to_address` via the pending pool.
    ///
    /// Mint transactions have no sender, so no balance or signature checks apply.
    pub fn mint_tokens(
        &self,
        to_address: &Address,
        amount: f64,
    ) -> Result<Transaction, BlockchainError> {
        if to_address.0.is_empty() {
            return Err(BlockchainError::InvalidTransaction(
                "mint requires a recipient address".to_string(),
            ));
        }

        if !(amount.is_finite() && amount > 0.0) {
            return Err(BlockchainError::InvalidTransaction(format!(
                "amount must be positive: {}",
                amount
            )));
        }

        let transaction = Transaction::new_mint(to_address.clone(), amount);

        let mut state = self.state.lock();
        state.pending_transactions.push(transaction.clone());
        info!("Minted {} tokens to {}", amount, to_address);
        self.checkpoint(&state);

        Ok(transaction)
    }

    /// Calculates the balance of an address by replaying the whole chain.
    ///
    /// Pending transactions are not counted.
    pub fn get_balance_of_address(&self, address: &Address) -> f64 {
        let state = self.state.lock();
        balance_in(&state.chain, address)
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the blockchain is valid, false otherwise
    pub fn is_chain_valid(&self) -> bool {
        let state = self.state.lock();
        is_valid_chain(&state.chain)
    }

    /// Creates and registers a new wallet
    pub fn create_wallet(&self) -> WalletRecord {
        let wallet = Wallet::new();
        let record = WalletRecord::from_wallet(&wallet);

        let state = self.state.lock();
        self.wallets.insert(record.clone());
        info!("Created wallet {}", record.address);
        self.checkpoint(&state);

        record
    }

    /// Gets a registered wallet with a freshly replayed balance
    pub fn get_wallet(&self, address: &Address) -> Option<WalletRecord> {
        let mut record = self.wallets.get(address)?;
        record.balance = self.get_balance_of_address(address);
        Some(record)
    }

    pub fn get_stats(&self) -> LedgerStats {
        let state = self.state.lock();

        LedgerStats {
            chain_length: state.chain.len(),
            pending_count: state.pending_transactions.len(),
            wallet_count: self.wallets.len(),
            difficulty: self.difficulty,
            mining_reward: self.mining_reward,
            is_valid: is_valid_chain(&state.chain),
            is_mining: self.is_mining(),
        }
    }

    /// Gets the entire blockchain
    pub fn get_all_blocks(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    /// Finds a block by its hash
    pub fn get_block(&self, hash: &str) -> Option<Block> {
        let state = self.state.lock();
        state.chain.iter().find(|block| block.hash == hash).cloned()
    }

    /// Gets every mined transaction in chain order
    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        let state = self.state.lock();
        state
            .chain
            .iter()
            .flat_map(|block| block.transactions.iter().cloned())
            .collect()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().pending_transactions.clone()
    }

    /// Saves the chain, wallets and pending pool to storage
    pub fn save_to_storage(&self) -> Result<(), BlockchainError> {
        let state = self.state.lock();
        self.write_snapshot(&state)
    }

    fn write_snapshot(&self, state: &LedgerState) -> Result<(), BlockchainError> {
        self.storage.put(CHAIN_KEY, encode(&state.chain)?)?;
        self.storage.put(WALLETS_KEY, encode(&self.wallets.records())?)?;
        self.storage
            .put(PENDING_KEY, encode(&state.pending_transactions)?)?;
        self.storage.flush()?;
        Ok(())
    }

    /// Persists a snapshot, logging instead of failing
    fn checkpoint(&self, state: &LedgerState) {
        if let Err(err) = self.write_snapshot(state) {
            error!("Failed to checkpoint ledger state: {}", err);
        }
    }

    /// Recomputes every tracked wallet's cached balance
    fn refresh_wallet_balances(&self, chain: &[Block]) {
        for address in self.wallets.addresses() {
            self.wallets.set_balance(&address, balance_in(chain, &address));
        }
    }
}

fn latest_block(chain: &[Block]) -> &Block {
    // The chain always holds at least the genesis block
    &chain[chain.len() - 1]
}

fn load_blob<T: serde::de::DeserializeOwned>(storage: &dyn StateStore, key: &str) -> Option<T> {
    match storage.get(key) {
        Ok(Some(bytes)) => match decode(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring unreadable '{}' record: {}", key, err);
                None
            }
        },
        Ok(None) => {
            info!("No '{}' record found in storage", key);
            None
        }
        Err(err) => {
            warn!("Failed to read '{}' from storage: {}", key, err);
            None
        }
    }
}
