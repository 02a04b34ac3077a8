use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{
    Address, Block, Blockchain, BlockchainError, LedgerStats, Transaction, TransactionError,
    Wallet, WalletInfo,
};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// The sender's address
    pub from_address: Option<String>,

    /// The recipient's address
    pub to_address: Option<String>,

    /// The amount to transfer
    pub amount: Option<f64>,

    /// The sender's private key (hex, used for signing)
    pub private_key: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction: Transaction,

    /// The index of the block that will include this transaction
    pub block_index: u64,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MineRequest {
    /// The address credited with the mining reward
    pub miner_address: Option<String>,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub block: Block,
    pub reward: f64,
}

/// Request for the mint endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub to_address: Option<String>,
    pub amount: Option<f64>,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletResponse {
    pub id: String,
    pub address: Address,
    pub balance: f64,
    pub public_key: String,
    #[schema(value_type = String, example = "2023-01-01T12:00:00Z")]
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// The wallet's private key (hex). Returned once; store it yourself.
    pub private_key: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub is_valid: bool,
    pub chain_length: usize,
}

fn success<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": data,
    }))
}

fn error_response(status: StatusCode, code: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "code": code,
        "error": message,
    }))
}

fn bad_request(message: &str) -> HttpResponse {
    error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", message.to_string())
}

/// Maps each ledger failure to its own status and error code
fn blockchain_error_response(err: &BlockchainError) -> HttpResponse {
    let (status, code) = match err {
        BlockchainError::TransactionError(TransactionError::Unauthorized(_)) => {
            (StatusCode::FORBIDDEN, "UNAUTHORIZED")
        }
        BlockchainError::TransactionError(TransactionError::MissingSignature) => {
            (StatusCode::BAD_REQUEST, "MISSING_SIGNATURE")
        }
        BlockchainError::InvalidTransaction(_) => (StatusCode::BAD_REQUEST, "INVALID_TRANSACTION"),
        BlockchainError::InsufficientBalance { .. } => {
            (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE")
        }
        BlockchainError::StaleBlock => (StatusCode::CONFLICT, "STALE_BLOCK"),
        BlockchainError::StorageError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };

    error_response(status, code, err.to_string())
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Get ledger statistics
#[utoipa::path(
    get,
    path = "/api/blockchain/status",
    responses(
        (status = 200, description = "Ledger statistics", body = LedgerStats)
    )
)]
pub async fn get_status(blockchain: BlockchainData) -> impl Responder {
    success(blockchain.get_stats())
}

/// Get all blocks
#[utoipa::path(
    get,
    path = "/api/blockchain/blocks",
    responses(
        (status = 200, description = "All blocks in chain order", body = Vec<Block>)
    )
)]
pub async fn get_blocks(blockchain: BlockchainData) -> impl Responder {
    success(blockchain.get_all_blocks())
}

/// Get a block by hash
#[utoipa::path(
    get,
    path = "/api/blockchain/blocks/{hash}",
    params(("hash" = String, Path, description = "Block hash")),
    responses(
        (status = 200, description = "Block found", body = Block),
        (status = 404, description = "Block not found")
    )
)]
pub async fn get_block(blockchain: BlockchainData, hash: web::Path<String>) -> impl Responder {
    match blockchain.get_block(hash.as_str()) {
        Some(block) => success(block),
        None => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Block {} not found", hash.as_str()),
        ),
    }
}

/// Mine a new block
///
/// Bundles every pending transaction plus a reward into a new block
#[utoipa::path(
    post,
    path = "/api/blockchain/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Missing miner address")
    )
)]
pub async fn mine(blockchain: BlockchainData, req: web::Json<MineRequest>) -> impl Responder {
    let miner_address = match required(&req.miner_address) {
        Some(address) => Address(address),
        None => return bad_request("minerAddress is required"),
    };

    // Proof of work runs on the blocking pool
    let ledger = blockchain.clone();
    let mined = web::block(move || ledger.mine_pending_transactions(&miner_address)).await;

    match mined {
        Ok(Ok(block)) => success(MineResponse {
            block,
            reward: blockchain.mining_reward(),
        }),
        Ok(Err(err)) => blockchain_error_response(&err),
        Err(err) => {
            error!("Mining worker failed: {}", err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "mining worker failed".to_string(),
            )
        }
    }
}

/// Get the replayed balance of an address
#[utoipa::path(
    get,
    path = "/api/blockchain/balance/{address}",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "Balance computed from the chain", body = BalanceResponse)
    )
)]
pub async fn get_balance(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    let address = address.into_inner();
    let balance = blockchain.get_balance_of_address(&Address(address.clone()));

    success(BalanceResponse { address, balance })
}

/// Create a new wallet
///
/// The private key is only returned in this response
#[utoipa::path(
    post,
    path = "/api/blockchain/wallet",
    responses(
        (status = 200, description = "Wallet created", body = CreateWalletResponse)
    )
)]
pub async fn create_wallet(blockchain: BlockchainData) -> impl Responder {
    let record = blockchain.create_wallet();

    success(CreateWalletResponse {
        id: record.id,
        address: record.address,
        balance: record.balance,
        public_key: record.public_key,
        created_at: record.created_at,
        private_key: record.private_key,
    })
}

/// Get a registered wallet
#[utoipa::path(
    get,
    path = "/api/blockchain/wallet/{address}",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "Wallet found", body = WalletInfo),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_wallet(blockchain: BlockchainData, address: web::Path<String>) -> impl Responder {
    match blockchain.get_wallet(&Address(address.into_inner())) {
        Some(record) => success(record.info()),
        None => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Wallet not found".to_string(),
        ),
    }
}

/// Create, sign and submit a transfer
#[utoipa::path(
    post,
    path = "/api/blockchain/transactions",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transaction admitted to the pending pool", body = TransactionResponse),
        (status = 400, description = "Rejected transaction"),
        (status = 403, description = "Private key does not own the sender address")
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    req: web::Json<TransactionRequest>,
) -> impl Responder {
    let (from_address, to_address, private_key) = match (
        required(&req.from_address),
        required(&req.to_address),
        required(&req.private_key),
    ) {
        (Some(from), Some(to), Some(key)) => (from, to, key),
        _ => return bad_request("fromAddress, toAddress, amount and privateKey are required"),
    };
    let amount = match req.amount {
        Some(amount) => amount,
        None => return bad_request("fromAddress, toAddress, amount and privateKey are required"),
    };

    let wallet = match Wallet::from_private_key(&private_key) {
        Ok(wallet) => wallet,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "INVALID_KEY", err.to_string()),
    };

    let mut transaction = Transaction::new(Address(from_address), Address(to_address), amount);
    if let Err(err) = transaction.sign(&wallet) {
        return blockchain_error_response(&BlockchainError::from(err));
    }

    match blockchain.add_transaction(transaction.clone()) {
        Ok(block_index) => success(TransactionResponse {
            transaction,
            block_index,
        }),
        Err(err) => blockchain_error_response(&err),
    }
}

/// Get every mined transaction
#[utoipa::path(
    get,
    path = "/api/blockchain/transactions",
    responses(
        (status = 200, description = "Mined transactions in chain order", body = Vec<Transaction>)
    )
)]
pub async fn get_transactions(blockchain: BlockchainData) -> impl Responder {
    success(blockchain.get_all_transactions())
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/api/blockchain/transactions/pending",
    responses(
        (status = 200, description = "Transactions waiting to be mined", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    success(blockchain.get_pending_transactions())
}

/// Mint new tokens
///
/// The mint lands in the pending pool and takes effect once mined
#[utoipa::path(
    post,
    path = "/api/blockchain/mint",
    request_body = MintRequest,
    responses(
        (status = 200, description = "Mint transaction queued", body = Transaction),
        (status = 400, description = "Invalid mint request")
    )
)]
pub async fn mint(blockchain: BlockchainData, req: web::Json<MintRequest>) -> impl Responder {
    let (to_address, amount) = match (required(&req.to_address), req.amount) {
        (Some(to), Some(amount)) => (Address(to), amount),
        _ => return bad_request("toAddress and amount are required"),
    };

    match blockchain.mint_tokens(&to_address, amount) {
        Ok(transaction) => success(transaction),
        Err(err) => blockchain_error_response(&err),
    }
}

/// Validate the chain
#[utoipa::path(
    get,
    path = "/api/blockchain/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let stats = blockchain.get_stats();

    success(ValidateResponse {
        is_valid: stats.is_valid,
        chain_length: stats.chain_length,
    })
}

/// Liveness probe
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "ledger service is running",
        "timestamp": chrono::Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    fn ledger() -> BlockchainData {
        web::Data::new(Blockchain::new(1, 100.0))
    }

    macro_rules! app {
        ($data:expr) => {
            test::init_service(
                App::new()
                    .app_data($data.clone())
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_wallet_mint_mine_and_transfer() {
        let data = ledger();
        let app = app!(data);

        let req = test::TestRequest::post()
            .uri("/api/blockchain/wallet")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        let alice = body["data"]["address"].as_str().unwrap().to_string();
        let alice_key = body["data"]["privateKey"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/blockchain/mint")
            .set_json(json!({ "toAddress": alice, "amount": 1000.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::post()
            .uri("/api/blockchain/mine")
            .set_json(json!({ "minerAddress": alice }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["reward"], 100.0);
        assert!(body["data"]["block"]["hash"].as_str().unwrap().starts_with('0'));

        let bob = Wallet::new();
        let req = test::TestRequest::post()
            .uri("/api/blockchain/transactions")
            .set_json(json!({
                "fromAddress": alice,
                "toAddress": bob.address().0,
                "amount": 100.0,
                "privateKey": alice_key,
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["blockIndex"], 2);

        let req = test::TestRequest::get()
            .uri(&format!("/api/blockchain/wallet/{}", alice))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["balance"], 1100.0);
        assert!(body["data"].get("privateKey").is_none());

        let req = test::TestRequest::get()
            .uri("/api/blockchain/status")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["chainLength"], 2);
        assert_eq!(body["data"]["pendingCount"], 1);
        assert_eq!(body["data"]["isValid"], true);
    }

    #[actix_web::test]
    async fn test_rejections_are_distinguishable() {
        let data = ledger();
        let app = app!(data);

        let alice = Wallet::new();
        let mallory = Wallet::new();

        // Key does not own the sender address
        let req = test::TestRequest::post()
            .uri("/api/blockchain/transactions")
            .set_json(json!({
                "fromAddress": alice.address().0,
                "toAddress": mallory.address().0,
                "amount": 5.0,
                "privateKey": mallory.export_private_key(),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "UNAUTHORIZED");

        // Sender has nothing on chain
        let req = test::TestRequest::post()
            .uri("/api/blockchain/transactions")
            .set_json(json!({
                "fromAddress": alice.address().0,
                "toAddress": mallory.address().0,
                "amount": 5.0,
                "privateKey": alice.export_private_key(),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "INSUFFICIENT_BALANCE");

        // Missing fields
        let req = test::TestRequest::post()
            .uri("/api/blockchain/transactions")
            .set_json(json!({ "fromAddress": alice.address().0 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["code"], "BAD_REQUEST");

        // Malformed private key
        let req = test::TestRequest::post()
            .uri("/api/blockchain/transactions")
            .set_json(json!({
                "fromAddress": alice.address().0,
                "toAddress": mallory.address().0,
                "amount": 5.0,
                "privateKey": "nope",
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["code"], "INVALID_KEY");

        // Non-positive mint
        let req = test::TestRequest::post()
            .uri("/api/blockchain/mint")
            .set_json(json!({ "toAddress": alice.address().0, "amount": -1.0 }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["code"], "INVALID_TRANSACTION");

        // Mining without an address
        let req = test::TestRequest::post()
            .uri("/api/blockchain/mine")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_lookups() {
        let data = ledger();
        let app = app!(data);

        let genesis = data.get_latest_block();

        let req = test::TestRequest::get()
            .uri(&format!("/api/blockchain/blocks/{}", genesis.hash))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["previousHash"], "0");

        let req = test::TestRequest::get()
            .uri("/api/blockchain/blocks/unknown")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/blockchain/wallet/unknown")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/blockchain/balance/unknown")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["balance"], 0.0);

        let req = test::TestRequest::get()
            .uri("/api/blockchain/validate")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["isValid"], true);
        assert_eq!(body["data"]["chainLength"], 1);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
}
