use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::config::LedgerConfig;
use pow_ledger::{api, blockchain};

// Open the ledger from the configured data directory, falling back to memory
fn initialize_blockchain(config: &LedgerConfig) -> blockchain::Blockchain {
    if config.data_dir.is_empty() {
        info!("No data directory configured, using an in-memory ledger");
        return blockchain::Blockchain::new(config.difficulty, config.mining_reward);
    }

    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        warn!("Failed to create data directory: {}", err);
    }

    match blockchain::Blockchain::with_storage(
        &config.data_dir,
        config.difficulty,
        config.mining_reward,
    ) {
        Ok(blockchain) => {
            info!("Opened ledger storage at {}", config.data_dir);
            blockchain
        }
        Err(err) => {
            warn!("Failed to open ledger storage: {}", err);
            warn!("Creating in-memory ledger instead");
            blockchain::Blockchain::new(config.difficulty, config.mining_reward)
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_status,
        api::handlers::get_blocks,
        api::handlers::get_block,
        api::handlers::mine,
        api::handlers::get_balance,
        api::handlers::create_wallet,
        api::handlers::get_wallet,
        api::handlers::new_transaction,
        api::handlers::get_transactions,
        api::handlers::get_pending_transactions,
        api::handlers::mint,
        api::handlers::validate_chain
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionKind,
            blockchain::LedgerStats,
            blockchain::WalletInfo,
            blockchain::crypto::Address,
            blockchain::crypto::DigitalSignature,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::MintRequest,
            api::handlers::CreateWalletResponse,
            api::handlers::BalanceResponse,
            api::handlers::ValidateResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger API")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "Signed transfers, minting and proof-of-work mining over a single ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = LedgerConfig::load()?;
    info!(
        "Ledger difficulty {}, mining reward {}",
        config.difficulty, config.mining_reward
    );

    // One ledger per process, shared with every worker through app data
    let blockchain = web::Data::new(initialize_blockchain(&config));

    info!(
        "Starting HTTP server at http://{}:{}",
        config.host, config.port
    );

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
