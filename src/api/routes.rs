use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(handlers::health))
        .service(
            web::scope("/api/blockchain")
                .route("/status", web::get().to(handlers::get_status))
                .route("/blocks", web::get().to(handlers::get_blocks))
                .route("/blocks/{hash}", web::get().to(handlers::get_block))
                .route("/mine", web::post().to(handlers::mine))
                .route("/balance/{address}", web::get().to(handlers::get_balance))
                .route("/wallet", web::post().to(handlers::create_wallet))
                .route("/wallet/{address}", web::get().to(handlers::get_wallet))
                .route("/transactions", web::post().to(handlers::new_transaction))
                .route("/transactions", web::get().to(handlers::get_transactions))
                .route(
                    "/transactions/pending",
                    web::get().to(handlers::get_pending_transactions),
                )
                .route("/mint", web::post().to(handlers::mint))
                .route("/validate", web::get().to(handlers::validate_chain)),
        );
}
