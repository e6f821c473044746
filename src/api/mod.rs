// API module
//
// This module contains the HTTP API for the ledger and the node's key store

pub mod handlers;
pub mod routes;
pub mod schema;

use utoipa::OpenApi;

use crate::blockchain;

// Re-export main components for easier access
pub use routes::configure_routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_chain,
        handlers::get_latest_block,
        handlers::get_pending_transactions,
        handlers::new_transaction,
        handlers::submit_transaction,
        handlers::mine_block,
        handlers::validate_chain,
        handlers::create_wallet,
        handlers::restore_wallet,
        handlers::get_wallet_balance,
        handlers::get_wallets
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::crypto::Address,
            blockchain::crypto::PublicKey,
            blockchain::crypto::DigitalSignature,
            schema::ErrorResponse,
            handlers::ChainResponse,
            handlers::TransactionRequest,
            handlers::TransactionResponse,
            handlers::MineRequest,
            handlers::MineResponse,
            handlers::ValidationResponse,
            handlers::WalletResponse,
            handlers::RestoreWalletRequest,
            handlers::BalanceResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "SPW Ledger API",
        version = "1.0.0",
        description = "A single-node proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
