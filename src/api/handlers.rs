use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::str::FromStr;

use super::schema::{bad_request, internal_error, ledger_error_response, ErrorResponse};
use crate::blockchain::{Address, Block, Blockchain, KeyStore, LedgerError, Transaction, Wallet};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Wallets whose keys the node holds
pub type KeyStoreData = web::Data<KeyStore>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address; its wallet must be held by the node
    pub sender: String,

    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Response for the transaction endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The index of the block that will include this transaction
    pub block_index: u64,

    /// The accepted transaction
    pub transaction: Transaction,
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The miner's address
    pub miner_address: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidationResponse {
    pub is_valid: bool,

    /// The first integrity failure, if any
    pub violation: Option<String>,
}

/// Response for the wallet endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: Address,

    /// The wallet's verifying key (base58)
    pub public_key: String,

    /// The seed phrase; anyone holding it controls the wallet
    pub seed_phrase: String,
}

impl From<&Wallet> for WalletResponse {
    fn from(wallet: &Wallet) -> Self {
        WalletResponse {
            address: wallet.address().clone(),
            public_key: wallet.public_key().0,
            seed_phrase: wallet.seed_phrase().to_string(),
        }
    }
}

/// Request for the restore wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RestoreWalletRequest {
    pub seed_phrase: String,
}

/// Balance of one address
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: Address,

    /// Balance replayed from committed blocks
    pub balance: f64,

    /// Outgoing amounts still waiting in the pending pool
    pub pending_outflow: f64,

    /// Balance minus pending outflow
    pub spendable: f64,
}

impl BalanceResponse {
    fn for_address(blockchain: &Blockchain, address: Address) -> Self {
        let balance = blockchain.balance_of(&address);
        let pending_outflow = blockchain.pending_outflow(&address);

        BalanceResponse {
            address,
            balance,
            pending_outflow,
            spendable: balance - pending_outflow,
        }
    }
}

fn parse_address(value: &str) -> Result<Address, HttpResponse> {
    Address::from_str(value).map_err(|err| bad_request(err.to_string()))
}

/// Get the full blockchain
///
/// Returns the entire blockchain and its validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(blockchain: BlockchainData) -> impl Responder {
    let chain = blockchain.get_chain();
    let is_valid = blockchain.is_valid();

    let response = ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    };

    HttpResponse::Ok().json(response)
}

/// Get the latest block
#[utoipa::path(
    get,
    path = "/api/v1/chain/latest",
    responses(
        (status = 200, description = "Latest block retrieved successfully", body = Block)
    )
)]
pub async fn get_latest_block(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.latest_block())
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(blockchain: BlockchainData) -> impl Responder {
    let transactions = blockchain.get_pending_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Create a new transaction
///
/// Signs a transfer with a wallet held by the node and adds it to the
/// pending transactions. The amount may not exceed the sender's spendable
/// balance.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction created", body = TransactionResponse),
        (status = 400, description = "Invalid data or insufficient funds", body = ErrorResponse),
        (status = 404, description = "No wallet held for the sender", body = ErrorResponse),
        (status = 409, description = "Ledger halted", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    blockchain: BlockchainData,
    key_store: KeyStoreData,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let sender = match parse_address(&transaction_req.sender) {
        Ok(address) => address,
        Err(response) => return response,
    };
    let recipient = match parse_address(&transaction_req.recipient) {
        Ok(address) => address,
        Err(response) => return response,
    };

    let amount = transaction_req.amount;
    match key_store.submit_transfer(&blockchain, &sender, &recipient, amount) {
        Ok((transaction, block_index)) => accepted(transaction, block_index),
        Err(err) => ledger_error_response(&err),
    }
}

/// Submit a signed transaction
///
/// Adds a transaction signed by the client to the pending transactions
#[utoipa::path(
    post,
    path = "/api/v1/transactions/submit",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction accepted", body = TransactionResponse),
        (status = 400, description = "Invalid transaction or signature", body = ErrorResponse),
        (status = 409, description = "Already submitted, or ledger halted", body = ErrorResponse)
    )
)]
pub async fn submit_transaction(
    blockchain: BlockchainData,
    transaction: web::Json<Transaction>,
) -> impl Responder {
    let transaction = transaction.into_inner();

    match blockchain.submit_transaction(transaction.clone()) {
        Ok(block_index) => accepted(transaction, block_index),
        Err(err) => ledger_error_response(&err),
    }
}

fn accepted(transaction: Transaction, block_index: u64) -> HttpResponse {
    let response = TransactionResponse {
        message: format!("Transaction will be added to Block {}", block_index),
        block_index,
        transaction,
    };

    HttpResponse::Created().json(response)
}

/// Mine a new block
///
/// Creates a new block with all pending transactions
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Invalid miner address", body = ErrorResponse),
        (status = 409, description = "Nothing to mine, or ledger halted", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(
    blockchain: BlockchainData,
    mine_req: web::Json<MineRequest>,
) -> impl Responder {
    let miner_address = match parse_address(&mine_req.miner_address) {
        Ok(address) => address,
        Err(response) => return response,
    };

    // The nonce search is CPU bound; keep it off the async workers
    let ledger = blockchain.get_ref().clone();
    let result = web::block(move || ledger.mine(&miner_address)).await;

    match result {
        Ok(Ok(block)) => {
            info!("Block {} mined through the API", block.index);

            let response = MineResponse {
                message: "New Block Mined".to_string(),
                block,
            };

            HttpResponse::Ok().json(response)
        }
        Ok(Err(err)) => ledger_error_response(&err),
        Err(err) => {
            error!("Mining task failed: {}", err);
            internal_error(format!("Failed to mine block: {}", err))
        }
    }
}

/// Check if the blockchain is valid
///
/// Validates the entire blockchain. A failure halts the ledger.
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidationResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let response = match blockchain.validate() {
        Ok(()) => ValidationResponse {
            is_valid: true,
            violation: None,
        },
        Err(LedgerError::ChainIntegrityViolation(violation)) => ValidationResponse {
            is_valid: false,
            violation: Some(violation.to_string()),
        },
        Err(err) => return ledger_error_response(&err),
    };

    HttpResponse::Ok().json(response)
}

/// Create a new wallet
///
/// Creates a wallet from a fresh seed phrase and keeps its keys on the node
///
/// The seed phrase must be stored by your own
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_wallet(key_store: KeyStoreData) -> impl Responder {
    match key_store.create_wallet() {
        Ok(wallet) => HttpResponse::Created().json(WalletResponse::from(&wallet)),
        Err(err) => internal_error(format!("Failed to create wallet: {}", err)),
    }
}

/// Restore a wallet
///
/// Re-derives a wallet from its seed phrase and keeps its keys on the node
#[utoipa::path(
    post,
    path = "/api/v1/wallet/restore",
    request_body = RestoreWalletRequest,
    responses(
        (status = 200, description = "Wallet restored successfully", body = WalletResponse),
        (status = 400, description = "Invalid seed phrase", body = ErrorResponse)
    )
)]
pub async fn restore_wallet(
    key_store: KeyStoreData,
    restore_req: web::Json<RestoreWalletRequest>,
) -> impl Responder {
    match key_store.restore_wallet(&restore_req.seed_phrase) {
        Ok(wallet) => HttpResponse::Ok().json(WalletResponse::from(&wallet)),
        Err(err) => bad_request(format!("Failed to restore wallet: {}", err)),
    }
}

/// Get wallet balance
///
/// Returns the balance of any address, held by the node or not
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance/{address}",
    params(
        ("address" = String, Path, description = "Address in SPW-xxxxxxxx-xxxxxxxx-xxxxxxxx form")
    ),
    responses(
        (status = 200, description = "Wallet balance", body = BalanceResponse),
        (status = 400, description = "Invalid address", body = ErrorResponse)
    )
)]
pub async fn get_wallet_balance(
    blockchain: BlockchainData,
    address: web::Path<String>,
) -> impl Responder {
    let wallet_address = match parse_address(&address) {
        Ok(address) => address,
        Err(response) => return response,
    };

    HttpResponse::Ok().json(BalanceResponse::for_address(&blockchain, wallet_address))
}

/// Get all wallets
///
/// Returns the balances of every wallet held by the node
#[utoipa::path(
    get,
    path = "/api/v1/wallets",
    responses(
        (status = 200, description = "Wallets retrieved successfully", body = Vec<BalanceResponse>)
    )
)]
pub async fn get_wallets(blockchain: BlockchainData, key_store: KeyStoreData) -> impl Responder {
    let wallets: Vec<BalanceResponse> = key_store
        .addresses()
        .into_iter()
        .map(|address| BalanceResponse::for_address(&blockchain, address))
        .collect();

    HttpResponse::Ok().json(wallets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::config::{LedgerConfig, FOUNDER_SEED_PHRASE};
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn state() -> (BlockchainData, KeyStoreData, Wallet) {
        let blockchain = Blockchain::new(LedgerConfig {
            difficulty: 1,
            ..LedgerConfig::default()
        });
        let key_store = KeyStore::new();
        let founder = key_store.restore_wallet(FOUNDER_SEED_PHRASE).unwrap();

        (web::Data::new(blockchain), web::Data::new(key_store), founder)
    }

    #[actix_web::test]
    async fn test_transfer_then_mine() {
        let (blockchain, key_store, founder) = state();
        let recipient = Wallet::from_seed_phrase("bravo").unwrap();
        let miner = Wallet::from_seed_phrase("miner").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(blockchain.clone())
                .app_data(key_store.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                sender: founder.address().to_string(),
                recipient: recipient.address().to_string(),
                amount: 10.0,
            })
            .to_request();
        let resp: TransactionResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.block_index, 1);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(MineRequest {
                miner_address: miner.address().to_string(),
            })
            .to_request();
        let resp: MineResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.block.index, 1);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallet/balance/{}", recipient.address()))
            .to_request();
        let resp: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.balance, 10.0);
        assert_eq!(blockchain.balance_of(miner.address()), 100.0);
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let (blockchain, key_store, founder) = state();
        let stranger = Wallet::from_seed_phrase("stranger").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(blockchain.clone())
                .app_data(key_store.clone())
                .configure(configure_routes),
        )
        .await;

        // Empty pool
        let req = test::TestRequest::post()
            .uri("/api/v1/mine")
            .set_json(MineRequest {
                miner_address: founder.address().to_string(),
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        // Malformed address
        let req = test::TestRequest::get()
            .uri("/api/v1/wallet/balance/not-an-address")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        // Sender not held by the node
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                sender: stranger.address().to_string(),
                recipient: founder.address().to_string(),
                amount: 1.0,
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        // Overspend
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                sender: founder.address().to_string(),
                recipient: stranger.address().to_string(),
                amount: 5000.0,
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        // Negative amount
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(TransactionRequest {
                sender: founder.address().to_string(),
                recipient: stranger.address().to_string(),
                amount: -5.0,
            })
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        assert!(blockchain.get_pending_transactions().is_empty());
    }

    #[actix_web::test]
    async fn test_submit_signed_transaction() {
        let (blockchain, key_store, founder) = state();
        let recipient = Wallet::from_seed_phrase("bravo").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(blockchain.clone())
                .app_data(key_store)
                .configure(configure_routes),
        )
        .await;

        let mut transaction =
            Transaction::new(founder.address().clone(), recipient.address().clone(), 3.0);
        transaction.sign(&founder).unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/submit")
            .set_json(&transaction)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        // Posting it again is a replay
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/submit")
            .set_json(&transaction)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        // The same transaction with its amount changed no longer verifies
        transaction.amount = 300.0;
        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/submit")
            .set_json(&transaction)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(blockchain.get_pending_transactions().len(), 1);
    }

    #[actix_web::test]
    async fn test_wallet_endpoints() {
        let (blockchain, key_store, founder) = state();

        let app = test::init_service(
            App::new()
                .app_data(blockchain)
                .app_data(key_store.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/wallet/new").to_request();
        let created: WalletResponse = test::call_and_read_body_json(&app, req).await;
        assert!(key_store.contains(&created.address));

        let req = test::TestRequest::post()
            .uri("/api/v1/wallet/restore")
            .set_json(RestoreWalletRequest {
                seed_phrase: created.seed_phrase.clone(),
            })
            .to_request();
        let restored: WalletResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(restored.address, created.address);

        let req = test::TestRequest::get().uri("/api/v1/wallets").to_request();
        let wallets: Vec<BalanceResponse> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(wallets.len(), 2);

        let founder_entry = wallets
            .iter()
            .find(|entry| &entry.address == founder.address())
            .unwrap();
        assert_eq!(founder_entry.balance, 1000.0);
    }
}
