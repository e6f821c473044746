use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use spw_ledger::api::{self, ApiDoc};
use spw_ledger::blockchain::{Blockchain, KeyStore, SledStorage};
use spw_ledger::config::{Config, FOUNDER_SEED_PHRASE};

// Open sled storage; `None` means the node runs in memory only
fn open_storage(config: &Config) -> Option<Arc<SledStorage>> {
    if !config.storage.enabled {
        info!("Storage disabled, running in memory");
        return None;
    }

    let data_dir = &config.storage.data_dir;

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match SledStorage::open(data_dir) {
        Ok(storage) => {
            info!("Opened blockchain storage at {}", data_dir.display());
            Some(Arc::new(storage))
        }
        Err(err) => {
            warn!("Failed to open blockchain storage: {}", err);
            warn!("Creating in-memory blockchain instead");
            None
        }
    }
}

fn initialize_blockchain(config: &Config, storage: Option<Arc<SledStorage>>) -> Blockchain {
    match storage {
        Some(storage) => Blockchain::with_storage(config.ledger.clone(), storage),
        None => Blockchain::new(config.ledger.clone()),
    }
}

// Saved wallets are reloaded; the founder wallet is always held so the
// genesis funds can be spent
fn initialize_key_store(
    config: &Config,
    storage: Option<Arc<SledStorage>>,
) -> anyhow::Result<KeyStore> {
    let key_store = match storage {
        Some(storage) => KeyStore::with_store(storage),
        None => KeyStore::new(),
    };
    let founder = key_store
        .restore_wallet(FOUNDER_SEED_PHRASE)
        .context("Failed to derive founder wallet")?;

    if founder.address() != &config.ledger.founder() {
        info!(
            "Genesis funds belong to {}, which is not held by this node",
            config.ledger.founder_address
        );
    }

    Ok(key_store)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().context("Failed to load configuration")?;

    let storage = open_storage(&config);
    let blockchain = web::Data::new(initialize_blockchain(&config, storage.clone()));
    let key_store = web::Data::new(initialize_key_store(&config, storage)?);

    info!(
        "Ledger ready: {} blocks, difficulty {}, mining reward {}, {} wallets held",
        blockchain.chain_len(),
        blockchain.difficulty(),
        blockchain.mining_reward(),
        key_store.addresses().len()
    );

    let bind = (config.server.host.clone(), config.server.port);
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    let app_blockchain = blockchain.clone();

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(app_blockchain.clone())
            .app_data(key_store.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)
    .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?
    .run()
    .await?;

    if blockchain.has_storage() {
        match blockchain.save_snapshot() {
            Ok(()) => info!("Saved ledger state on shutdown"),
            Err(err) => warn!("Failed to save ledger state on shutdown: {}", err),
        }
    }

    Ok(())
}
