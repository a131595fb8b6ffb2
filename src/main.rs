use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campusledger::config::Config;
use campusledger::core::directory::MySqlStudentDirectory;
use campusledger::middleware::RequestId;
use campusledger::modules::collections::controllers::collection_controller;
use campusledger::modules::collections::repositories::MySqlCollectionRepository;
use campusledger::modules::collections::services::CollectionService;
use campusledger::modules::health::controllers::health_controller;
use campusledger::modules::receipts::controllers::receipt_controller;
use campusledger::modules::receipts::repositories::MySqlReceiptRepository;
use campusledger::modules::receipts::services::ReceiptService;
use campusledger::modules::structures::controllers::structure_controller;
use campusledger::modules::structures::repositories::MySqlStructureRepository;
use campusledger::modules::structures::services::StructureService;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campusledger=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    tracing::info!("Starting CampusLedger fee ledger service");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Cancel cascade policy: {:?}", config.ledger.cancel_cascade_policy);

    // Create database connection pool
    let db_pool = config
        .database
        .create_pool()
        .await
        .expect("Failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    // Repositories
    let structure_repo = Arc::new(MySqlStructureRepository::new(db_pool.clone()));
    let collection_repo = Arc::new(MySqlCollectionRepository::new(db_pool.clone()));
    let receipt_repo = Arc::new(MySqlReceiptRepository::new(db_pool.clone()));
    let directory = Arc::new(MySqlStudentDirectory::new(db_pool.clone()));

    // Services
    let structure_service = Arc::new(StructureService::new(
        structure_repo.clone(),
        collection_repo.clone(),
    ));
    let collection_service = Arc::new(CollectionService::new(
        collection_repo.clone(),
        structure_repo.clone(),
        receipt_repo.clone(),
        directory,
        config.ledger.cancel_cascade_policy,
    ));
    let receipt_service = Arc::new(ReceiptService::new(
        receipt_repo,
        collection_repo,
        config.ledger.receipt_number_max_attempts,
    ));

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let workers = config.server.workers;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(structure_service.clone()))
            .app_data(web::Data::new(collection_service.clone()))
            .app_data(web::Data::new(receipt_service.clone()))
            .wrap(TracingLogger::default())
            .wrap(RequestId)
            .wrap(Cors::permissive())
            .configure(health_controller::configure)
            .configure(structure_controller::configure)
            .configure(collection_controller::configure)
            .configure(receipt_controller::configure)
    })
    .workers(workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await
}
