use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing::{error, info};

use metravel_quests::config::ServerConfig;
use metravel_quests::db::Database;
use metravel_quests::quest::{ProgressStore, QuestRegistry};
use metravel_quests::screen::{router, AppState};
use metravel_quests::storage::{KeyValueStore, MemoryStore};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not set up yet
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match config.log_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log directive '{}': {}", config.log_directive, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), String> {
    // Load quest catalog
    let registry = match &config.data_dir {
        Some(data_dir) => {
            let mut registry = QuestRegistry::new();
            registry.load_from_directory(data_dir)?;
            registry
        }
        None => QuestRegistry::builtin(),
    };
    info!(
        "Quest catalog ready: {} quests in {} cities",
        registry.len(),
        registry.cities().len()
    );

    // Open the progress backend
    let backend: Arc<dyn KeyValueStore> = if config.uses_memory_store() {
        info!("Using in-memory progress store, progress is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let db = Database::new(&config.database_url)
            .await
            .map_err(|e| format!("Failed to initialize database: {}", e))?;
        Arc::new(db)
    };
    let store = ProgressStore::open(backend, &config.storage_key).await;

    let state = AppState::new(Arc::new(registry), Arc::clone(&store));
    let mut app = router(state);
    if config.permissive_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| format!("Invalid bind address '{}': {}", config.bind_addr, e))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    info!("Quest server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    // Land any queued progress writes before exiting
    store.flush().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
