use std::sync::Arc;

use tracing::{error, info};

use fileserver::{Config, FileStorage, Sweeper, UploadManager, WebServer};

#[tokio::main]
async fn main() {
    let config_path =
        std::env::var("FILESERVER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = fileserver::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        fileserver::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(Arc::new(config)).await {
        error!("File server stopped with error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Arc<Config>) -> fileserver::Result<()> {
    info!("fileserver starting");

    let storage = Arc::new(FileStorage::new(&config.storage.upload_path)?);
    storage.initialize_directories(&config.storage.directories)?;

    let uploads = Arc::new(UploadManager::from_config(&config.storage));
    if config.storage.restore_sessions_on_startup {
        let manager = Arc::clone(&uploads);
        let restored = tokio::task::spawn_blocking(move || manager.restore())
            .await
            .unwrap_or_default();
        info!("Restored {} upload session(s)", restored);
    }

    let sweeper = Sweeper::start(Arc::clone(&uploads), config.storage.cleanup_interval());

    let server = WebServer::new(Arc::clone(&config), uploads, storage)?;
    let result = server.run(shutdown_signal()).await;

    sweeper.shutdown().await;
    info!("fileserver stopped");

    result.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
