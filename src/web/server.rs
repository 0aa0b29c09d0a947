//! Web server for the upload API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::storage::FileStorage;
use crate::upload::UploadManager;
use crate::{FileServerError, Result};

use super::handlers::AppState;
use super::middleware::JwtState;
use super::router::{create_health_router, create_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// JWT state.
    jwt_state: Arc<JwtState>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(
        config: Arc<Config>,
        uploads: Arc<UploadManager>,
        storage: Arc<FileStorage>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| FileServerError::Config(format!("invalid server address: {e}")))?;
        let jwt_state = Arc::new(JwtState::new(&config.auth.jwt_secret));
        let app_state = Arc::new(AppState::new(config, uploads, storage));

        Ok(Self {
            addr,
            app_state,
            jwt_state,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the complete router.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.app_state), Arc::clone(&self.jwt_state))
            .merge(create_health_router())
    }

    /// Run the web server until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(host: &str) -> Arc<Config> {
        let mut config = Config::default();
        config.auth.jwt_secret = "secret".to_string();
        config.server.host = host.to_string();
        config.server.port = 0;
        Arc::new(config)
    }

    fn parts(dir: &TempDir) -> (Arc<UploadManager>, Arc<FileStorage>) {
        let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
        let uploads = Arc::new(UploadManager::new(
            dir.path(),
            vec!["public".to_string()],
            Default::default(),
        ));
        (uploads, storage)
    }

    #[test]
    fn test_new_server() {
        let dir = TempDir::new().unwrap();
        let (uploads, storage) = parts(&dir);
        let server = WebServer::new(config("127.0.0.1"), uploads, storage).unwrap();
        assert_eq!(server.addr().port(), 0);
    }

    #[test]
    fn test_invalid_address() {
        let dir = TempDir::new().unwrap();
        let (uploads, storage) = parts(&dir);
        let result = WebServer::new(config("not an address"), uploads, storage);
        assert!(matches!(result, Err(FileServerError::Config(_))));
    }
}
