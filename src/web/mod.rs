//! Web API module for the file server.
//!
//! A thin JSON adapter over the upload engine: bearer-token
//! authentication, directory permission checks and owner checks happen
//! here, and engine calls run on the blocking thread pool.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
