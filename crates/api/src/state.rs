use std::sync::Arc;

use keygate_db::session::PgSessionFactory;

use crate::auth::tokens::TokenService;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used for transaction-free reads.
    pub pool: keygate_db::DbPool,
    /// Hands out one session per write-requiring request.
    pub sessions: PgSessionFactory,
    /// Signs and verifies access/refresh tokens.
    pub tokens: TokenService,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Build state from a pool and configuration.
    pub fn new(pool: keygate_db::DbPool, config: ServerConfig) -> Self {
        Self {
            sessions: PgSessionFactory::new(pool.clone()),
            tokens: TokenService::new(config.tokens.clone()),
            pool,
            config: Arc::new(config),
        }
    }
}
