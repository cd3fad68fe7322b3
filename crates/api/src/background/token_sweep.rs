//! Periodic deletion of expired token records.
//!
//! Token rows are never deleted on the request path; revoked and expired
//! records pile up as issuance history until this sweep removes the ones
//! whose `expires_at` has passed. Runs on a fixed interval using
//! `tokio::time::interval`; request-time correctness never depends on it.

use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use keygate_db::repositories::{AccessTokenRepo, RefreshTokenRepo};
use keygate_db::session::{PgSession, PgSessionFactory};

use crate::txn::with_transaction;

/// How often the sweep runs by default.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600; // 1 hour

/// Run the token sweep loop until `cancel` is triggered.
pub async fn run(sessions: PgSessionFactory, cancel: CancellationToken) {
    let interval_secs: u64 = std::env::var("TOKEN_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    tracing::info!(interval_secs, "Token sweep job started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Token sweep job stopping");
                break;
            }
            _ = interval.tick() => {
                match sweep_once(&sessions).await {
                    Ok((access, refresh)) => {
                        if access + refresh > 0 {
                            tracing::info!(access, refresh, "Token sweep: purged expired records");
                        } else {
                            tracing::debug!("Token sweep: no rows to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Token sweep failed");
                    }
                }
            }
        }
    }
}

/// Delete expired rows from both token tables inside one transaction.
pub async fn sweep_once(
    sessions: &PgSessionFactory,
) -> Result<(u64, u64), crate::error::AppError> {
    let cutoff = Utc::now();
    with_transaction(sessions, move |session: &mut PgSession| {
        async move {
            let access = AccessTokenRepo::expire_sweep(session, cutoff).await?;
            let refresh = RefreshTokenRepo::expire_sweep(session, cutoff).await?;
            Ok((access, refresh))
        }
        .boxed()
    })
    .await
}
