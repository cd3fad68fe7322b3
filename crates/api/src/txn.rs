//! Transaction coordination: at most one transaction per request.
//!
//! [`with_transaction`] owns the whole session lifecycle so handlers cannot
//! get it wrong: create -> begin -> handler -> commit (success) or abort
//! (failure) -> close, always. The handler's value is returned only after a
//! successful commit, so no response is ever observable before the data is
//! durable. There is no internal retry; a caller retries by issuing a fresh
//! request, which gets a fresh session.

use futures::future::BoxFuture;

use keygate_db::session::{Session, SessionFactory};

use crate::error::AppError;

/// Run `handler` inside a single transaction on a fresh session.
///
/// Failure handling:
/// - handler error: abort; an abort failure is logged and never overrides
///   the handler's error;
/// - commit error: the session lands in `Aborted` (the engine already rolled
///   back) and the commit error propagates;
/// - the session is closed in a final step regardless of outcome; close
///   failures are logged only.
///
/// Handlers are written as `|session: &mut PgSession| async move { ... }.boxed()`
/// using [`futures::FutureExt::boxed`].
pub async fn with_transaction<Fac, T, F>(factory: &Fac, handler: F) -> Result<T, AppError>
where
    Fac: SessionFactory,
    F: for<'a> FnOnce(&'a mut Fac::Session) -> BoxFuture<'a, Result<T, AppError>>,
{
    let mut session = factory.session().await?;
    session.begin().await?;

    let result = match handler(&mut session).await {
        Ok(value) => match session.commit().await {
            Ok(()) => Ok(value),
            Err(commit_err) => Err(commit_err.into()),
        },
        Err(handler_err) => {
            if let Err(abort_err) = session.abort().await {
                tracing::error!(error = %abort_err, "transaction abort failed");
            }
            Err(handler_err)
        }
    };

    if let Err(close_err) = session.close().await {
        tracing::warn!(error = %close_err, "session close failed");
    }

    result
}
