//! Request-scoped transaction handles.
//!
//! A [`Session`] is a storage-engine transaction with a strictly linear
//! lifecycle: `Idle -> InTransaction -> Committed | Aborted -> Closed`.
//! Exactly one session serves one request; sessions are never pooled or
//! reused. Business logic depends only on the [`Session`] and
//! [`SessionFactory`] traits; [`PgSession`] is the PostgreSQL adapter.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// Lifecycle state of a [`Session`]. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InTransaction,
    Committed,
    Aborted,
    Closed,
}

/// Errors raised by session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A lifecycle method was called in a state that does not permit it.
    #[error("invalid session transition: cannot {op} while {from:?}")]
    InvalidTransition {
        op: &'static str,
        from: SessionState,
    },

    /// A repository asked for the transaction connection outside `begin`..`commit`.
    #[error("session is not in a transaction")]
    NotInTransaction,

    /// The storage engine rejected the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A storage-engine transaction handle scoped to exactly one request.
#[async_trait]
pub trait Session: Send {
    /// Open the transaction. Valid only from `Idle`.
    async fn begin(&mut self) -> Result<(), SessionError>;

    /// Commit the transaction. Valid only from `InTransaction`.
    ///
    /// On failure the engine has already rolled back, so the session lands
    /// in `Aborted` rather than `Committed`.
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Roll the transaction back. Valid only from `InTransaction`.
    async fn abort(&mut self) -> Result<(), SessionError>;

    /// Release the session. Valid from any state except `Closed`; a still
    /// open transaction is rolled back on release.
    async fn close(&mut self) -> Result<(), SessionError>;

    /// Current lifecycle state.
    fn state(&self) -> SessionState;
}

/// Produces one fresh session per write-requiring request.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    /// Create a new session in the `Idle` state.
    async fn session(&self) -> Result<Self::Session, SessionError>;
}

/// PostgreSQL-backed [`Session`] over a pooled `sqlx` transaction.
pub struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    state: SessionState,
}

impl PgSession {
    fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            state: SessionState::Idle,
        }
    }

    /// The live transaction connection, for repository queries.
    ///
    /// Fails with [`SessionError::NotInTransaction`] unless the session is
    /// between `begin` and `commit`/`abort`.
    pub fn conn(&mut self) -> Result<&mut PgConnection, SessionError> {
        match self.tx.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(SessionError::NotInTransaction),
        }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                op: "begin",
                from: self.state,
            });
        }
        self.tx = Some(self.pool.begin().await?);
        self.state = SessionState::InTransaction;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let Some(tx) = self.tx.take() else {
            return Err(SessionError::InvalidTransition {
                op: "commit",
                from: self.state,
            });
        };
        match tx.commit().await {
            Ok(()) => {
                self.state = SessionState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Aborted;
                Err(e.into())
            }
        }
    }

    async fn abort(&mut self) -> Result<(), SessionError> {
        let Some(tx) = self.tx.take() else {
            return Err(SessionError::InvalidTransition {
                op: "abort",
                from: self.state,
            });
        };
        self.state = SessionState::Aborted;
        tx.rollback().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::InvalidTransition {
                op: "close",
                from: self.state,
            });
        }
        if let Some(tx) = self.tx.take() {
            // Closing with an open transaction should not happen on the
            // normal coordinator path; roll back rather than leak it.
            tracing::warn!("session closed with an open transaction, rolling back");
            tx.rollback().await?;
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

/// [`SessionFactory`] handing out [`PgSession`]s over a shared pool.
#[derive(Clone)]
pub struct PgSessionFactory {
    pool: PgPool,
}

impl PgSessionFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    type Session = PgSession;

    async fn session(&self) -> Result<PgSession, SessionError> {
        Ok(PgSession::new(self.pool.clone()))
    }
}
