//! Resilient Connection
//!
//! Session-scoped database access with bounded retry. One instance owns at
//! most one open connection; every logical operation holds the session for
//! its whole retry loop, so operations on one session never interleave.
//!
//! Failures are classified as transient (timeouts, network drops, lock
//! contention) or permanent. Transient failures are retried with exponential
//! backoff up to `RetryPolicy::max_retry_count` total attempts; permanent ones
//! propagate after the first attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::database::{Connector, DbConnection};
use crate::models::descriptor::ConnectionDescriptor;
use crate::models::settings::RetryPolicy;
use crate::utils::error::{AppError, AppResult};

/// Whether a failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Transient,
    Permanent,
}

impl FaultKind {
    /// Classify a failed attempt
    pub fn classify(err: &AppError) -> Self {
        match err {
            AppError::Connectivity(_) => FaultKind::Transient,
            AppError::Transaction { source } => Self::classify(source),
            AppError::RetryExhausted { .. } | AppError::Cancelled => FaultKind::Permanent,
            AppError::Sqlite(sqlite_err) => match sqlite_fault(sqlite_err) {
                Some(kind) => kind,
                None => Self::from_error_message(&err.to_string()),
            },
            other => Self::from_error_message(&other.to_string()),
        }
    }

    /// Classify from a driver message
    pub fn from_error_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
            FaultKind::Transient
        } else if msg_lower.contains("network")
            || msg_lower.contains("connection was closed")
            || msg_lower.contains("connection reset")
            || msg_lower.contains("broken pipe")
            || msg_lower.contains("transport-level")
        {
            FaultKind::Transient
        } else if msg_lower.contains("deadlock") {
            FaultKind::Transient
        } else {
            FaultKind::Permanent
        }
    }
}

fn sqlite_fault(err: &rusqlite::Error) -> Option<FaultKind> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked
            | rusqlite::ErrorCode::SystemIoFailure
            | rusqlite::ErrorCode::CannotOpen => Some(FaultKind::Transient),
            _ => None,
        },
        _ => None,
    }
}

/// One failed attempt, kept only for logging
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub index: u32,
    pub last_error: String,
    pub kind: FaultKind,
    pub delay: Option<Duration>,
}

/// Exclusive handle to the session's open connection
pub type ConnectionLease<'a, T> = MappedMutexGuard<'a, T>;

/// Database session with bounded retry
pub struct ResilientConnection<C: Connector> {
    connector: Arc<C>,
    descriptor: ConnectionDescriptor,
    policy: RetryPolicy,
    slot: Mutex<Option<C::Connection>>,
}

impl<C: Connector> ResilientConnection<C> {
    pub fn new(connector: Arc<C>, descriptor: ConnectionDescriptor, policy: RetryPolicy) -> Self {
        Self {
            connector,
            descriptor,
            policy,
            slot: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Whether a connection is currently open. Returns false while another
    /// operation holds the session.
    pub fn is_open(&self) -> bool {
        self.slot.try_lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Return the open connection, opening one under the retry policy if
    /// needed. The session stays locked for as long as the lease is held.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> AppResult<ConnectionLease<'_, C::Connection>> {
        let mut slot = self.slot.lock().await;
        let noop = Arc::new(|_: &mut C::Connection| -> AppResult<()> { Ok(()) });
        self.retry_loop(&mut slot, cancel, "acquire", noop).await?;
        MutexGuard::try_map(slot, |conn| conn.as_mut())
            .map_err(|_| AppError::internal("connection slot empty after acquire"))
    }

    /// Run `op` against the session's connection, retrying transient
    /// failures. `op` may run several times and should be idempotent.
    pub async fn run_with_retry<T, F>(&self, cancel: &CancellationToken, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut C::Connection) -> AppResult<T> + Send + Sync + 'static,
    {
        let mut slot = self.slot.lock().await;
        self.retry_loop(&mut slot, cancel, "run_with_retry", Arc::new(op)).await
    }

    /// Run `op` inside a transaction. Any failure rolls the transaction back
    /// and surfaces as `AppError::Transaction`; a transient failure retries
    /// the whole transaction.
    pub async fn run_in_transaction<T, F>(&self, cancel: &CancellationToken, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut C::Connection) -> AppResult<T> + Send + Sync + 'static,
    {
        let work = Arc::new(move |conn: &mut C::Connection| -> AppResult<T> {
            conn.begin()?;
            let outcome = op(conn).and_then(|value| conn.commit().map(|_| value));
            match outcome {
                Ok(value) => Ok(value),
                Err(err) => {
                    if let Err(rollback_err) = conn.rollback() {
                        warn!("[ResilientConnection] Rollback failed: {}", rollback_err);
                    }
                    Err(AppError::transaction(err))
                }
            }
        });

        let mut slot = self.slot.lock().await;
        self.retry_loop(&mut slot, cancel, "run_in_transaction", work).await
    }

    /// Drop the open connection, if any
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            info!("[ResilientConnection] Connection closed");
        }
    }

    async fn retry_loop<T, F>(
        &self,
        slot: &mut Option<C::Connection>,
        cancel: &CancellationToken,
        operation: &'static str,
        work: Arc<F>,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut C::Connection) -> AppResult<T> + Send + Sync + 'static,
    {
        let max_attempts = self.policy.max_retry_count.max(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            attempt += 1;

            let outcome = match self.ensure_open(slot, cancel).await {
                Ok(()) => self.run_blocking(slot, cancel, work.clone()).await,
                Err(err) => Err(err),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "[ResilientConnection] {} succeeded on attempt {}",
                            operation, attempt
                        );
                    }
                    return Ok(value);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => err,
            };

            let kind = FaultKind::classify(&err);
            let retry = kind == FaultKind::Transient && attempt < max_attempts;
            let record = ConnectionAttempt {
                index: attempt,
                last_error: err.to_string(),
                kind,
                delay: retry.then(|| self.policy.backoff_delay(attempt)),
            };
            debug!("[ResilientConnection] {} attempt failed: {:?}", operation, record);

            if kind == FaultKind::Permanent {
                return Err(err);
            }

            // Transient failures leave the connection in an unknown state
            slot.take();

            let Some(delay) = record.delay else {
                warn!(
                    "[ResilientConnection] {} exhausted {} attempts: {}",
                    operation, attempt, record.last_error
                );
                return Err(AppError::retry_exhausted(attempt, err));
            };

            warn!(
                "[ResilientConnection] {} attempt {}/{} failed, retrying in {:?}: {}",
                operation, attempt, max_attempts, delay, record.last_error
            );
            sleep_or_cancel(cancel, delay).await?;
        }
    }

    async fn ensure_open(
        &self,
        slot: &mut Option<C::Connection>,
        cancel: &CancellationToken,
    ) -> AppResult<()> {
        if slot.is_some() {
            return Ok(());
        }

        let connector = self.connector.clone();
        let descriptor = self.descriptor.clone();
        let policy = self.policy.clone();
        let timeout = self.policy.connection_timeout();
        let handle =
            tokio::task::spawn_blocking(move || connector.connect(&descriptor, &policy));

        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            joined = tokio::time::timeout(timeout, handle) => match joined {
                Err(_) => {
                    return Err(AppError::connectivity(format!(
                        "connection timeout after {:?}",
                        timeout
                    )))
                }
                Ok(Err(join_err)) => {
                    return Err(AppError::internal(format!("connect task failed: {}", join_err)))
                }
                Ok(Ok(result)) => result?,
            },
        };

        debug!(
            "[ResilientConnection] Opened connection to {}/{}",
            self.descriptor.server, self.descriptor.database
        );
        *slot = Some(conn);
        Ok(())
    }

    async fn run_blocking<T, F>(
        &self,
        slot: &mut Option<C::Connection>,
        cancel: &CancellationToken,
        work: Arc<F>,
    ) -> AppResult<T>
    where
        T: Send + 'static,
        F: Fn(&mut C::Connection) -> AppResult<T> + Send + Sync + 'static,
    {
        let mut conn = slot
            .take()
            .ok_or_else(|| AppError::internal("no open connection"))?;
        let timeout = self.policy.command_timeout();
        let handle = tokio::task::spawn_blocking(move || {
            let result = work(&mut conn);
            (conn, result)
        });

        // On cancel or timeout the blocking task is abandoned and the
        // connection is dropped when it finishes.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            joined = tokio::time::timeout(timeout, handle) => match joined {
                Err(_) => Err(AppError::connectivity(format!(
                    "command timeout after {:?}",
                    timeout
                ))),
                Ok(Err(join_err)) => Err(AppError::internal(format!(
                    "database task failed: {}",
                    join_err
                ))),
                Ok(Ok((conn, result))) => {
                    *slot = Some(conn);
                    result
                }
            },
        }
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> AppResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
