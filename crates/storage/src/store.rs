//! Persistence abstraction consumed by the hub core.

use std::future::Future;

use {
    async_trait::async_trait,
    smarthub_common::{SlaveIdentity, SlaveKind, TelemetryRecord},
    tokio_util::sync::CancellationToken,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store operation cancelled")]
    Cancelled,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Slave metadata, keyed by (kind, MAC).
///
/// Every call takes a cancellation token; backends abandon the operation and
/// return [`StoreError::Cancelled`] once it fires.
#[async_trait]
pub trait SlaveRepository: Send + Sync {
    async fn exists_by_mac(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool>;

    async fn add(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()>;

    /// Overwrite name and status of an existing row. Missing rows are left
    /// alone.
    async fn update(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()>;

    async fn get(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<SlaveIdentity>>;
}

/// Append-only telemetry history.
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    async fn append(&self, record: &TelemetryRecord, cancel: &CancellationToken)
    -> StoreResult<()>;

    /// Most recent records for a sensor, newest first.
    async fn recent(
        &self,
        source_mac: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<TelemetryRecord>>;
}

/// Race a store future against the cancellation token.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_token_lets_future_finish() {
        let token = CancellationToken::new();
        let res = cancellable(&token, async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[tokio::test]
    async fn fired_token_wins_over_pending_future() {
        let token = CancellationToken::new();
        token.cancel();
        let res: StoreResult<()> = cancellable(&token, std::future::pending()).await;
        assert!(matches!(res, Err(StoreError::Cancelled)));
    }
}
