use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    smarthub_common::{SlaveIdentity, SlaveKind, TelemetryRecord},
    tokio::sync::RwLock,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::store::{SlaveRepository, StoreError, StoreResult, TelemetryRepository, cancellable};

/// In-process store. Nothing survives a restart.
///
/// Writes can be made to fail or hang, which is how the hub's
/// persistence-failure and cancellation paths are exercised.
#[derive(Default)]
pub struct MemoryStore {
    slaves: RwLock<HashMap<(SlaveKind, String), SlaveIdentity>>,
    telemetry: RwLock<Vec<TelemetryRecord>>,
    fail_writes: AtomicBool,
    hang_writes: AtomicBool,
    adds: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return `StoreError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write wait until its token is cancelled.
    pub fn hang_writes(&self, hang: bool) {
        self.hang_writes.store(hang, Ordering::SeqCst);
    }

    /// Number of successful `add` calls.
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    /// Number of `update` calls that changed a stored row.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub async fn telemetry_len(&self) -> usize {
        self.telemetry.read().await.len()
    }

    async fn before_write(&self) -> StoreResult<()> {
        if self.hang_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SlaveRepository for MemoryStore {
    async fn exists_by_mac(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        cancellable(cancel, async {
            let slaves = self.slaves.read().await;
            Ok::<_, StoreError>(slaves.contains_key(&(kind, mac.to_string())))
        })
        .await
    }

    async fn add(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            self.before_write().await?;
            let key = (slave.kind, slave.mac.clone());
            let mut slaves = self.slaves.write().await;
            if slaves.contains_key(&key) {
                return Err(StoreError::Unavailable(format!(
                    "{} {} already stored",
                    slave.kind, slave.mac
                )));
            }
            slaves.insert(key, slave.clone());
            self.adds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    async fn update(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            self.before_write().await?;
            let mut slaves = self.slaves.write().await;
            let Some(row) = slaves.get_mut(&(slave.kind, slave.mac.clone())) else {
                debug!(kind = %slave.kind, mac = %slave.mac, "update of missing slave row ignored");
                return Ok(());
            };
            row.name = slave.name.clone();
            row.status = slave.status;
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn get(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<SlaveIdentity>> {
        cancellable(cancel, async {
            let slaves = self.slaves.read().await;
            Ok::<_, StoreError>(slaves.get(&(kind, mac.to_string())).cloned())
        })
        .await
    }
}

#[async_trait]
impl TelemetryRepository for MemoryStore {
    async fn append(&self, record: &TelemetryRecord, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            self.before_write().await?;
            self.telemetry.write().await.push(record.clone());
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn recent(
        &self,
        source_mac: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<TelemetryRecord>> {
        cancellable(cancel, async {
            let telemetry = self.telemetry.read().await;
            Ok::<_, StoreError>(
                telemetry
                    .iter()
                    .rev()
                    .filter(|r| r.source_mac == source_mac)
                    .take(limit)
                    .cloned()
                    .collect(),
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::Utc, smarthub_common::SlaveStatus};

    #[tokio::test]
    async fn add_update_get() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        let device = SlaveIdentity::new(SlaveKind::Device, "11:22:33", "Boiler");

        store.add(&device, &token).await.unwrap();
        assert!(
            store
                .exists_by_mac(SlaveKind::Device, "11:22:33", &token)
                .await
                .unwrap()
        );

        let changed = device.clone().with_status(SlaveStatus::On);
        store.update(&changed, &token).await.unwrap();
        let row = store
            .get(SlaveKind::Device, "11:22:33", &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, SlaveStatus::On);
        assert_eq!((store.adds(), store.updates()), (1, 1));
    }

    #[tokio::test]
    async fn update_of_missing_row_changes_nothing() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        let device = SlaveIdentity::new(SlaveKind::Device, "11:22:33", "Boiler");

        store.update(&device, &token).await.unwrap();
        assert_eq!(store.updates(), 0);
        assert!(
            store
                .get(SlaveKind::Device, "11:22:33", &token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failing_writes_leave_state_untouched() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        store.fail_writes(true);

        let device = SlaveIdentity::new(SlaveKind::Device, "11:22:33", "Boiler");
        assert!(matches!(
            store.add(&device, &token).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(
            !store
                .exists_by_mac(SlaveKind::Device, "11:22:33", &token)
                .await
                .unwrap()
        );
        assert_eq!(store.adds(), 0);
    }

    #[tokio::test]
    async fn hanging_write_is_released_by_cancel() {
        let store = MemoryStore::new();
        store.hang_writes(true);
        let token = CancellationToken::new();
        let record = TelemetryRecord {
            source_mac: "AA:BB:CC".into(),
            value: 1.0,
            timestamp: Utc::now(),
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let res = store.append(&record, &token).await;
        assert!(matches!(res, Err(StoreError::Cancelled)));
        assert_eq!(store.telemetry_len().await, 0);
    }
}
