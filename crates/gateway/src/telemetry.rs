use {tokio::sync::RwLock, tracing::warn};

use smarthub_common::{TelemetryReading, TelemetryRecord};

use crate::state::GatewayState;

/// Append-only telemetry received since start-up. Unbounded.
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    records: RwLock<Vec<TelemetryRecord>>,
}

impl TelemetryBuffer {
    pub async fn push(&self, record: TelemetryRecord) {
        self.records.write().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.records.read().await.clone()
    }
}

/// Normalise to UTC, buffer, then persist. The buffered record stays even
/// if persisting fails; the return value reports the persist outcome.
pub async fn ingest(state: &GatewayState, reading: TelemetryReading) -> bool {
    let record = reading.into_record();
    state.telemetry.push(record.clone()).await;

    let cancel = state.persist_token();
    match state.services.telemetry.append(&record, &cancel).await {
        Ok(()) => true,
        Err(e) => {
            warn!(mac = %record.source_mac, error = %e, "failed to persist telemetry");
            false
        },
    }
}
