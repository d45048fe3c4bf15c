use tracing::{debug, info, warn};

use smarthub_common::{SlaveIdentity, SlaveKind, SlaveParams, StatusChange};

use crate::state::GatewayState;

pub fn list(state: &GatewayState, kind: SlaveKind) -> Vec<SlaveIdentity> {
    state.registry.partition(kind).snapshot()
}

pub fn list_devices(state: &GatewayState) -> Vec<SlaveIdentity> {
    list(state, SlaveKind::Device)
}

pub fn list_sensors(state: &GatewayState) -> Vec<SlaveIdentity> {
    list(state, SlaveKind::Sensor)
}

/// Set the status of the first slave holding `change.mac`, devices first.
/// Only the live entry changes; status is not persisted.
pub fn change_status(state: &GatewayState, change: &StatusChange) -> Option<SlaveKind> {
    let kind = SlaveKind::SEARCH_ORDER
        .into_iter()
        .find(|kind| state.registry.partition(*kind).update_status(&change.mac, change.status));
    match kind {
        Some(kind) => info!(mac = %change.mac, kind = %kind, status = %change.status, "status changed"),
        None => info!(mac = %change.mac, "status change for unknown slave"),
    }
    kind
}

/// Persist the new name, then apply it to the live entry. A store failure
/// leaves the live entry untouched. Renames of one MAC are serialised, so the
/// store and the registry always end on the same name.
pub async fn rename(state: &GatewayState, kind: SlaveKind, params: SlaveParams) -> bool {
    let partition = state.registry.partition(kind);
    let lock = partition.write_lock(&params.mac);
    let _guard = lock.lock().await;

    let Some(mut identity) = partition.get(&params.mac) else {
        info!(mac = %params.mac, kind = %kind, "rename of unregistered slave");
        return false;
    };
    identity.name = params.name;

    let cancel = state.persist_token();
    if let Err(e) = state.services.slaves.update(&identity, &cancel).await {
        warn!(mac = %identity.mac, kind = %kind, error = %e, "failed to persist rename");
        return false;
    }
    if !partition.update_name(&identity.mac, &identity.name) {
        debug!(mac = %identity.mac, kind = %kind, "slave left during rename, stored name kept");
    }
    true
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{state::ChannelId, test_support::TestHub},
        smarthub_common::SlaveStatus,
        smarthub_storage::SlaveRepository,
        tokio_util::sync::CancellationToken,
    };

    fn params(mac: &str, name: &str) -> SlaveParams {
        SlaveParams {
            mac: mac.into(),
            name: name.into(),
            status: SlaveStatus::Unknown,
        }
    }

    #[test]
    fn status_change_prefers_devices() {
        let hub = TestHub::new();
        let registry = &hub.state.registry;
        registry.partition(SlaveKind::Device).register(
            SlaveIdentity::new(SlaveKind::Device, "01", "Lamp"),
            ChannelId::from("a"),
        );
        registry.partition(SlaveKind::Sensor).register(
            SlaveIdentity::new(SlaveKind::Sensor, "01", "Thermo"),
            ChannelId::from("b"),
        );

        let change = StatusChange {
            mac: "01".into(),
            status: SlaveStatus::On,
        };
        assert_eq!(change_status(&hub.state, &change), Some(SlaveKind::Device));
        assert_eq!(list_devices(&hub.state)[0].status, SlaveStatus::On);
        assert_eq!(list_sensors(&hub.state)[0].status, SlaveStatus::Unknown);

        let missing = StatusChange {
            mac: "99".into(),
            status: SlaveStatus::Off,
        };
        assert_eq!(change_status(&hub.state, &missing), None);
    }

    #[tokio::test]
    async fn rename_persists_then_updates_live_entry() {
        let hub = TestHub::new();
        let token = CancellationToken::new();
        let lamp = SlaveIdentity::new(SlaveKind::Device, "01", "Lamp");
        hub.store.add(&lamp, &token).await.unwrap();
        hub.state
            .registry
            .partition(SlaveKind::Device)
            .register(lamp, ChannelId::from("a"));

        assert!(rename(&hub.state, SlaveKind::Device, params("01", "Porch")).await);
        assert_eq!(list_devices(&hub.state)[0].name, "Porch");
        let stored = hub
            .store
            .get(SlaveKind::Device, "01", &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Porch");
    }

    #[tokio::test]
    async fn rename_failure_leaves_live_entry() {
        let hub = TestHub::new();
        hub.state.registry.partition(SlaveKind::Sensor).register(
            SlaveIdentity::new(SlaveKind::Sensor, "07", "Thermo"),
            ChannelId::from("s"),
        );
        hub.store.fail_writes(true);

        assert!(!rename(&hub.state, SlaveKind::Sensor, params("07", "Attic")).await);
        assert_eq!(list_sensors(&hub.state)[0].name, "Thermo");
    }

    #[tokio::test]
    async fn rename_unknown_slave_touches_nothing() {
        let hub = TestHub::new();
        assert!(!rename(&hub.state, SlaveKind::Device, params("01", "Porch")).await);
        assert_eq!(hub.store.updates(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_renames_agree_with_store() {
        let hub = TestHub::new();
        let token = CancellationToken::new();
        let lamp = SlaveIdentity::new(SlaveKind::Device, "01", "Lamp");
        hub.store.add(&lamp, &token).await.unwrap();
        hub.state
            .registry
            .partition(SlaveKind::Device)
            .register(lamp, ChannelId::from("a"));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let state = std::sync::Arc::clone(&hub.state);
                tokio::spawn(async move {
                    rename(&state, SlaveKind::Device, params("01", &format!("name-{i}"))).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        let live = list_devices(&hub.state)[0].name.clone();
        let stored = hub
            .store
            .get(SlaveKind::Device, "01", &token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, live);
        assert_eq!(hub.store.updates(), 32);
    }

    #[tokio::test]
    async fn rename_released_by_shutdown_leaves_live_entry() {
        let hub = TestHub::new();
        let token = CancellationToken::new();
        let lamp = SlaveIdentity::new(SlaveKind::Device, "01", "Lamp");
        hub.store.add(&lamp, &token).await.unwrap();
        hub.state
            .registry
            .partition(SlaveKind::Device)
            .register(lamp, ChannelId::from("a"));
        hub.store.hang_writes(true);

        let state = std::sync::Arc::clone(&hub.state);
        let task = tokio::spawn(async move {
            rename(&state, SlaveKind::Device, params("01", "Porch")).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        hub.state.shutdown.cancel();

        assert!(!task.await.unwrap());
        assert_eq!(list_devices(&hub.state)[0].name, "Lamp");

        // The lock was released with the cancelled call.
        hub.store.hang_writes(false);
        let lock = hub.state.registry.partition(SlaveKind::Device).write_lock("01");
        assert!(lock.try_lock().is_ok());
    }
}
