use std::sync::Arc;

use {
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::sync::Mutex,
};

use smarthub_common::{SlaveIdentity, SlaveKind, SlaveStatus};

use crate::state::ChannelId;

/// A registered slave and the channel it is reachable through.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub identity: SlaveIdentity,
    pub channel: ChannelId,
}

// ── Partition ────────────────────────────────────────────────────────────────

/// One kind's slaves, keyed by MAC.
///
/// Operations on different MACs never wait on each other; operations on the
/// same MAC are serialised by the map's shard lock.
#[derive(Debug, Default)]
pub struct Partition {
    entries: DashMap<String, RegistryEntry>,
    /// Per-MAC locks for updates that span a store write.
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl Partition {
    /// Insert only if the MAC is absent. The first registration wins; a
    /// second one for a live MAC is rejected and the existing channel kept.
    pub fn register(&self, identity: SlaveIdentity, channel: ChannelId) -> bool {
        match self.entries.entry(identity.mac.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RegistryEntry { identity, channel });
                true
            },
        }
    }

    /// Remove one entry bound to `channel`, returning its MAC.
    pub fn unregister_by_channel(&self, channel: &ChannelId) -> Option<String> {
        loop {
            let mac = self
                .entries
                .iter()
                .find(|e| &e.channel == channel)
                .map(|e| e.key().clone())?;
            // The entry may have been replaced between the scan and the remove.
            if self
                .entries
                .remove_if(&mac, |_, e| &e.channel == channel)
                .is_some()
            {
                return Some(mac);
            }
        }
    }

    /// Lock serialising store-then-registry updates of one MAC. Held across
    /// the store call, so two such updates of a MAC apply in the same order
    /// to both.
    pub fn write_lock(&self, mac: &str) -> Arc<Mutex<()>> {
        self.writers.entry(mac.to_string()).or_default().clone()
    }

    pub fn lookup_channel(&self, mac: &str) -> Option<ChannelId> {
        self.entries.get(mac).map(|e| e.channel.clone())
    }

    pub fn get(&self, mac: &str) -> Option<SlaveIdentity> {
        self.entries.get(mac).map(|e| e.identity.clone())
    }

    pub fn contains(&self, mac: &str) -> bool {
        self.entries.contains_key(mac)
    }

    /// Replace the status only. False if the MAC is not registered.
    pub fn update_status(&self, mac: &str, status: SlaveStatus) -> bool {
        match self.entries.get_mut(mac) {
            Some(mut entry) => {
                entry.identity.status = status;
                true
            },
            None => false,
        }
    }

    /// Replace the name only. False if the MAC is not registered.
    pub fn update_name(&self, mac: &str, name: &str) -> bool {
        match self.entries.get_mut(mac) {
            Some(mut entry) => {
                entry.identity.name = name.to_string();
                true
            },
            None => false,
        }
    }

    /// Point-in-time copy of every identity, ordered by MAC.
    pub fn snapshot(&self) -> Vec<SlaveIdentity> {
        let mut list: Vec<_> = self.entries.iter().map(|e| e.identity.clone()).collect();
        list.sort_by(|a, b| a.mac.cmp(&b.mac));
        list
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Device and sensor partitions. A MAC is unique within a kind, not across.
#[derive(Debug, Default)]
pub struct SlaveRegistry {
    devices: Partition,
    sensors: Partition,
}

impl SlaveRegistry {
    pub fn partition(&self, kind: SlaveKind) -> &Partition {
        match kind {
            SlaveKind::Device => &self.devices,
            SlaveKind::Sensor => &self.sensors,
        }
    }

    /// Resolve a MAC without a kind: devices first, then sensors.
    pub fn locate(&self, mac: &str) -> Option<(SlaveKind, ChannelId)> {
        SlaveKind::SEARCH_ORDER.into_iter().find_map(|kind| {
            self.partition(kind)
                .lookup_channel(mac)
                .map(|channel| (kind, channel))
        })
    }

    /// Drop every entry bound to `channel`, devices first.
    pub fn unregister_channel(&self, channel: &ChannelId) -> Vec<(SlaveKind, String)> {
        let mut removed = Vec::new();
        for kind in SlaveKind::SEARCH_ORDER {
            let partition = self.partition(kind);
            while let Some(mac) = partition.unregister_by_channel(channel) {
                removed.push((kind, mac));
            }
        }
        removed
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(mac: &str) -> SlaveIdentity {
        SlaveIdentity::new(SlaveKind::Device, mac, "Lamp")
    }

    #[test]
    fn distinct_macs_grow_the_partition() {
        let partition = Partition::default();
        assert!(partition.register(device("01"), ChannelId::from("a")));
        assert!(partition.register(device("02"), ChannelId::from("b")));
        assert_eq!(partition.len(), 2);
    }

    #[test]
    fn duplicate_registration_keeps_first_channel() {
        let partition = Partition::default();
        assert!(partition.register(device("01"), ChannelId::from("a")));
        assert!(!partition.register(device("01"), ChannelId::from("b")));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.lookup_channel("01"), Some(ChannelId::from("a")));
    }

    #[test]
    fn unregister_removes_only_the_bound_entry() {
        let partition = Partition::default();
        partition.register(device("01"), ChannelId::from("a"));
        partition.register(device("02"), ChannelId::from("b"));

        assert_eq!(
            partition.unregister_by_channel(&ChannelId::from("a")),
            Some("01".to_string())
        );
        assert_eq!(partition.unregister_by_channel(&ChannelId::from("a")), None);
        assert_eq!(partition.len(), 1);
        assert!(partition.contains("02"));
    }

    #[test]
    fn status_update_leaves_other_fields_alone() {
        let partition = Partition::default();
        partition.register(device("01"), ChannelId::from("a"));

        assert!(partition.update_status("01", SlaveStatus::On));
        let identity = partition.get("01").unwrap();
        assert_eq!(identity.status, SlaveStatus::On);
        assert_eq!(identity.name, "Lamp");
        assert_eq!(identity.kind, SlaveKind::Device);
        assert_eq!(partition.lookup_channel("01"), Some(ChannelId::from("a")));

        assert!(!partition.update_status("99", SlaveStatus::Off));
    }

    #[test]
    fn name_update_leaves_status_alone() {
        let partition = Partition::default();
        partition.register(device("01").with_status(SlaveStatus::Off), ChannelId::from("a"));

        assert!(partition.update_name("01", "Porch"));
        let identity = partition.get("01").unwrap();
        assert_eq!(identity.name, "Porch");
        assert_eq!(identity.status, SlaveStatus::Off);
        assert!(!partition.update_name("99", "Nope"));
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let partition = Partition::default();
        partition.register(device("02"), ChannelId::from("b"));
        partition.register(device("01"), ChannelId::from("a"));

        let snapshot = partition.snapshot();
        partition.update_name("01", "Changed");
        assert_eq!(
            snapshot.iter().map(|s| s.mac.as_str()).collect::<Vec<_>>(),
            ["01", "02"]
        );
        assert_eq!(snapshot[0].name, "Lamp");
    }

    #[test]
    fn same_mac_in_both_partitions() {
        let registry = SlaveRegistry::default();
        let sensor = SlaveIdentity::new(SlaveKind::Sensor, "01", "Thermo");
        assert!(registry.partition(SlaveKind::Device).register(device("01"), ChannelId::from("a")));
        assert!(registry.partition(SlaveKind::Sensor).register(sensor, ChannelId::from("b")));

        assert_eq!(
            registry.locate("01"),
            Some((SlaveKind::Device, ChannelId::from("a")))
        );
        assert_eq!((registry.device_count(), registry.sensor_count()), (1, 1));
    }

    #[test]
    fn locate_falls_back_to_sensors() {
        let registry = SlaveRegistry::default();
        let sensor = SlaveIdentity::new(SlaveKind::Sensor, "07", "Thermo");
        registry.partition(SlaveKind::Sensor).register(sensor, ChannelId::from("s"));

        assert_eq!(
            registry.locate("07"),
            Some((SlaveKind::Sensor, ChannelId::from("s")))
        );
        assert_eq!(registry.locate("08"), None);
    }

    #[test]
    fn unregister_channel_clears_both_partitions() {
        let registry = SlaveRegistry::default();
        let channel = ChannelId::from("shared");
        registry.partition(SlaveKind::Device).register(device("01"), channel.clone());
        registry.partition(SlaveKind::Device).register(device("02"), ChannelId::from("other"));
        registry
            .partition(SlaveKind::Sensor)
            .register(SlaveIdentity::new(SlaveKind::Sensor, "03", "T"), channel.clone());

        let mut removed = registry.unregister_channel(&channel);
        removed.sort();
        assert_eq!(
            removed,
            vec![
                (SlaveKind::Device, "01".to_string()),
                (SlaveKind::Sensor, "03".to_string()),
            ]
        );
        assert_eq!((registry.device_count(), registry.sensor_count()), (1, 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_registrations() {
        let registry = Arc::new(SlaveRegistry::default());
        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .partition(SlaveKind::Device)
                        .register(device(&format!("{i:02}")), ChannelId::new())
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(registry.device_count(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_mac_has_one_winner() {
        let registry = Arc::new(SlaveRegistry::default());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .partition(SlaveKind::Sensor)
                        .register(SlaveIdentity::new(SlaveKind::Sensor, "AA", "T"), ChannelId::new())
                })
            })
            .collect();

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.sensor_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_status_updates_on_distinct_macs() {
        let registry = Arc::new(SlaveRegistry::default());
        for i in 0..32 {
            registry
                .partition(SlaveKind::Device)
                .register(device(&format!("{i:02}")), ChannelId::new());
        }

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let status = if i % 2 == 0 {
                    SlaveStatus::On
                } else {
                    SlaveStatus::Off
                };
                tokio::spawn(async move {
                    registry
                        .partition(SlaveKind::Device)
                        .update_status(&format!("{i:02}"), status)
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        for (i, identity) in registry.partition(SlaveKind::Device).snapshot().iter().enumerate() {
            let expected = if i % 2 == 0 {
                SlaveStatus::On
            } else {
                SlaveStatus::Off
            };
            assert_eq!(identity.status, expected, "mac {}", identity.mac);
            assert_eq!(identity.name, "Lamp");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_status_and_name_updates_both_land() {
        for _ in 0..50 {
            let registry = Arc::new(SlaveRegistry::default());
            registry
                .partition(SlaveKind::Sensor)
                .register(SlaveIdentity::new(SlaveKind::Sensor, "07", "Thermo"), ChannelId::from("s"));

            let by_status = Arc::clone(&registry);
            let status = tokio::spawn(async move {
                by_status
                    .partition(SlaveKind::Sensor)
                    .update_status("07", SlaveStatus::On)
            });
            let by_name = Arc::clone(&registry);
            let name = tokio::spawn(async move {
                by_name.partition(SlaveKind::Sensor).update_name("07", "Attic")
            });
            assert!(status.await.unwrap());
            assert!(name.await.unwrap());

            let identity = registry.partition(SlaveKind::Sensor).get("07").unwrap();
            assert_eq!(identity.status, SlaveStatus::On);
            assert_eq!(identity.name, "Attic");
        }
    }
}
