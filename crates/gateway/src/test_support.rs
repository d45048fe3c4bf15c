use std::sync::Arc;

use {serde_json::Value, tokio::sync::mpsc};

use {smarthub_config::HubConfig, smarthub_storage::MemoryStore};

use crate::state::{ChannelId, ConnectedClient, GatewayServices, GatewayState};

/// A hub on a memory store, with handles to the store for failure injection.
pub struct TestHub {
    pub state: Arc<GatewayState>,
    pub store: Arc<MemoryStore>,
}

impl TestHub {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let services = GatewayServices::new(store.clone(), store.clone());
        Self {
            state: GatewayState::new(config, services),
            store,
        }
    }

    /// Attach a fake channel whose outbound frames can be drained.
    pub fn connect(&self, id: &str) -> FakeChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = ChannelId::from(id);
        self.state
            .register_client(ConnectedClient::new(channel.clone(), tx, None));
        FakeChannel { channel, rx }
    }
}

pub struct FakeChannel {
    pub channel: ChannelId,
    rx: mpsc::UnboundedReceiver<String>,
}

impl FakeChannel {
    /// Every frame queued so far, parsed as JSON.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(raw) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&raw).unwrap());
        }
        frames
    }
}
