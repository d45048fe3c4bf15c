use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use {
    dashmap::DashMap,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

use {
    smarthub_config::HubConfig,
    smarthub_storage::{MemoryStore, SlaveRepository, TelemetryRepository},
};

use crate::{registry::SlaveRegistry, telemetry::TelemetryBuffer};

// ── Channels ─────────────────────────────────────────────────────────────────

/// Opaque handle of a live channel, assigned by the transport on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A WebSocket channel currently connected to the hub.
#[derive(Debug)]
pub struct ConnectedClient {
    pub channel: ChannelId,
    /// Serialized frames for this channel's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: Instant,
}

impl ConnectedClient {
    pub fn new(
        channel: ChannelId,
        sender: mpsc::UnboundedSender<String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            channel,
            sender,
            remote_addr,
            connected_at: Instant::now(),
        }
    }

    /// Queue a serialized frame. False once the write loop is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Services ─────────────────────────────────────────────────────────────────

/// Persistence collaborators.
#[derive(Clone)]
pub struct GatewayServices {
    pub slaves: Arc<dyn SlaveRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
}

impl GatewayServices {
    pub fn new(slaves: Arc<dyn SlaveRepository>, telemetry: Arc<dyn TelemetryRepository>) -> Self {
        Self { slaves, telemetry }
    }

    /// Both repositories backed by a single in-process store.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store)
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared hub runtime state, wrapped in Arc for use across request tasks.
///
/// The registry partitions and the telemetry buffer are the only shared
/// mutable data; each is synchronised per key or internally.
pub struct GatewayState {
    /// Live channels keyed by channel id.
    pub clients: DashMap<ChannelId, ConnectedClient>,
    /// Registered slaves, device and sensor partitions.
    pub registry: SlaveRegistry,
    /// Telemetry received since start-up.
    pub telemetry: TelemetryBuffer,
    pub services: GatewayServices,
    pub config: HubConfig,
    /// Monotonically increasing sequence counter for pushed events.
    pub seq: AtomicU64,
    pub version: String,
    pub hostname: String,
    /// Cancelled on shutdown. Persistence calls get a child of it.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(config: HubConfig, services: GatewayServices) -> Arc<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Arc::new(Self {
            clients: DashMap::new(),
            registry: SlaveRegistry::default(),
            telemetry: TelemetryBuffer::default(),
            services,
            config,
            seq: AtomicU64::new(0),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Cancellation signal for one persistence call. No deadline is armed;
    /// it only fires when the hub shuts down.
    pub fn persist_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn register_client(&self, client: ConnectedClient) {
        self.clients.insert(client.channel.clone(), client);
    }

    /// Remove a channel. Returns the removed client if found.
    pub fn remove_client(&self, channel: &ChannelId) -> Option<ConnectedClient> {
        self.clients.remove(channel).map(|(_, client)| client)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
