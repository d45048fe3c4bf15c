use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use {
    smarthub_config::{HubConfig, StorageBackend},
    smarthub_storage::SqliteStore,
};

use crate::{
    methods::MethodRegistry,
    state::{GatewayServices, GatewayState},
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> Router {
    let ws_path = state.config.gateway.path.clone();
    let app_state = AppState {
        gateway: state,
        methods,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(&ws_path, get(ws_upgrade_handler))
        .layer(cors)
        .with_state(app_state)
}

/// Open the configured persistence backend.
pub async fn open_services(config: &HubConfig) -> anyhow::Result<GatewayServices> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let path = config.storage.resolved_db_path();
            let store = Arc::new(SqliteStore::open(&path).await?);
            info!(path = %path.display(), "storage: sqlite");
            Ok(GatewayServices::new(store.clone(), store))
        },
        StorageBackend::Memory => {
            info!("storage: memory (nothing is kept across restarts)");
            Ok(GatewayServices::memory())
        },
    }
}

/// Start the gateway HTTP + WebSocket server and run until Ctrl-C.
pub async fn start_gateway(config: HubConfig) -> anyhow::Result<()> {
    let services = open_services(&config).await?;
    let state = GatewayState::new(config, services);
    let methods = Arc::new(MethodRegistry::new());

    let app = build_gateway_app(Arc::clone(&state), Arc::clone(&methods));

    let gateway = &state.config.gateway;
    let addr: SocketAddr = format!("{}:{}", gateway.bind, gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("smarthub gateway v{}", state.version),
        format!(
            "protocol v{}, listening on ws://{}{}",
            smarthub_protocol::PROTOCOL_VERSION,
            addr,
            gateway.path
        ),
        format!("{} methods registered", methods.method_names().len()),
        format!(
            "storage: {}",
            match state.config.storage.backend {
                StorageBackend::Sqlite => "sqlite",
                StorageBackend::Memory => "memory",
            }
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        shutdown.cancel();
    });

    // Run the server with ConnectInfo for remote IP extraction.
    let shutdown = state.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = &state.gateway;
    Json(serde_json::json!({
        "status": "ok",
        "version": gateway.version,
        "protocol": smarthub_protocol::PROTOCOL_VERSION,
        "connections": gateway.client_count(),
        "devices": gateway.registry.device_count(),
        "sensors": gateway.registry.sensor_count(),
        "telemetryBuffered": gateway.telemetry.len().await,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let max = state.gateway.config.gateway.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_connection(socket, state.gateway, state.methods, addr))
}
