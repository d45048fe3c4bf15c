use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use {
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use {
    smarthub_common::{
        InvocationRequest, MethodCall, SlaveKind, SlaveParams, StatusChange, SwitchRequest,
        TelemetryReading,
    },
    smarthub_protocol::{ErrorShape, ResponseFrame, error_codes, methods},
};

use crate::{
    dispatch, lifecycle, query,
    state::{ChannelId, GatewayState},
    telemetry,
};

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every method handler.
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub params: Value,
    /// Channel the request arrived on.
    pub channel: ChannelId,
    pub state: Arc<GatewayState>,
}

/// The result a method handler produces.
pub type MethodResult = Result<Value, ErrorShape>;

/// A boxed async method handler.
pub type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

/// `RunMethod` arguments: target MAC and the method to run on it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunMethodParams {
    #[serde(alias = "MAC")]
    mac: String,
    #[serde(alias = "Method")]
    method: MethodCall,
}

/// Decode request params. A single-element positional array is unwrapped
/// so `[x]` and `x` are accepted alike.
fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ErrorShape> {
    let first = serde_json::from_value::<T>(params.clone());
    let retry = match (&first, params) {
        (Err(_), Value::Array(items)) if items.len() == 1 => {
            serde_json::from_value::<T>(items[0].clone()).ok()
        },
        _ => None,
    };
    match (first, retry) {
        (Ok(value), _) | (Err(_), Some(value)) => Ok(value),
        (Err(e), None) => Err(ErrorShape::new(
            error_codes::INVALID_REQUEST,
            format!("invalid params: {e}"),
        )),
    }
}

/// Reply for calls whose result slaves historically ignore: `false` unless
/// the hub is configured to report real outcomes.
fn acknowledge(state: &GatewayState, outcome: bool) -> Value {
    Value::Bool(state.config.gateway.report_outcomes && outcome)
}

// ── Method registry ──────────────────────────────────────────────────────────

pub struct MethodRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    pub async fn dispatch(&self, ctx: MethodContext) -> ResponseFrame {
        let method = ctx.method.clone();
        let request_id = ctx.request_id.clone();
        let channel = ctx.channel.clone();

        let Some(handler) = self.handlers.get(&method) else {
            warn!(method, channel = %channel, "unknown method");
            return ResponseFrame::err(
                &request_id,
                ErrorShape::new(
                    error_codes::INVALID_REQUEST,
                    format!("unknown method: {method}"),
                ),
            );
        };

        debug!(method, request_id = %request_id, channel = %channel, "dispatching method");
        match handler(ctx).await {
            Ok(payload) => {
                debug!(method, request_id = %request_id, "method ok");
                ResponseFrame::ok(&request_id, payload)
            },
            Err(err) => {
                warn!(method, request_id = %request_id, code = %err.code, msg = %err.message, "method error");
                ResponseFrame::err(&request_id, err)
            },
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_defaults(&mut self) {
        self.register_gateway_methods();
        self.register_slave_methods();
        self.register_query_methods();
    }

    // ── Gateway-internal methods ─────────────────────────────────────────

    fn register_gateway_methods(&mut self) {
        // health
        self.register(
            methods::HEALTH,
            Box::new(|ctx| {
                Box::pin(async move {
                    Ok(json!({
                        "status": "ok",
                        "version": ctx.state.version,
                        "connections": ctx.state.client_count(),
                    }))
                })
            }),
        );

        // status
        self.register(
            methods::STATUS,
            Box::new(|ctx| {
                Box::pin(async move {
                    let state = &ctx.state;
                    let discovery = &state.config.discovery;
                    let clients: Vec<_> = state
                        .clients
                        .iter()
                        .map(|c| {
                            json!({
                                "channel": c.channel.to_string(),
                                "remote": c.remote_addr.map(|addr| addr.to_string()),
                                "connectedAt": c.connected_at.elapsed().as_secs(),
                            })
                        })
                        .collect();
                    Ok(json!({
                        "version": state.version,
                        "hostname": state.hostname,
                        "protocol": smarthub_protocol::PROTOCOL_VERSION,
                        "connections": state.client_count(),
                        "clients": clients,
                        "devices": state.registry.device_count(),
                        "sensors": state.registry.sensor_count(),
                        "telemetryBuffered": state.telemetry.len().await,
                        "discovery": {
                            "portToListen": discovery.port_to_listen,
                            "hubUrl": discovery.hub_url,
                            "urlForInit": discovery.url_for_init,
                            "urlForListen": discovery.url_for_listen,
                            "methodUrls": discovery.method_urls,
                        },
                    }))
                })
            }),
        );
    }

    // ── Slave-facing methods ─────────────────────────────────────────────

    fn register_slave_methods(&mut self) {
        self.register(
            methods::INIT_DEVICE,
            Box::new(|ctx| Box::pin(init_slave(ctx, SlaveKind::Device))),
        );
        self.register(
            methods::INIT_SENSOR,
            Box::new(|ctx| Box::pin(init_slave(ctx, SlaveKind::Sensor))),
        );

        // StatusChanger: fire-and-forget
        self.register(
            methods::STATUS_CHANGER,
            Box::new(|ctx| {
                Box::pin(async move {
                    let change: StatusChange = parse_params(&ctx.params)?;
                    query::change_status(&ctx.state, &change);
                    Ok(Value::Null)
                })
            }),
        );

        self.register(
            methods::TURN_ON,
            Box::new(|ctx| {
                Box::pin(async move {
                    let slave: SwitchRequest = parse_params(&ctx.params)?;
                    let sent = dispatch::turn_on(&ctx.state, &ctx.channel, &slave);
                    Ok(acknowledge(&ctx.state, sent))
                })
            }),
        );
        self.register(
            methods::TURN_OFF,
            Box::new(|ctx| {
                Box::pin(async move {
                    let slave: SwitchRequest = parse_params(&ctx.params)?;
                    let sent = dispatch::turn_off(&ctx.state, &ctx.channel, &slave);
                    Ok(acknowledge(&ctx.state, sent))
                })
            }),
        );

        self.register(
            methods::LISTEN_DATA_FROM_SENSOR,
            Box::new(|ctx| {
                Box::pin(async move {
                    let reading: TelemetryReading = parse_params(&ctx.params)?;
                    telemetry::ingest(&ctx.state, reading).await;
                    Ok(Value::Null)
                })
            }),
        );
    }

    // ── Web API methods ──────────────────────────────────────────────────

    fn register_query_methods(&mut self) {
        self.register(
            methods::RETURN_ALL_DEVICES,
            Box::new(|ctx| {
                Box::pin(async move { Ok(json!(query::list_devices(&ctx.state))) })
            }),
        );
        self.register(
            methods::RETURN_ALL_SENSORS,
            Box::new(|ctx| {
                Box::pin(async move { Ok(json!(query::list_sensors(&ctx.state))) })
            }),
        );

        self.register(
            methods::RUN_METHOD,
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: RunMethodParams = parse_params(&ctx.params)?;
                    let request = InvocationRequest::from_call(params.mac, params.method);
                    Ok(Value::Bool(dispatch::dispatch(&ctx.state, &request)))
                })
            }),
        );

        self.register(
            methods::UPDATE_DEVICE,
            Box::new(|ctx| Box::pin(rename_slave(ctx, SlaveKind::Device))),
        );
        self.register(
            methods::UPDATE_SENSOR,
            Box::new(|ctx| Box::pin(rename_slave(ctx, SlaveKind::Sensor))),
        );
    }
}

async fn init_slave(ctx: MethodContext, kind: SlaveKind) -> MethodResult {
    let params: SlaveParams = parse_params(&ctx.params)?;
    let outcome =
        lifecycle::register_and_reconcile(&ctx.state, params.into_identity(kind), &ctx.channel)
            .await;
    Ok(acknowledge(&ctx.state, outcome.reconciled()))
}

async fn rename_slave(ctx: MethodContext, kind: SlaveKind) -> MethodResult {
    let params: SlaveParams = parse_params(&ctx.params)?;
    Ok(Value::Bool(query::rename(&ctx.state, kind, params).await))
}
