use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::{sync::mpsc, task::JoinSet},
    tracing::{debug, info, warn},
};

use smarthub_protocol::{ErrorShape, RequestFrame, ResponseFrame, error_codes};

use crate::{
    broadcast::send_to,
    lifecycle,
    methods::{MethodContext, MethodRegistry},
    state::{ChannelId, ConnectedClient, GatewayState},
};

/// Drive one WebSocket channel from upgrade to close.
///
/// Every request frame is handled on its own task. On close, the channel's
/// in-flight requests are aborted and reaped before its registry entries are
/// dropped, so neither a late `InitDevice`/`InitSensor` nor a store call that
/// never returns can keep an entry alive past the close.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    remote_addr: SocketAddr,
) {
    let channel = ChannelId::new();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound frames go through an mpsc so any task can write to this channel.
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    let write_handle = tokio::spawn(async move {
        while let Some(text) = client_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    state.register_client(ConnectedClient::new(
        channel.clone(),
        client_tx,
        Some(remote_addr),
    ));
    info!(channel = %channel, remote = %remote_addr, "ws: connected");
    lifecycle::on_channel_open(&state, &channel);

    let mut in_flight = JoinSet::new();
    loop {
        let msg = tokio::select! {
            () = state.shutdown.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        while in_flight.try_join_next().is_some() {}

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(channel = %channel, error = %e, "ws: read error");
                break;
            },
        };

        let frame: RequestFrame = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %channel, error = %e, "ws: undecodable frame");
                send_to(
                    &state,
                    &channel,
                    &ResponseFrame::err(
                        "",
                        ErrorShape::new(error_codes::INVALID_REQUEST, format!("bad frame: {e}")),
                    ),
                );
                continue;
            },
        };
        if frame.r#type != "req" {
            debug!(channel = %channel, kind = %frame.r#type, "ws: ignoring non-request frame");
            continue;
        }

        let ctx = MethodContext {
            request_id: frame.id,
            method: frame.method,
            params: frame.params,
            channel: channel.clone(),
            state: Arc::clone(&state),
        };
        let methods = Arc::clone(&methods);
        let reply_state = Arc::clone(&state);
        let reply_channel = channel.clone();
        in_flight.spawn(async move {
            let response = methods.dispatch(ctx).await;
            send_to(&reply_state, &reply_channel, &response);
        });
    }

    in_flight.abort_all();
    while in_flight.join_next().await.is_some() {}

    state.remove_client(&channel);
    lifecycle::on_channel_close(&state, &channel);
    write_handle.abort();
    info!(channel = %channel, "ws: disconnected");
}
