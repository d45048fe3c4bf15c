use {serde::Serialize, serde_json::Value, tracing::debug};

use smarthub_protocol::EventFrame;

use crate::state::{ChannelId, GatewayState};

/// Serialize `frame` and queue it on one channel. False if the channel is
/// not connected or its writer has gone away.
pub fn send_to(state: &GatewayState, channel: &ChannelId, frame: &impl Serialize) -> bool {
    let Ok(json) = serde_json::to_string(frame) else {
        return false;
    };
    match state.clients.get(channel) {
        Some(client) => client.send(&json),
        None => {
            debug!(channel = %channel, "send to unknown channel");
            false
        },
    }
}

/// Push a named event to exactly one channel.
pub fn send_event(
    state: &GatewayState,
    channel: &ChannelId,
    event: &str,
    payload: Option<Value>,
) -> bool {
    let frame = EventFrame::new(event, payload, state.next_seq());
    send_to(state, channel, &frame)
}

/// Push a named event to every live channel except `origin`. Returns the
/// number of channels it was queued on.
pub fn broadcast_others(
    state: &GatewayState,
    origin: &ChannelId,
    event: &str,
    payload: Option<Value>,
) -> usize {
    let frame = EventFrame::new(event, payload, state.next_seq());
    let Ok(json) = serde_json::to_string(&frame) else {
        return 0;
    };

    let mut delivered = 0;
    for client in state.clients.iter() {
        if client.key() == origin {
            continue;
        }
        if client.send(&json) {
            delivered += 1;
        }
    }
    debug!(event, delivered, "broadcast");
    delivered
}
