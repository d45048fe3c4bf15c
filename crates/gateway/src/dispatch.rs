use {serde_json::Value, tracing::{debug, info}};

use smarthub_common::{InvocationRequest, SwitchRequest};

use crate::{
    broadcast::send_event,
    state::{ChannelId, GatewayState},
};

/// Send `request.address` to the one channel that owns `request.target_mac`
/// (devices first, then sensors). Arguments travel as an ordered array;
/// with none, the no-argument form is sent. Unknown MAC sends nothing.
pub fn dispatch(state: &GatewayState, request: &InvocationRequest) -> bool {
    let Some((kind, channel)) = state.registry.locate(&request.target_mac) else {
        info!(mac = %request.target_mac, address = %request.address, "no slave for invocation");
        return false;
    };

    let payload = (!request.args.is_empty()).then(|| Value::Array(request.args.clone()));
    let sent = send_event(state, &channel, &request.address, payload);
    debug!(
        mac = %request.target_mac,
        kind = %kind,
        address = %request.address,
        args = request.args.len(),
        sent,
        "invocation dispatched"
    );
    sent
}

/// Echo the caller's own "on" address back to it.
pub fn turn_on(state: &GatewayState, caller: &ChannelId, slave: &SwitchRequest) -> bool {
    match &slave.on {
        Some(on) => send_event(state, caller, &on.address, None),
        None => false,
    }
}

/// Echo the caller's own "off" address back to it.
pub fn turn_off(state: &GatewayState, caller: &ChannelId, slave: &SwitchRequest) -> bool {
    match &slave.off {
        Some(off) => send_event(state, caller, &off.address, None),
        None => false,
    }
}
