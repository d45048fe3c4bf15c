use {
    serde_json::Value,
    tracing::{info, warn},
};

use {
    smarthub_common::SlaveIdentity,
    smarthub_protocol::events,
    smarthub_storage::StoreResult,
};

use crate::{
    broadcast::broadcast_others,
    state::{ChannelId, GatewayState},
};

/// What `register_and_reconcile` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Registered, and a new row was added to the store.
    Inserted,
    /// Registered, and the existing row was updated.
    Updated,
    /// The MAC is already live in this partition; nothing changed.
    Conflict,
    /// Registered, but the store could not be reconciled.
    PersistenceFailed,
}

impl RegistrationOutcome {
    /// Whether the slave is now reachable through the requesting channel.
    pub fn registered(self) -> bool {
        !matches!(self, Self::Conflict)
    }

    /// Whether both the registry and the store were brought up to date.
    pub fn reconciled(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

/// A channel connected: announce it to everyone else.
pub fn on_channel_open(state: &GatewayState, channel: &ChannelId) {
    info!(channel = %channel, "channel opened");
    broadcast_others(
        state,
        channel,
        events::NOTICE,
        Some(Value::String(format!("{channel} join."))),
    );
}

/// A channel closed: drop its registry entries, then announce the departure.
pub fn on_channel_close(state: &GatewayState, channel: &ChannelId) {
    let removed = state.registry.unregister_channel(channel);
    if removed.is_empty() {
        info!(channel = %channel, "channel closed");
    }
    for (kind, mac) in &removed {
        info!(channel = %channel, kind = %kind, mac = %mac, "slave disconnected");
    }
    broadcast_others(
        state,
        channel,
        events::NOTICE,
        Some(Value::String(format!("{channel} left."))),
    );
}

/// Register `identity` on `channel`, then add or update its store row.
///
/// The two steps are not transactional: a failed store write keeps the live
/// entry, and the row is fixed on the slave's next registration.
pub async fn register_and_reconcile(
    state: &GatewayState,
    identity: SlaveIdentity,
    channel: &ChannelId,
) -> RegistrationOutcome {
    let kind = identity.kind;
    if !state
        .registry
        .partition(kind)
        .register(identity.clone(), channel.clone())
    {
        info!(mac = %identity.mac, kind = %kind, channel = %channel, "slave already registered");
        return RegistrationOutcome::Conflict;
    }
    info!(mac = %identity.mac, kind = %kind, name = %identity.name, channel = %channel, "slave registered");

    match reconcile(state, &identity).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(mac = %identity.mac, kind = %kind, error = %e, "failed to reconcile slave with store");
            RegistrationOutcome::PersistenceFailed
        },
    }
}

async fn reconcile(state: &GatewayState, identity: &SlaveIdentity) -> StoreResult<RegistrationOutcome> {
    let cancel = state.persist_token();
    let slaves = &state.services.slaves;
    if slaves.exists_by_mac(identity.kind, &identity.mac, &cancel).await? {
        slaves.update(identity, &cancel).await?;
        Ok(RegistrationOutcome::Updated)
    } else {
        slaves.add(identity, &cancel).await?;
        Ok(RegistrationOutcome::Inserted)
    }
}
