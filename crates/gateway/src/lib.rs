//! Gateway: the hub's live connection registry and invocation router.
//!
//! Lifecycle of a slave:
//! 1. Open a WebSocket channel (`ws.rs`); other channels get a join notice
//! 2. `InitDevice` / `InitSensor` registers it and reconciles the store
//!    (`lifecycle.rs`, `registry.rs`)
//! 3. Sensors push telemetry (`telemetry.rs`)
//! 4. The web API lists slaves and renames them (`query.rs`) or runs a
//!    method on one of them (`dispatch.rs`)
//! 5. Closing the channel drops its registry entry and notifies the others
//!
//! Request names are mapped to handlers in `methods.rs`.

pub mod broadcast;
pub mod dispatch;
pub mod lifecycle;
pub mod methods;
pub mod query;
pub mod registry;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;
