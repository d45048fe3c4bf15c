//! Shared domain types for the hub: slave identities, telemetry, invocations.

pub mod types;

pub use types::{
    InvocationRequest, MethodCall, MethodRef, SlaveIdentity, SlaveKind, SlaveParams, SlaveStatus,
    StatusChange, SwitchRequest, TelemetryReading, TelemetryRecord,
};
