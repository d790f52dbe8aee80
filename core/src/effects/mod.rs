//! Effect instances and per-unit registries
//!
//! This module provides:
//! - **Instances**: one applied effect on one unit, built by `EffectBuilder`
//! - **Registry**: the unit-owned store that admits, refreshes and removes
//!   instances once per tick
//! - **Snapshots**: immutable reconciled views readers load without locking
//! - **Notifications**: change payloads handed to sinks after publication
//!
//! # Architecture
//!
//! ```text
//!  any thread                          owning unit's tick
//! ┌──────────────────────┐   queue   ┌──────────────────────────────┐
//! │ RegistryHandle       │ ────────► │ EffectRegistry::reconcile    │
//! │  apply / remove      │           │  cap checks, refresh, expiry │
//! │  set_enabled         │           └──────────────────────────────┘
//! │                      │                        │ publish
//! │  effects() ◄─────────┼──── Arc<EffectSnapshot>┘
//! └──────────────────────┘                        │
//!                                                 ▼
//!                                     ChangeSink (EffectChange)
//! ```

mod builder;
mod error;
mod instance;
mod notification;
mod registry;
mod snapshot;

#[cfg(test)]
mod registry_tests;

pub use builder::EffectBuilder;
pub use error::EffectError;
pub use instance::{AuraSpec, EffectInstance, EffectKind, EffectState, SimTime};
pub use notification::{ChangeSink, ChannelSink, EffectChange, ModifierValue};
pub use registry::{ApplyOutcome, EffectRegistry, ReconcileReport, RegistryHandle, RemovalTarget};
pub use snapshot::EffectSnapshot;
