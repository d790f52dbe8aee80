//! Change notifications
//!
//! Every transition produced by a reconciliation (admit, refresh, enable
//! toggle, removal) is described by an `EffectChange` and handed to the
//! registry's sinks after the new snapshot is published. Transport and
//! encoding belong to the sink.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use super::{EffectInstance, SimTime};
use crate::ids::{EffectId, EffectType, UnitId};
use crate::modifier::FieldId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModifierValue {
    pub field: FieldId,
    pub value: f64,
}

/// Payload describing one effect transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectChange {
    pub effect_id: EffectId,
    pub effect_type: EffectType,
    pub owner: UnitId,
    pub source: Option<UnitId>,
    /// None for permanent effects
    pub remaining_ms: Option<u64>,
    /// Empty while the effect's modifiers are suspended
    pub modifiers: Vec<ModifierValue>,
    /// false when the effect was removed
    pub applied: bool,
    pub display: bool,
}

impl EffectChange {
    pub(crate) fn from_instance(effect: &EffectInstance, now: SimTime, applied: bool) -> Self {
        let modifiers = if effect.modifiers_enabled {
            effect
                .modifiers
                .iter()
                .map(|m| ModifierValue {
                    field: m.field,
                    value: m.value,
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            effect_id: effect.id,
            effect_type: effect.effect_type,
            owner: effect.owner,
            source: effect.source,
            remaining_ms: if applied {
                effect
                    .remaining(now)
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            } else {
                None
            },
            modifiers,
            applied,
            display: effect.display,
        }
    }
}

/// Receiver of change notifications.
///
/// Called on the reconciling thread; implementations must not block.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, change: &EffectChange);
}

/// Bounded channel sink. Drops (and logs) payloads when the consumer falls
/// behind instead of stalling the tick.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<EffectChange>,
}

impl ChannelSink {
    /// Capacity is at least 1; a zero-capacity channel would drop every change.
    pub fn bounded(capacity: usize) -> (Self, Receiver<EffectChange>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl ChangeSink for ChannelSink {
    fn publish(&self, change: &EffectChange) {
        match self.sender.try_send(change.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    unit = %dropped.owner,
                    effect = %dropped.effect_id,
                    "Notification channel full, dropping change"
                );
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
