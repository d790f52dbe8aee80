//! Effect instances (runtime state)
//!
//! An `EffectInstance` is one applied effect on one unit. It is built in the
//! `Pending` state, becomes `Active` when a registry admits it, and ends as
//! `Removed`. A removed instance is never resurrected; reapplying creates a
//! new instance.
//!
//! Instances inside a published snapshot are immutable. The registry replaces
//! an instance with a modified copy (refresh, enable toggle) rather than
//! mutating it in place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::EffectCategory;
use crate::ids::{EffectId, EffectToken, EffectType, UnitId};
use crate::modifier::{FieldId, ModifierSet};
use crate::propagation::PropagationStrategy;

/// Registry-local simulation clock, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: Self = Self(0);

    pub fn after(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Time left until `deadline` (zero once it has passed)
    pub fn until(self, deadline: SimTime) -> Duration {
        Duration::from_millis(deadline.0.saturating_sub(self.0))
    }
}

/// Lifecycle of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectState {
    /// Built, not yet admitted into a registry
    #[default]
    Pending,
    /// Admitted and ticking
    Active,
    /// Terminal
    Removed,
}

/// Aura configuration carried by a master instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuraSpec {
    pub strategy: PropagationStrategy,
    /// Effect type applied to selected targets
    pub propagated_type: EffectType,
}

/// What role an instance plays in propagation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectKind {
    /// Plain applied effect
    Standard,
    /// Master instance that re-broadcasts children every tick
    Aura(AuraSpec),
    /// Child placed on this unit by another unit's aura
    Propagated { origin: UnitId, master: EffectId },
}

/// One applied effect on one unit
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInstance {
    pub id: EffectId,
    pub effect_type: EffectType,
    pub category: EffectCategory,
    pub token: EffectToken,

    // ─── Entities ───────────────────────────────────────────────────────────
    /// Unit carrying the effect
    pub owner: UnitId,
    /// Unit that applied it, if any
    pub source: Option<UnitId>,

    // ─── Timing ─────────────────────────────────────────────────────────────
    /// Total duration (None = permanent)
    pub duration: Option<Duration>,
    /// Set on admission from the registry clock
    pub expires_at: Option<SimTime>,

    // ─── Modifiers ──────────────────────────────────────────────────────────
    /// When false the instance stays active but contributes no modifiers
    pub modifiers_enabled: bool,
    pub modifiers: ModifierSet,

    pub kind: EffectKind,
    pub display: bool,
    pub state: EffectState,
}

impl EffectInstance {
    pub fn is_aura(&self) -> bool {
        matches!(self.kind, EffectKind::Aura(_))
    }

    pub fn is_propagated(&self) -> bool {
        matches!(self.kind, EffectKind::Propagated { .. })
    }

    pub fn aura(&self) -> Option<&AuraSpec> {
        match &self.kind {
            EffectKind::Aura(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.duration.is_none()
    }

    /// Start the countdown from `now`
    pub(crate) fn activate(&mut self, now: SimTime) {
        self.state = EffectState::Active;
        self.expires_at = self.duration.map(|d| now.after(d));
    }

    /// Copy of this instance with its timer restarted using `duration`
    pub(crate) fn refreshed(&self, now: SimTime, duration: Option<Duration>) -> Self {
        let mut next = self.clone();
        next.duration = duration;
        next.expires_at = duration.map(|d| now.after(d));
        next
    }

    pub(crate) fn with_modifiers_enabled(&self, enabled: bool) -> Self {
        let mut next = self.clone();
        next.modifiers_enabled = enabled;
        next
    }

    pub(crate) fn removed(&self) -> Self {
        let mut next = self.clone();
        next.state = EffectState::Removed;
        next
    }

    pub fn has_expired(&self, now: SimTime) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Remaining time (None if permanent)
    pub fn remaining(&self, now: SimTime) -> Option<Duration> {
        self.expires_at.map(|deadline| now.until(deadline))
    }

    /// Fields this instance currently influences
    pub fn active_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.modifiers
            .fields()
            .filter(move |_| self.modifiers_enabled)
    }
}
