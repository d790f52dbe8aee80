//! Published effect snapshots
//!
//! A snapshot is the immutable, fully reconciled set of a unit's active
//! effects. Readers hold an `Arc` to it and keep that view until they load
//! again; the registry never mutates a published snapshot.

use std::sync::Arc;

use super::{EffectInstance, SimTime};
use crate::catalog::EffectCategory;
use crate::ids::{EffectId, EffectToken, UnitId};

#[derive(Debug, Clone, Default)]
pub struct EffectSnapshot {
    unit: UnitId,
    version: u64,
    now: SimTime,
    /// Ordered by `EffectId`
    effects: Vec<Arc<EffectInstance>>,
}

impl EffectSnapshot {
    pub(crate) fn empty(unit: UnitId) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    pub(crate) fn new(
        unit: UnitId,
        version: u64,
        now: SimTime,
        effects: Vec<Arc<EffectInstance>>,
    ) -> Self {
        debug_assert!(effects.windows(2).all(|w| w[0].id < w[1].id));
        Self {
            unit,
            version,
            now,
            effects,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Increases by one on every publication
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Registry clock at publication
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectInstance> {
        self.effects.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn get(&self, id: EffectId) -> Option<&EffectInstance> {
        self.effects
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| self.effects[idx].as_ref())
    }

    pub fn by_token(&self, token: EffectToken) -> Option<&EffectInstance> {
        self.iter().find(|e| e.token == token)
    }

    pub fn contains_token(&self, token: EffectToken) -> bool {
        self.by_token(token).is_some()
    }

    /// Instances sharing at least one category bit with `category`
    pub fn with_category(&self, category: EffectCategory) -> impl Iterator<Item = &EffectInstance> {
        self.iter().filter(move |e| e.category.intersects(category))
    }
}
