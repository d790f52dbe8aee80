//! Per-unit property aggregator
//!
//! Values are computed on demand and cached per field. The registry reports
//! which fields a reconciliation touched; only those cache entries are
//! invalidated, so a tick with no effect changes recomputes nothing.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use super::PropertySource;
use crate::effects::EffectSnapshot;
use crate::modifier::FieldId;

pub struct PropertyAggregator {
    source: Box<dyn PropertySource>,
    snapshot: Arc<EffectSnapshot>,
    cache: HashMap<FieldId, f64>,
    /// Fields reported as touched since the last `take_changed`
    changed: BTreeSet<FieldId>,
    inverse_floor: f64,
}

impl fmt::Debug for PropertyAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAggregator")
            .field("snapshot_version", &self.snapshot.version())
            .field("cached", &self.cache.len())
            .field("changed", &self.changed)
            .field("inverse_floor", &self.inverse_floor)
            .finish()
    }
}

impl PropertyAggregator {
    pub fn new(source: Box<dyn PropertySource>, inverse_floor: f64) -> Self {
        Self {
            source,
            snapshot: Arc::new(EffectSnapshot::default()),
            cache: HashMap::new(),
            changed: BTreeSet::new(),
            inverse_floor,
        }
    }

    /// Final value of `field`
    pub fn value(&mut self, field: FieldId) -> f64 {
        if let Some(value) = self.cache.get(&field) {
            return *value;
        }
        let value = self.compute(field);
        self.cache.insert(field, value);
        value
    }

    /// Cached value, if `field` was computed since its last invalidation
    pub fn cached(&self, field: FieldId) -> Option<f64> {
        self.cache.get(&field).copied()
    }

    /// Fold without touching the cache
    pub fn compute(&self, field: FieldId) -> f64 {
        let floor = self.inverse_floor;
        let mut value = self.source.base_value(field);

        for modifier in self.source.equipment_modifiers(field) {
            value = modifier.apply_to(value, floor);
        }

        for effect in self.snapshot.iter().filter(|e| e.modifiers_enabled) {
            if let Some(modifier) = effect.modifiers.get(field) {
                value = modifier.apply_to(value, floor);
            }
        }

        value
    }

    /// Adopt a newly published snapshot and invalidate the fields it touched
    pub fn notify(&mut self, snapshot: Arc<EffectSnapshot>, touched: impl IntoIterator<Item = FieldId>) {
        self.snapshot = snapshot;
        for field in touched {
            self.invalidate(field);
        }
    }

    /// Drop the cached value of `field` (base or equipment changed)
    pub fn invalidate(&mut self, field: FieldId) {
        self.cache.remove(&field);
        self.changed.insert(field);
    }

    /// Swap the base/equipment source; every cached field is invalidated
    pub fn replace_source(&mut self, source: Box<dyn PropertySource>) {
        self.source = source;
        let cached: Vec<FieldId> = self.cache.keys().copied().collect();
        for field in cached {
            self.invalidate(field);
        }
    }

    /// Fields changed since the previous call, in canonical order
    pub fn take_changed(&mut self) -> BTreeSet<FieldId> {
        std::mem::take(&mut self.changed)
    }

    pub fn snapshot(&self) -> &Arc<EffectSnapshot> {
        &self.snapshot
    }
}
