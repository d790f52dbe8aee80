//! World tick driver
//!
//! Owns every unit and advances them together. A tick has two phases, each
//! run in parallel across units:
//!
//! 1. **Propagation**: every unit re-evaluates its aura masters against the
//!    world state and the snapshots published last tick, enqueueing child
//!    applications and removals on other units' handles.
//! 2. **Reconciliation**: every unit drains its queue exactly once and
//!    publishes, then its aggregator learns which fields were touched.
//!
//! No unit's registry is touched by more than one thread in either phase;
//! cross-unit interaction goes only through `RegistryHandle`.
//!
//! World state (positions, groups, organizations) is mutated between ticks
//! through `state_mut`.

mod state;
mod unit;


use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use halo_types::EngineConfig;
use rayon::prelude::*;

use crate::catalog::EffectCatalog;
use crate::effects::{
    ChangeSink, EffectBuilder, EffectChange, EffectError, EffectSnapshot, RegistryHandle,
    RemovalTarget,
};
use crate::ids::{EffectToken, EffectType, UnitId};
use crate::modifier::FieldId;
use crate::properties::PropertySource;
use crate::propagation::{PropagationContext, PropagationReport};

pub use state::{Placement, WorldState, WorldView};
pub use unit::Unit;

/// What one `World::tick` did
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// 1-based tick number
    pub tick: u64,
    /// All effect transitions, grouped by unit in id order
    pub changes: Vec<EffectChange>,
    /// Property fields invalidated per unit
    pub changed_fields: BTreeMap<UnitId, BTreeSet<FieldId>>,
    pub propagation: PropagationReport,
    pub admitted: usize,
    pub refreshed: usize,
    pub rejected: usize,
    pub removed: usize,
}

pub struct World {
    config: EngineConfig,
    catalog: Arc<EffectCatalog>,
    state: WorldState,
    units: BTreeMap<UnitId, Unit>,
    directory: BTreeMap<UnitId, RegistryHandle>,
    sinks: Vec<Arc<dyn ChangeSink>>,
    tick: u64,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("units", &self.units.len())
            .field("sinks", &self.sinks.len())
            .field("tick", &self.tick)
            .finish()
    }
}

impl World {
    pub fn new(config: EngineConfig, catalog: Arc<EffectCatalog>) -> Self {
        Self {
            config,
            catalog,
            state: WorldState::new(),
            units: BTreeMap::new(),
            directory: BTreeMap::new(),
            sinks: Vec::new(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<EffectCatalog> {
        &self.catalog
    }

    /// Number of completed ticks
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.config.tick_ms)
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    /// Attach a sink to every current and future unit
    pub fn add_sink(&mut self, sink: Arc<dyn ChangeSink>) {
        for unit in self.units.values_mut() {
            unit.add_sink(sink.clone());
        }
        self.sinks.push(sink);
    }

    /// Create a unit. An existing unit with the same id is despawned first.
    pub fn spawn(
        &mut self,
        id: UnitId,
        placement: Placement,
        properties: Box<dyn PropertySource>,
    ) -> RegistryHandle {
        if self.units.contains_key(&id) {
            self.despawn(id);
        }

        let mut unit = Unit::new(id, self.catalog.clone(), properties, &self.config);
        for sink in &self.sinks {
            unit.add_sink(sink.clone());
        }
        let handle = unit.handle();

        self.state.insert(id, placement);
        self.directory.insert(id, handle.clone());
        self.units.insert(id, unit);

        tracing::debug!(unit = %id, "Unit spawned");
        handle
    }

    /// Remove a unit from the simulation. Children of its auras are removed
    /// from the units that carried them; requests still addressed to it are
    /// dropped.
    pub fn despawn(&mut self, id: UnitId) -> bool {
        let Some(mut unit) = self.units.remove(&id) else {
            return false;
        };
        self.directory.remove(&id);
        self.state.remove(id);

        let ctx = PropagationContext {
            world: &self.state,
            directory: &self.directory,
            catalog: &self.catalog,
        };
        let report = unit.retire_auras(&ctx);

        tracing::debug!(unit = %id, retired = report.retired, "Unit despawned");
        true
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn handle(&self, id: UnitId) -> Option<RegistryHandle> {
        self.directory.get(&id).cloned()
    }

    pub fn effects(&self, id: UnitId) -> Option<Arc<EffectSnapshot>> {
        self.units.get(&id).map(Unit::effects)
    }

    pub fn property(&mut self, id: UnitId, field: FieldId) -> Option<f64> {
        self.units.get_mut(&id).map(|unit| unit.property(field))
    }

    /// Builder without an owner, for use with `apply`
    pub fn builder(&self, effect_type: EffectType) -> EffectBuilder {
        EffectBuilder::new(self.catalog.clone()).set_type(effect_type)
    }

    /// Apply to `unit`. A unit that does not exist silently drops the request.
    pub fn apply(&self, unit: UnitId, builder: EffectBuilder) -> Result<EffectToken, EffectError> {
        match self.directory.get(&unit) {
            Some(handle) => handle.apply(builder),
            None => {
                let effect = builder.set_owner(unit).build()?;
                tracing::debug!(%unit, token = %effect.token, "Unit not present, application dropped");
                Ok(effect.token)
            }
        }
    }

    pub fn remove(&self, unit: UnitId, target: impl Into<RemovalTarget>) {
        match self.directory.get(&unit) {
            Some(handle) => handle.remove(target),
            None => tracing::debug!(%unit, "Unit not present, removal dropped"),
        }
    }

    /// Advance every unit by one tick
    pub fn tick(&mut self) -> TickSummary {
        let dt = self.tick_duration();
        let Self {
            state,
            units,
            directory,
            catalog,
            ..
        } = &mut *self;

        // ─── Propagation ────────────────────────────────────────────────────
        let ctx = PropagationContext {
            world: &*state,
            directory: &*directory,
            catalog: &*catalog,
        };
        let propagation = units
            .par_iter_mut()
            .map(|(_, unit)| unit.propagate(&ctx))
            .reduce(PropagationReport::default, PropagationReport::merge);

        // ─── Reconciliation ─────────────────────────────────────────────────
        let mut steps: Vec<_> = units
            .par_iter_mut()
            .map(|(id, unit)| {
                let report = unit.step(dt);
                (*id, report, unit.take_changed_fields())
            })
            .collect();
        steps.sort_by_key(|(id, _, _)| *id);

        self.tick += 1;
        let mut summary = TickSummary {
            tick: self.tick,
            propagation,
            ..TickSummary::default()
        };
        for (id, report, changed) in steps {
            summary.admitted += report.admitted;
            summary.refreshed += report.refreshed;
            summary.rejected += report.rejected;
            summary.removed += report.removed;
            summary.changes.extend(report.changes);
            if !changed.is_empty() {
                summary.changed_fields.insert(id, changed);
            }
        }

        tracing::trace!(
            tick = summary.tick,
            admitted = summary.admitted,
            refreshed = summary.refreshed,
            rejected = summary.rejected,
            removed = summary.removed,
            placed = summary.propagation.placed,
            retired = summary.propagation.retired,
            "Tick complete"
        );
        summary
    }
}
