//! One simulated unit
//!
//! Everything a unit needs is constructed together in `Unit::new`: the
//! registry owning its effects, the aggregator deriving its properties and
//! the propagator tracking children of its auras.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use halo_types::EngineConfig;

use crate::catalog::EffectCatalog;
use crate::effects::{ChangeSink, EffectRegistry, EffectSnapshot, ReconcileReport, RegistryHandle};
use crate::ids::UnitId;
use crate::modifier::FieldId;
use crate::properties::{PropertyAggregator, PropertySource};
use crate::propagation::{AuraPropagator, PropagationContext, PropagationReport};

#[derive(Debug)]
pub struct Unit {
    id: UnitId,
    registry: EffectRegistry,
    aggregator: PropertyAggregator,
    propagator: AuraPropagator,
}

impl Unit {
    pub fn new(
        id: UnitId,
        catalog: Arc<EffectCatalog>,
        properties: Box<dyn PropertySource>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            id,
            registry: EffectRegistry::new(id, catalog),
            aggregator: PropertyAggregator::new(properties, config.inverse_floor),
            propagator: AuraPropagator::new(id),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn handle(&self) -> RegistryHandle {
        self.registry.handle()
    }

    pub fn effects(&self) -> Arc<EffectSnapshot> {
        self.registry.effects()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ChangeSink>) {
        self.registry.add_sink(sink);
    }

    pub fn property(&mut self, field: FieldId) -> f64 {
        self.aggregator.value(field)
    }

    pub fn aggregator(&self) -> &PropertyAggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut PropertyAggregator {
        &mut self.aggregator
    }

    pub fn propagator(&self) -> &AuraPropagator {
        &self.propagator
    }

    /// Re-run this unit's auras against its last published snapshot
    pub fn propagate(&mut self, ctx: &PropagationContext<'_>) -> PropagationReport {
        let snapshot = self.registry.effects();
        self.propagator.propagate(&snapshot, ctx)
    }

    pub(crate) fn retire_auras(&mut self, ctx: &PropagationContext<'_>) -> PropagationReport {
        self.propagator.retire_all(ctx)
    }

    /// Reconcile once and hand the result to the aggregator
    pub fn step(&mut self, dt: Duration) -> ReconcileReport {
        let report = self.registry.reconcile(dt);
        if report.published {
            self.aggregator
                .notify(self.registry.effects(), report.touched_fields.iter().copied());
        }
        report
    }

    /// Fields invalidated since the previous call
    pub fn take_changed_fields(&mut self) -> BTreeSet<FieldId> {
        self.aggregator.take_changed()
    }
}
