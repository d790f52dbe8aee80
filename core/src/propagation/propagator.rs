//! Per-unit aura fan-out
//!
//! Runs once per tick for each unit carrying aura masters. For every master
//! it selects candidates, applies a child to candidates that lack one and
//! removes the child from units that dropped out of the candidate set. The
//! master itself is only ever removed by its own timer or an explicit
//! removal; when that happens the next pass retires all of its children.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::catalog::EffectCatalog;
use crate::effects::{EffectBuilder, EffectSnapshot, RegistryHandle, RemovalTarget};
use crate::ids::{EffectToken, UnitId};
use crate::world::WorldView;

/// Read-only view handed to every propagator during a tick
pub struct PropagationContext<'a> {
    pub world: &'a dyn WorldView,
    pub directory: &'a BTreeMap<UnitId, RegistryHandle>,
    pub catalog: &'a Arc<EffectCatalog>,
}

/// Counts from one propagation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub placed: usize,
    pub retired: usize,
}

impl PropagationReport {
    pub fn merge(self, other: Self) -> Self {
        Self {
            placed: self.placed + other.placed,
            retired: self.retired + other.retired,
        }
    }
}

#[derive(Debug)]
pub struct AuraPropagator {
    owner: UnitId,
    /// Units each master has placed a child on
    fanout: BTreeMap<EffectToken, BTreeSet<UnitId>>,
}

impl AuraPropagator {
    pub fn new(owner: UnitId) -> Self {
        Self {
            owner,
            fanout: BTreeMap::new(),
        }
    }

    /// Units currently targeted by the master with `token`
    pub fn targets(&self, token: EffectToken) -> Option<&BTreeSet<UnitId>> {
        self.fanout.get(&token)
    }

    pub fn propagate(
        &mut self,
        snapshot: &EffectSnapshot,
        ctx: &PropagationContext<'_>,
    ) -> PropagationReport {
        let mut report = PropagationReport::default();
        let mut live = BTreeSet::new();

        for master in snapshot.iter() {
            let Some(spec) = master.aura() else {
                continue;
            };
            live.insert(master.token);

            let candidates = spec.strategy.select(ctx.world, master);
            let previous = self.fanout.remove(&master.token).unwrap_or_default();
            let mut current = BTreeSet::new();

            tracing::trace!(
                unit = %self.owner,
                token = %master.token,
                strategy = spec.strategy.kind_name(),
                candidates = candidates.len(),
                "Aura candidates selected"
            );

            for target in candidates {
                // Units that left the simulation are simply not candidates
                let Some(handle) = ctx.directory.get(&target) else {
                    continue;
                };
                current.insert(target);

                let target_effects = handle.effects();
                if let Some(child) = target_effects.by_token(master.token) {
                    if child.modifiers_enabled != master.modifiers_enabled {
                        handle.set_enabled(master.token, master.modifiers_enabled);
                    }
                    continue;
                }

                let builder =
                    EffectBuilder::propagated(ctx.catalog.clone(), master, spec, target);
                match handle.apply(builder) {
                    Ok(_) => report.placed += 1,
                    Err(err) => tracing::debug!(
                        unit = %self.owner,
                        %target,
                        error = %err,
                        "Aura child could not be built"
                    ),
                }
            }

            for target in previous.difference(&current) {
                report.retired += self.retire(ctx, *target, master.token);
            }
            self.fanout.insert(master.token, current);
        }

        let orphaned: Vec<EffectToken> = self
            .fanout
            .keys()
            .filter(|token| !live.contains(token))
            .copied()
            .collect();
        for token in orphaned {
            let targets = self.fanout.remove(&token).unwrap_or_default();
            for target in targets {
                report.retired += self.retire(ctx, target, token);
            }
        }

        report
    }

    /// Remove every child this unit has placed. Used when the unit leaves
    /// the world and will not run another pass.
    pub fn retire_all(&mut self, ctx: &PropagationContext<'_>) -> PropagationReport {
        let mut report = PropagationReport::default();
        for (token, targets) in std::mem::take(&mut self.fanout) {
            for target in targets {
                report.retired += self.retire(ctx, target, token);
            }
        }
        report
    }

    fn retire(&self, ctx: &PropagationContext<'_>, target: UnitId, token: EffectToken) -> usize {
        match ctx.directory.get(&target) {
            Some(handle) => {
                handle.remove(RemovalTarget::Token(token));
                1
            }
            None => 0,
        }
    }
}
