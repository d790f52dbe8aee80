//! Per-unit effect registry
//!
//! The registry exclusively owns a unit's active effect set. It is split in
//! two halves:
//!
//! - `RegistryHandle`: cloneable, usable from any thread. `apply`, `remove`
//!   and `set_enabled` enqueue requests on an unbounded channel and never
//!   block; `effects` loads the latest published snapshot without locking.
//! - `EffectRegistry`: the single consumer. `reconcile` is called exactly once
//!   per tick by the unit's own simulation step and is the only place the
//!   working set changes.
//!
//! # Reconciliation order
//!
//! ```text
//!   drain queue ─► removals (expired first) ─► enable toggles ─► creations
//!        │                                                          │
//!        └── a token removal cancels earlier applies in the batch   │
//!                                                                   ▼
//!   notify sinks ◄─ schedule expiries ◄─ advance clock ◄─ publish snapshot
//! ```
//!
//! Cap checks run against the working set as it stands when each creation
//! is processed, so a slot freed by a removal or expiry in the same batch is
//! available to a creation in that batch.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use hashbrown::HashMap;

use super::{
    ChangeSink, EffectBuilder, EffectChange, EffectError, EffectInstance, EffectSnapshot, SimTime,
};
use crate::catalog::{EffectCatalog, EffectCategory};
use crate::ids::{EffectId, EffectToken, EffectType, UnitId};
use crate::modifier::FieldId;

// ═══════════════════════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════════════════════

/// What a removal request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalTarget {
    /// Every instance carrying the token
    Token(EffectToken),
    /// One specific instance
    Instance(EffectId),
}

impl From<EffectToken> for RemovalTarget {
    fn from(token: EffectToken) -> Self {
        Self::Token(token)
    }
}

impl From<EffectId> for RemovalTarget {
    fn from(id: EffectId) -> Self {
        Self::Instance(id)
    }
}

/// Result of one application, resolved at reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Admitted(EffectId),
    /// Same token was already active; its timer was restarted
    Refreshed(EffectId),
    /// A category the effect belongs to was already at its cap
    RejectedCapacity { bit: u8 },
    /// An aura child with this token is already present
    DuplicateAura(EffectId),
    /// Retracted by a token removal before reconciliation
    Cancelled,
}

#[derive(Debug)]
enum Request {
    Apply {
        effect: EffectInstance,
        reply: Option<Sender<ApplyOutcome>>,
    },
    Remove(RemovalTarget),
    SetEnabled {
        token: EffectToken,
        enabled: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════════════════════

/// Thread-safe entry point to one unit's registry.
///
/// Requests sent after the registry is dropped are discarded.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    unit: UnitId,
    catalog: Arc<EffectCatalog>,
    requests: Sender<Request>,
    published: Arc<ArcSwap<EffectSnapshot>>,
}

impl RegistryHandle {
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn catalog(&self) -> &Arc<EffectCatalog> {
        &self.catalog
    }

    /// Builder pre-set with this unit as owner
    pub fn builder(&self, effect_type: EffectType) -> EffectBuilder {
        EffectBuilder::new(self.catalog.clone())
            .set_type(effect_type)
            .set_owner(self.unit)
    }

    /// Enqueue an application. The instance is always owned by this unit.
    ///
    /// Returns the token of the application; whether it was admitted is only
    /// visible in a later snapshot.
    pub fn apply(&self, builder: EffectBuilder) -> Result<EffectToken, EffectError> {
        let effect = builder.set_owner(self.unit).build()?;
        let token = effect.token;
        self.send(Request::Apply {
            effect,
            reply: None,
        });
        Ok(token)
    }

    /// Like `apply`, but also yields the outcome once reconciled
    pub fn apply_with_outcome(
        &self,
        builder: EffectBuilder,
    ) -> Result<Receiver<ApplyOutcome>, EffectError> {
        let effect = builder.set_owner(self.unit).build()?;
        let (reply, outcome) = crossbeam_channel::bounded(1);
        self.send(Request::Apply {
            effect,
            reply: Some(reply),
        });
        Ok(outcome)
    }

    pub fn remove(&self, target: impl Into<RemovalTarget>) {
        self.send(Request::Remove(target.into()));
    }

    /// Suspend or resume the modifiers of every instance carrying `token`
    pub fn set_enabled(&self, token: EffectToken, enabled: bool) {
        self.send(Request::SetEnabled { token, enabled });
    }

    /// Most recently published snapshot
    pub fn effects(&self) -> Arc<EffectSnapshot> {
        self.published.load_full()
    }

    /// Whether requests are waiting for the next reconciliation
    pub fn has_pending(&self) -> bool {
        !self.requests.is_empty()
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            tracing::debug!(unit = %self.unit, "Registry no longer exists, request dropped");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════

/// What one reconciliation did
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Transitions in processing order
    pub changes: Vec<EffectChange>,
    /// Fields whose derived value may have changed
    pub touched_fields: BTreeSet<FieldId>,
    pub admitted: usize,
    pub refreshed: usize,
    pub rejected: usize,
    pub removed: usize,
    /// Instances that expired and will be removed next reconciliation
    pub expiring: usize,
    /// Whether a new snapshot was published
    pub published: bool,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

pub struct EffectRegistry {
    unit: UnitId,
    catalog: Arc<EffectCatalog>,
    receiver: Receiver<Request>,
    handle: RegistryHandle,
    working: BTreeMap<EffectId, Arc<EffectInstance>>,
    /// Scheduled for removal at the next reconciliation
    expired: Vec<EffectId>,
    now: SimTime,
    version: u64,
    sinks: Vec<Arc<dyn ChangeSink>>,
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("unit", &self.unit)
            .field("active", &self.working.len())
            .field("expired", &self.expired)
            .field("now", &self.now)
            .field("version", &self.version)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EffectRegistry {
    pub fn new(unit: UnitId, catalog: Arc<EffectCatalog>) -> Self {
        let (requests, receiver) = crossbeam_channel::unbounded();
        let published = Arc::new(ArcSwap::from_pointee(EffectSnapshot::empty(unit)));
        let handle = RegistryHandle {
            unit,
            catalog: catalog.clone(),
            requests,
            published,
        };

        Self {
            unit,
            catalog,
            receiver,
            handle,
            working: BTreeMap::new(),
            expired: Vec::new(),
            now: SimTime::ZERO,
            version: 0,
            sinks: Vec::new(),
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn handle(&self) -> RegistryHandle {
        self.handle.clone()
    }

    /// Registry clock
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn effects(&self) -> Arc<EffectSnapshot> {
        self.handle.effects()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ChangeSink>) {
        self.sinks.push(sink);
    }

    pub fn apply(&self, builder: EffectBuilder) -> Result<EffectToken, EffectError> {
        self.handle.apply(builder)
    }

    pub fn remove(&self, target: impl Into<RemovalTarget>) {
        self.handle.remove(target);
    }

    /// Merge every queued request into the working set, publish, then
    /// advance the clock by `dt`.
    ///
    /// Takes `&mut self`, so it can never run concurrently with itself.
    pub fn reconcile(&mut self, dt: Duration) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut removals = Vec::new();
        let mut toggles = Vec::new();
        let mut creations: Vec<Option<(EffectInstance, Option<Sender<ApplyOutcome>>)>> =
            Vec::new();
        let mut queued_by_token: HashMap<EffectToken, Vec<usize>> = HashMap::new();

        for request in self.receiver.try_iter() {
            match request {
                Request::Apply { effect, reply } => {
                    queued_by_token
                        .entry(effect.token)
                        .or_default()
                        .push(creations.len());
                    creations.push(Some((effect, reply)));
                }
                Request::Remove(target) => {
                    if let RemovalTarget::Token(token) = target {
                        for idx in queued_by_token.remove(&token).unwrap_or_default() {
                            if let Some((_, reply)) = creations[idx].take() {
                                tracing::debug!(
                                    unit = %self.unit,
                                    %token,
                                    "Application retracted before reconciliation"
                                );
                                send_outcome(reply, ApplyOutcome::Cancelled);
                            }
                        }
                    }
                    removals.push(target);
                }
                Request::SetEnabled { token, enabled } => toggles.push((token, enabled)),
            }
        }

        // ─── Removals ───────────────────────────────────────────────────────
        for id in std::mem::take(&mut self.expired) {
            self.evict(id, &mut report);
        }
        for target in removals {
            let evicted = match target {
                RemovalTarget::Instance(id) => usize::from(self.evict(id, &mut report)),
                RemovalTarget::Token(token) => {
                    let ids: Vec<EffectId> = self
                        .working
                        .values()
                        .filter(|e| e.token == token)
                        .map(|e| e.id)
                        .collect();
                    ids.into_iter()
                        .filter(|id| self.evict(*id, &mut report))
                        .count()
                }
            };
            if evicted == 0 {
                tracing::debug!(unit = %self.unit, ?target, "Removal target not present, dropped");
            }
        }

        // ─── Enable toggles ─────────────────────────────────────────────────
        for (token, enabled) in toggles {
            self.toggle(token, enabled, &mut report);
        }

        // ─── Creations ──────────────────────────────────────────────────────
        for (effect, reply) in creations.into_iter().flatten() {
            let outcome = self.admit(effect, &mut report);
            send_outcome(reply, outcome);
        }

        if report.has_changes() {
            self.publish();
            report.published = true;
        }

        // ─── Tick ───────────────────────────────────────────────────────────
        self.now = self.now.after(dt);
        self.expired = self
            .working
            .values()
            .filter(|e| e.has_expired(self.now))
            .map(|e| e.id)
            .collect();
        report.expiring = self.expired.len();

        for change in &report.changes {
            for sink in &self.sinks {
                sink.publish(change);
            }
        }

        report
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = EffectSnapshot::new(
            self.unit,
            self.version,
            self.now,
            self.working.values().cloned().collect(),
        );
        self.handle.published.store(Arc::new(snapshot));
    }

    /// Remove one instance from the working set. Returns false if absent.
    fn evict(&mut self, id: EffectId, report: &mut ReconcileReport) -> bool {
        let Some(effect) = self.working.remove(&id) else {
            return false;
        };
        report.touched_fields.extend(effect.active_fields());
        report
            .changes
            .push(EffectChange::from_instance(&effect.removed(), self.now, false));
        report.removed += 1;
        true
    }

    fn toggle(&mut self, token: EffectToken, enabled: bool, report: &mut ReconcileReport) {
        let targets: Vec<Arc<EffectInstance>> = self
            .working
            .values()
            .filter(|e| e.token == token && e.modifiers_enabled != enabled)
            .cloned()
            .collect();

        if targets.is_empty() && !self.working.values().any(|e| e.token == token) {
            tracing::debug!(unit = %self.unit, %token, "Toggle target not present, dropped");
        }

        for effect in targets {
            let next = Arc::new(effect.with_modifiers_enabled(enabled));
            report.touched_fields.extend(next.modifiers.fields());
            report
                .changes
                .push(EffectChange::from_instance(&next, self.now, true));
            self.working.insert(next.id, next);
        }
    }

    fn admit(&mut self, mut effect: EffectInstance, report: &mut ReconcileReport) -> ApplyOutcome {
        let existing = self
            .working
            .values()
            .find(|e| e.token == effect.token)
            .cloned();

        if let Some(existing) = existing {
            if existing.is_propagated() || effect.is_propagated() {
                tracing::debug!(
                    unit = %self.unit,
                    token = %effect.token,
                    "Aura child already present, request dropped"
                );
                return ApplyOutcome::DuplicateAura(existing.id);
            }

            let refreshed = Arc::new(existing.refreshed(self.now, effect.duration));
            tracing::debug!(
                unit = %self.unit,
                token = %effect.token,
                effect = %existing.id,
                "Effect refreshed"
            );
            report
                .changes
                .push(EffectChange::from_instance(&refreshed, self.now, true));
            self.working.insert(refreshed.id, refreshed);
            report.refreshed += 1;
            return ApplyOutcome::Refreshed(existing.id);
        }

        if let Some(bit) = self.saturated_bit(effect.category) {
            tracing::debug!(
                unit = %self.unit,
                token = %effect.token,
                effect_type = %effect.effect_type,
                bit,
                "Category cap reached, application rejected"
            );
            report.rejected += 1;
            return ApplyOutcome::RejectedCapacity { bit };
        }

        effect.activate(self.now);
        let id = effect.id;
        tracing::debug!(
            unit = %self.unit,
            token = %effect.token,
            effect_type = %effect.effect_type,
            effect = %id,
            "Effect admitted"
        );
        report.touched_fields.extend(effect.active_fields());
        report
            .changes
            .push(EffectChange::from_instance(&effect, self.now, true));
        self.working.insert(id, Arc::new(effect));
        report.admitted += 1;
        ApplyOutcome::Admitted(id)
    }

    /// First category bit of `category` whose cap is already reached
    fn saturated_bit(&self, category: EffectCategory) -> Option<u8> {
        category.bits().find(|bit| {
            let max_level = self.catalog.max_level(*bit) as usize;
            if max_level == 0 {
                return false;
            }
            let mask = EffectCategory::bit(*bit);
            let active = self
                .working
                .values()
                .filter(|e| e.category.intersects(mask))
                .count();
            active >= max_level
        })
    }
}

fn send_outcome(reply: Option<Sender<ApplyOutcome>>, outcome: ApplyOutcome) {
    if let Some(reply) = reply {
        // The caller may have stopped listening
        let _ = reply.try_send(outcome);
    }
}
