//! Effect builder
//!
//! Resolves catalog defaults for an effect type and overlays caller
//! overrides. Building has no side effects beyond allocation; handing the
//! result to a registry is a separate step.

use std::sync::Arc;
use std::time::Duration;

use super::{AuraSpec, EffectError, EffectInstance, EffectKind, EffectState};
use crate::catalog::EffectCatalog;
use crate::ids::{EffectId, EffectToken, EffectType, UnitId};
use crate::modifier::{ModifierSet, PropertyModifier};
use crate::propagation::PropagationStrategy;

#[derive(Debug, Clone)]
pub struct EffectBuilder {
    catalog: Arc<EffectCatalog>,
    effect_type: Option<EffectType>,
    owner: Option<UnitId>,
    source: Option<UnitId>,
    /// `Some(None)` forces a permanent effect
    duration: Option<Option<Duration>>,
    duration_factor: f64,
    modifiers: Vec<PropertyModifier>,
    radius: Option<f64>,
    strategy: Option<PropagationStrategy>,
    token: Option<EffectToken>,
    enabled: bool,
    propagation: Option<Propagation>,
}

/// Child-of-aura details, set only by the propagator
#[derive(Debug, Clone)]
struct Propagation {
    origin: UnitId,
    master: EffectId,
    modifiers: ModifierSet,
}

impl EffectBuilder {
    pub fn new(catalog: Arc<EffectCatalog>) -> Self {
        Self {
            catalog,
            effect_type: None,
            owner: None,
            source: None,
            duration: None,
            duration_factor: 1.0,
            modifiers: Vec::new(),
            radius: None,
            strategy: None,
            token: None,
            enabled: true,
            propagation: None,
        }
    }

    /// Builder for the child an aura master places on `target`
    pub(crate) fn propagated(
        catalog: Arc<EffectCatalog>,
        master: &EffectInstance,
        spec: &AuraSpec,
        target: UnitId,
    ) -> Self {
        let mut builder = Self::new(catalog)
            .set_type(spec.propagated_type)
            .set_owner(target)
            .set_source(master.owner)
            .with_token(master.token)
            .permanent();
        builder.enabled = master.modifiers_enabled;
        builder.propagation = Some(Propagation {
            origin: master.owner,
            master: master.id,
            modifiers: master.modifiers.clone(),
        });
        builder
    }

    pub fn set_type(mut self, effect_type: EffectType) -> Self {
        self.effect_type = Some(effect_type);
        self
    }

    pub fn set_owner(mut self, owner: UnitId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn set_source(mut self, source: UnitId) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the catalog's default duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(Some(duration));
        self
    }

    /// Never expire, regardless of the catalog default
    pub fn permanent(mut self) -> Self {
        self.duration = Some(None);
        self
    }

    /// Scale the resolved duration (e.g. 0.5 halves it)
    pub fn with_duration_modifier(mut self, factor: f64) -> Self {
        if factor.is_finite() && factor >= 0.0 {
            self.duration_factor *= factor;
        }
        self
    }

    /// Overlay a modifier on the catalog defaults. A modifier for a field the
    /// defaults already cover is folded into the default.
    pub fn with_property_modifier(mut self, modifier: PropertyModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Propagation radius. On its own this makes the effect a radius aura;
    /// combined with a membership strategy it adds a range check.
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius.max(0.0));
        self
    }

    pub fn with_propagation_strategy(mut self, strategy: PropagationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Reuse an existing token so a re-apply refreshes instead of stacking
    pub fn with_token(mut self, token: EffectToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Start with modifiers suspended
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn effect_type(&self) -> Option<EffectType> {
        self.effect_type
    }

    pub fn owner(&self) -> Option<UnitId> {
        self.owner
    }

    pub fn token(&self) -> Option<EffectToken> {
        self.token
    }

    pub fn catalog(&self) -> &Arc<EffectCatalog> {
        &self.catalog
    }

    /// Resolve into a `Pending` instance
    pub fn build(self) -> Result<EffectInstance, EffectError> {
        let effect_type = self.effect_type.ok_or(EffectError::MissingType)?;
        let owner = self.owner.ok_or(EffectError::MissingOwner)?;
        let info = self
            .catalog
            .effect(effect_type)
            .ok_or(EffectError::UnknownEffectType(effect_type))?;

        let duration = self
            .duration
            .unwrap_or(info.duration)
            .map(|d| scale_duration(d, self.duration_factor));

        let (modifiers, kind) = match self.propagation {
            Some(propagation) => (
                propagation.modifiers,
                EffectKind::Propagated {
                    origin: propagation.origin,
                    master: propagation.master,
                },
            ),
            None => {
                let mut modifiers = info.modifiers.clone();
                for modifier in self.modifiers {
                    modifiers.insert(modifier);
                }
                let strategy = resolve_strategy(self.strategy, self.radius, info.aura_radius);
                let kind = match strategy {
                    Some(strategy) => EffectKind::Aura(AuraSpec {
                        strategy,
                        propagated_type: info.propagated_type,
                    }),
                    None => EffectKind::Standard,
                };
                (modifiers, kind)
            }
        };

        Ok(EffectInstance {
            id: EffectId::mint(),
            effect_type,
            category: info.category,
            token: self.token.unwrap_or_else(EffectToken::mint),
            owner,
            source: self.source,
            duration,
            expires_at: None,
            modifiers_enabled: self.enabled,
            modifiers,
            kind,
            display: info.display,
            state: EffectState::Pending,
        })
    }
}

/// Combine an explicit strategy, an explicit radius and the catalog radius.
fn resolve_strategy(
    strategy: Option<PropagationStrategy>,
    radius: Option<f64>,
    catalog_radius: f64,
) -> Option<PropagationStrategy> {
    match (strategy, radius) {
        (Some(strategy), Some(radius)) => Some(strategy.with_range(radius)),
        (Some(strategy), None) => Some(strategy),
        (None, Some(radius)) if radius > 0.0 => Some(PropagationStrategy::Radius { radius }),
        (None, Some(_)) => None,
        (None, None) if catalog_radius > 0.0 => Some(PropagationStrategy::Radius {
            radius: catalog_radius,
        }),
        (None, None) => None,
    }
}

/// Saturates at `Duration::MAX` instead of overflowing
fn scale_duration(duration: Duration, factor: f64) -> Duration {
    if factor == 1.0 || duration.is_zero() {
        return duration;
    }
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRows;
    use crate::ids::GroupId;
    use crate::modifier::{FieldId, FormulaKind};

    fn make_catalog() -> Arc<EffectCatalog> {
        let rows: CatalogRows = toml::from_str(
            r#"
            [[field]]
            name = "speed"
            [[field]]
            name = "armor"

            [[effect]]
            id = 1
            name = "haste"
            duration_ms = 1000
            modifiers = [{ field = "speed", formula = "multiply", value = 2.0 }]

            [[effect]]
            id = 2
            name = "beacon"
            aura_radius = 25.0
            "#,
        )
        .unwrap();
        Arc::new(EffectCatalog::from_rows(rows).unwrap())
    }

    #[test]
    fn test_build_uses_catalog_defaults() {
        let effect = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(9))
            .build()
            .unwrap();

        assert_eq!(effect.state, EffectState::Pending);
        assert_eq!(effect.owner, UnitId(9));
        assert_eq!(effect.duration, Some(Duration::from_millis(1000)));
        assert_eq!(effect.kind, EffectKind::Standard);
        assert_eq!(effect.modifiers.len(), 1);
    }

    #[test]
    fn test_overrides_overlay_defaults() {
        let effect = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_duration(Duration::from_millis(400))
            .with_duration_modifier(0.5)
            .with_property_modifier(PropertyModifier::add(FieldId(0), 3.0))
            .with_property_modifier(PropertyModifier::add(FieldId(1), 5.0))
            .build()
            .unwrap();

        assert_eq!(effect.duration, Some(Duration::from_millis(200)));
        // Folded into the default multiply: 2.0 * 3.0
        let speed = effect.modifiers.get(FieldId(0)).unwrap();
        assert_eq!(speed.formula, FormulaKind::Multiply);
        assert_eq!(speed.value, 6.0);
        assert_eq!(effect.modifiers.get(FieldId(1)).unwrap().value, 5.0);
    }

    #[test]
    fn test_tokens_are_fresh_unless_reused() {
        let catalog = make_catalog();
        let first = EffectBuilder::new(catalog.clone())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .build()
            .unwrap();
        let second = EffectBuilder::new(catalog.clone())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .build()
            .unwrap();
        let reused = EffectBuilder::new(catalog)
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_token(first.token)
            .build()
            .unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(first.token, reused.token);
        assert_ne!(first.id, reused.id);
    }

    #[test]
    fn test_catalog_radius_makes_an_aura() {
        let effect = EffectBuilder::new(make_catalog())
            .set_type(EffectType(2))
            .set_owner(UnitId(1))
            .build()
            .unwrap();

        let spec = effect.aura().unwrap();
        assert_eq!(spec.strategy, PropagationStrategy::Radius { radius: 25.0 });
        assert_eq!(spec.propagated_type, EffectType(2));
    }

    #[test]
    fn test_radius_on_membership_strategy_sets_range() {
        let effect = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_propagation_strategy(PropagationStrategy::group(GroupId(4)))
            .with_radius(60.0)
            .build()
            .unwrap();

        assert_eq!(
            effect.aura().unwrap().strategy,
            PropagationStrategy::GroupMembership {
                group: GroupId(4),
                range: 60.0
            }
        );
    }

    #[test]
    fn test_extreme_durations_saturate() {
        let longest = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_duration(Duration::MAX)
            .build()
            .unwrap();
        assert_eq!(longest.duration, Some(Duration::MAX));

        let scaled = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_duration(Duration::MAX)
            .with_duration_modifier(2.0)
            .build()
            .unwrap();
        assert_eq!(scaled.duration, Some(Duration::MAX));

        let stacked = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_duration_modifier(1e300)
            .with_duration_modifier(1e300)
            .build()
            .unwrap();
        assert_eq!(stacked.duration, Some(Duration::MAX));

        let instant = EffectBuilder::new(make_catalog())
            .set_type(EffectType(1))
            .set_owner(UnitId(1))
            .with_duration(Duration::ZERO)
            .with_duration_modifier(1e300)
            .with_duration_modifier(1e300)
            .build()
            .unwrap();
        assert_eq!(instant.duration, Some(Duration::ZERO));
    }

    #[test]
    fn test_build_errors() {
        let catalog = make_catalog();
        assert_eq!(
            EffectBuilder::new(catalog.clone()).set_owner(UnitId(1)).build(),
            Err(EffectError::MissingType)
        );
        assert_eq!(
            EffectBuilder::new(catalog.clone()).set_type(EffectType(1)).build(),
            Err(EffectError::MissingOwner)
        );
        assert_eq!(
            EffectBuilder::new(catalog)
                .set_type(EffectType(77))
                .set_owner(UnitId(1))
                .build(),
            Err(EffectError::UnknownEffectType(EffectType(77)))
        );
    }
}
