//! Scenario files for the simulation harness
//!
//! A scenario declares the units of a world and a timeline of actions:
//!
//! ```toml
//! [[unit]]
//! id = 1
//! position = [0.0, 0.0, 0.0]
//! group = 1
//! properties = { armor = 100.0 }
//! equipment = [{ field = "armor", formula = "add", value = 10.0 }]
//!
//! [[action]]
//! tick = 0
//! action = "apply"
//! unit = 1
//! effect = "ward"
//! label = "ward-a"
//!
//! [[action]]
//! tick = 5
//! action = "remove"
//! label = "ward-a"
//! ```
//!
//! Actions with `tick = n` run just before the world's n-th tick (0-based).
//! Rows are resolved against the catalog when loaded, so a scenario that
//! names an unknown effect, field or unit never starts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use halo_core::catalog::ModifierRow;
use halo_core::{
    EffectCatalog, EffectError, EffectToken, EffectType, FormulaKind, GroupId, OrgId, Placement,
    PropagationStrategy, PropertyModifier, StaticProperties, UnitId, World,
};
use halo_types::Position;
use serde::Deserialize;

use crate::error::ScenarioError;

// ═══════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct UnitRow {
    pub id: u64,
    #[serde(default)]
    pub position: [f64; 3],
    #[serde(default)]
    pub group: Option<u64>,
    #[serde(default)]
    pub organization: Option<u64>,
    /// Base values by field name
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    #[serde(default)]
    pub equipment: Vec<ModifierRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Apply,
    Remove,
    SetEnabled,
    Move,
    JoinGroup,
    LeaveGroup,
    SetOrg,
    Despawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Radius,
    Group,
    Organization,
}

/// One timeline entry. Which optional parameters are required depends on
/// `action`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRow {
    #[serde(default)]
    pub tick: u64,
    pub action: ActionKind,
    #[serde(default)]
    pub unit: Option<u64>,
    #[serde(default)]
    pub effect: Option<String>,
    /// Names an application so later actions can refer to its token
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub source: Option<u64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    #[serde(default)]
    pub group: Option<u64>,
    #[serde(default)]
    pub organization: Option<u64>,
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioRows {
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitRow>,
    #[serde(default, rename = "action")]
    pub actions: Vec<ActionRow>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Resolved Scenario
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct UnitSpec {
    pub id: UnitId,
    pub placement: Placement,
    pub properties: StaticProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Apply {
        unit: UnitId,
        effect: EffectType,
        label: Option<String>,
        source: Option<UnitId>,
        duration: Option<Duration>,
        radius: Option<f64>,
        strategy: Option<PropagationStrategy>,
    },
    Remove { label: String },
    SetEnabled { label: String, enabled: bool },
    Move { unit: UnitId, position: Position },
    JoinGroup { unit: UnitId, group: GroupId },
    LeaveGroup { unit: UnitId },
    SetOrg { unit: UnitId, organization: Option<OrgId> },
    Despawn { unit: UnitId },
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub units: Vec<UnitSpec>,
    /// Sorted by tick; declaration order within a tick
    pub actions: Vec<(u64, Action)>,
}

impl Scenario {
    pub fn load(path: &Path, catalog: &EffectCatalog) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let rows: ScenarioRows =
            toml::from_str(&content).map_err(|source| ScenarioError::ParseToml {
                path: path.to_path_buf(),
                source,
            })?;

        let scenario = Self::from_rows(rows, catalog)?;
        tracing::info!(
            path = %path.display(),
            units = scenario.units.len(),
            actions = scenario.actions.len(),
            "Scenario loaded"
        );
        Ok(scenario)
    }

    pub fn from_rows(rows: ScenarioRows, catalog: &EffectCatalog) -> Result<Self, ScenarioError> {
        let mut declared = BTreeSet::new();
        let mut units = Vec::with_capacity(rows.units.len());
        for row in rows.units {
            if !declared.insert(row.id) {
                return Err(ScenarioError::DuplicateUnit { unit: row.id });
            }
            units.push(resolve_unit(row, catalog)?);
        }

        let labels: BTreeSet<&str> = rows
            .actions
            .iter()
            .filter(|row| row.action == ActionKind::Apply)
            .filter_map(|row| row.label.as_deref())
            .collect();

        let mut actions = Vec::with_capacity(rows.actions.len());
        for (index, row) in rows.actions.iter().enumerate() {
            let action = resolve_action(index, row, catalog, &declared, &labels)?;
            actions.push((row.tick, action));
        }
        actions.sort_by_key(|(tick, _)| *tick);

        Ok(Self { units, actions })
    }

    pub fn last_tick(&self) -> u64 {
        self.actions.last().map(|(tick, _)| *tick).unwrap_or(0)
    }
}

fn resolve_unit(row: UnitRow, catalog: &EffectCatalog) -> Result<UnitSpec, ScenarioError> {
    let mut properties = StaticProperties::new();
    for (name, value) in &row.properties {
        let field = catalog
            .field_id(name)
            .ok_or_else(|| ScenarioError::UnknownField {
                unit: row.id,
                field: name.clone(),
            })?;
        properties.set_base(field, *value);
    }

    for modifier in &row.equipment {
        let field = catalog
            .field_id(&modifier.field)
            .ok_or_else(|| ScenarioError::UnknownField {
                unit: row.id,
                field: modifier.field.clone(),
            })?;
        let formula =
            FormulaKind::from_str(&modifier.formula).map_err(|_| ScenarioError::UnknownFormula {
                unit: row.id,
                formula: modifier.formula.clone(),
            })?;
        properties.add_equipment(PropertyModifier::new(field, formula, modifier.value));
    }

    let mut placement = Placement::at(Position::from(row.position));
    if let Some(group) = row.group {
        placement = placement.in_group(GroupId(group));
    }
    if let Some(org) = row.organization {
        placement = placement.in_organization(OrgId(org));
    }

    Ok(UnitSpec {
        id: UnitId(row.id),
        placement,
        properties,
    })
}

fn resolve_action(
    index: usize,
    row: &ActionRow,
    catalog: &EffectCatalog,
    declared: &BTreeSet<u64>,
    labels: &BTreeSet<&str>,
) -> Result<Action, ScenarioError> {
    let unit = || -> Result<UnitId, ScenarioError> {
        let unit = row.unit.ok_or(ScenarioError::MissingParameter {
            index,
            parameter: "unit",
        })?;
        if !declared.contains(&unit) {
            return Err(ScenarioError::UnknownUnit { index, unit });
        }
        Ok(UnitId(unit))
    };
    let label = || -> Result<String, ScenarioError> {
        let label = row.label.clone().ok_or(ScenarioError::MissingParameter {
            index,
            parameter: "label",
        })?;
        if !labels.contains(label.as_str()) {
            return Err(ScenarioError::UnknownLabel { index, label });
        }
        Ok(label)
    };
    let missing = |parameter| ScenarioError::MissingParameter { index, parameter };

    let action = match row.action {
        ActionKind::Apply => {
            let name = row.effect.as_deref().ok_or(missing("effect"))?;
            let effect = catalog
                .effect_by_name(name)
                .ok_or_else(|| ScenarioError::UnknownEffect {
                    index,
                    name: name.to_string(),
                })?
                .effect_type;
            let strategy = match row.strategy {
                None => None,
                Some(StrategyKind::Radius) => {
                    Some(PropagationStrategy::radius(row.radius.ok_or(missing("radius"))?))
                }
                Some(StrategyKind::Group) => Some(PropagationStrategy::group(GroupId(
                    row.group.ok_or(missing("group"))?,
                ))),
                Some(StrategyKind::Organization) => Some(PropagationStrategy::organization()),
            };
            let source = match row.source {
                Some(source) if !declared.contains(&source) => {
                    return Err(ScenarioError::UnknownUnit {
                        index,
                        unit: source,
                    });
                }
                other => other.map(UnitId),
            };
            Action::Apply {
                unit: unit()?,
                effect,
                label: row.label.clone(),
                source,
                duration: row.duration_ms.map(Duration::from_millis),
                radius: row.radius,
                strategy,
            }
        }
        ActionKind::Remove => Action::Remove { label: label()? },
        ActionKind::SetEnabled => Action::SetEnabled {
            label: label()?,
            enabled: row.enabled.ok_or(missing("enabled"))?,
        },
        ActionKind::Move => Action::Move {
            unit: unit()?,
            position: Position::from(row.position.ok_or(missing("position"))?),
        },
        ActionKind::JoinGroup => Action::JoinGroup {
            unit: unit()?,
            group: GroupId(row.group.ok_or(missing("group"))?),
        },
        ActionKind::LeaveGroup => Action::LeaveGroup { unit: unit()? },
        ActionKind::SetOrg => Action::SetOrg {
            unit: unit()?,
            organization: row.organization.map(OrgId),
        },
        ActionKind::Despawn => Action::Despawn { unit: unit()? },
    };
    Ok(action)
}

// ═══════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════

/// Feeds a scenario's timeline into a world
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    cursor: usize,
    /// Applied labels and the unit/token they resolved to
    labels: HashMap<String, (UnitId, EffectToken)>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            cursor: 0,
            labels: HashMap::new(),
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn spawn_units(&self, world: &mut World) {
        for spec in &self.scenario.units {
            world.spawn(spec.id, spec.placement, Box::new(spec.properties.clone()));
        }
    }

    /// Run every action scheduled at or before `tick` that has not run yet.
    /// Returns how many ran.
    pub fn run_due(&mut self, world: &mut World, tick: u64) -> Result<usize, EffectError> {
        let mut ran = 0;
        while let Some((at, action)) = self.scenario.actions.get(self.cursor) {
            if *at > tick {
                break;
            }
            let action = action.clone();
            self.cursor += 1;
            self.run(world, action)?;
            ran += 1;
        }
        Ok(ran)
    }

    fn run(&mut self, world: &mut World, action: Action) -> Result<(), EffectError> {
        tracing::debug!(?action, "Running scenario action");
        match action {
            Action::Apply {
                unit,
                effect,
                label,
                source,
                duration,
                radius,
                strategy,
            } => {
                let mut builder = world.builder(effect);
                if let Some(source) = source {
                    builder = builder.set_source(source);
                }
                if let Some(duration) = duration {
                    builder = builder.with_duration(duration);
                }
                if let Some(strategy) = strategy {
                    builder = builder.with_propagation_strategy(strategy);
                }
                if let Some(radius) = radius {
                    builder = builder.with_radius(radius);
                }
                // Reapplying a label on the same unit refreshes it
                let previous = label.as_ref().and_then(|l| self.labels.get(l));
                if let Some((_, token)) = previous.filter(|(applied_to, _)| *applied_to == unit) {
                    builder = builder.with_token(*token);
                }

                let token = world.apply(unit, builder)?;
                if let Some(label) = label {
                    self.labels.insert(label, (unit, token));
                }
            }
            Action::Remove { label } => match self.labels.get(&label) {
                Some((unit, token)) => world.remove(*unit, *token),
                None => tracing::debug!(%label, "Label not applied yet, removal skipped"),
            },
            Action::SetEnabled { label, enabled } => match self.labels.get(&label) {
                Some((unit, token)) => {
                    if let Some(handle) = world.handle(*unit) {
                        handle.set_enabled(*token, enabled);
                    }
                }
                None => tracing::debug!(%label, "Label not applied yet, toggle skipped"),
            },
            Action::Move { unit, position } => {
                world.state_mut().set_position(unit, position);
            }
            Action::JoinGroup { unit, group } => {
                world.state_mut().join_group(unit, group);
            }
            Action::LeaveGroup { unit } => {
                world.state_mut().leave_group(unit);
            }
            Action::SetOrg { unit, organization } => {
                world.state_mut().set_organization(unit, organization);
            }
            Action::Despawn { unit } => {
                world.despawn(unit);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::catalog::CatalogRows;
    use halo_core::{FieldId, WorldView};
    use halo_types::EngineConfig;
    use std::sync::Arc;

    fn make_catalog() -> Arc<EffectCatalog> {
        let rows: CatalogRows = toml::from_str(
            r#"
            [[field]]
            name = "armor"

            [[effect]]
            id = 1
            name = "ward"
            aura_radius = 50.0
            modifiers = [{ field = "armor", formula = "add", value = 10.0 }]
            "#,
        )
        .unwrap();
        Arc::new(EffectCatalog::from_rows(rows).unwrap())
    }

    fn parse(text: &str, catalog: &EffectCatalog) -> Result<Scenario, ScenarioError> {
        Scenario::from_rows(toml::from_str(text).unwrap(), catalog)
    }

    const SCENARIO: &str = r#"
        [[unit]]
        id = 1
        properties = { armor = 100.0 }
        equipment = [{ field = "armor", formula = "add", value = 5.0 }]

        [[unit]]
        id = 2
        position = [30.0, 0.0, 0.0]
        properties = { armor = 100.0 }

        [[action]]
        tick = 3
        action = "move"
        unit = 2
        position = [300.0, 0.0, 0.0]

        [[action]]
        tick = 0
        action = "apply"
        unit = 1
        effect = "ward"
        label = "ward"
        "#;

    #[test]
    fn test_actions_are_sorted_by_tick() {
        let scenario = parse(SCENARIO, &make_catalog()).unwrap();
        assert_eq!(scenario.units.len(), 2);
        assert_eq!(scenario.actions[0].0, 0);
        assert!(matches!(scenario.actions[0].1, Action::Apply { .. }));
        assert_eq!(scenario.last_tick(), 3);
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let catalog = make_catalog();

        let err = parse(
            "[[action]]\naction = \"apply\"\nunit = 1\neffect = \"ward\"",
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownUnit { unit: 1, .. }));

        let err = parse(
            "[[unit]]\nid = 1\n[[action]]\naction = \"apply\"\nunit = 1\neffect = \"nope\"",
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownEffect { .. }));

        let err = parse("[[action]]\naction = \"remove\"\nlabel = \"x\"", &catalog).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownLabel { .. }));

        let err = parse("[[unit]]\nid = 1\nproperties = { mana = 1.0 }", &catalog).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownField { .. }));

        let err = parse("[[unit]]\nid = 1\n[[action]]\naction = \"move\"\nunit = 1", &catalog)
            .unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::MissingParameter {
                parameter: "position",
                ..
            }
        ));
    }

    #[test]
    fn test_runner_drives_world() {
        let catalog = make_catalog();
        let scenario = parse(SCENARIO, &catalog).unwrap();
        let mut world = World::new(EngineConfig::default(), catalog);
        let mut runner = ScenarioRunner::new(scenario);
        runner.spawn_units(&mut world);

        for tick in 0..5 {
            runner.run_due(&mut world, tick).unwrap();
            world.tick();
            if tick == 1 {
                assert_eq!(world.property(UnitId(2), FieldId(0)), Some(110.0));
            }
        }

        // Equipment, then the ward itself
        assert_eq!(world.property(UnitId(1), FieldId(0)), Some(115.0));
        // Moved out of range at tick 3
        assert_eq!(world.property(UnitId(2), FieldId(0)), Some(100.0));
        assert_eq!(
            world.state().position(UnitId(2)),
            Some(Position::new(300.0, 0.0, 0.0))
        );
    }
}
