//! Positions and memberships of the units in a world
//!
//! `WorldView` is the read interface propagation strategies select through.
//! `WorldState` is the in-memory implementation the tick driver owns; it is
//! only mutated between ticks.

use std::collections::{BTreeMap, BTreeSet};

use halo_types::Position;

use crate::ids::{GroupId, OrgId, UnitId};

/// Read-only world queries used during a tick
pub trait WorldView: Sync {
    fn contains(&self, unit: UnitId) -> bool;

    fn position(&self, unit: UnitId) -> Option<Position>;

    /// Units whose position is within `radius` of `center` (inclusive)
    fn units_within(&self, center: &Position, radius: f64) -> Vec<UnitId>;

    fn group_of(&self, unit: UnitId) -> Option<GroupId>;

    fn group_anchor(&self, group: GroupId) -> Option<UnitId>;

    fn group_members(&self, group: GroupId) -> Vec<UnitId>;

    fn organization_of(&self, unit: UnitId) -> Option<OrgId>;

    fn organization_members(&self, org: OrgId) -> Vec<UnitId>;

    fn units(&self) -> Vec<UnitId>;
}

/// Where a unit is and what it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub position: Position,
    pub group: Option<GroupId>,
    pub organization: Option<OrgId>,
}

impl Placement {
    pub fn at(position: Position) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn in_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn in_organization(mut self, org: OrgId) -> Self {
        self.organization = Some(org);
        self
    }
}

#[derive(Debug, Clone, Default)]
struct Group {
    anchor: Option<UnitId>,
    members: BTreeSet<UnitId>,
}

#[derive(Debug, Clone, Default)]
pub struct WorldState {
    placements: BTreeMap<UnitId, Placement>,
    groups: BTreeMap<GroupId, Group>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a unit. Group membership in `placement` is joined.
    pub fn insert(&mut self, unit: UnitId, placement: Placement) {
        self.remove(unit);
        self.placements.insert(
            unit,
            Placement {
                group: None,
                ..placement
            },
        );
        if let Some(group) = placement.group {
            self.join_group(unit, group);
        }
    }

    pub fn remove(&mut self, unit: UnitId) -> Option<Placement> {
        self.leave_group(unit);
        self.placements.remove(&unit)
    }

    pub fn placement(&self, unit: UnitId) -> Option<&Placement> {
        self.placements.get(&unit)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Returns false if the unit is not in the world
    pub fn set_position(&mut self, unit: UnitId, position: Position) -> bool {
        match self.placements.get_mut(&unit) {
            Some(placement) => {
                placement.position = position;
                true
            }
            None => false,
        }
    }

    /// Move `unit` into `group`, leaving any previous group. The first member
    /// of an empty group becomes its anchor.
    pub fn join_group(&mut self, unit: UnitId, group: GroupId) -> bool {
        if !self.placements.contains_key(&unit) {
            return false;
        }
        self.leave_group(unit);

        let entry = self.groups.entry(group).or_default();
        entry.members.insert(unit);
        if entry.anchor.is_none() {
            entry.anchor = Some(unit);
        }
        if let Some(placement) = self.placements.get_mut(&unit) {
            placement.group = Some(group);
        }
        true
    }

    /// Leave the current group. An anchor that leaves hands over to the
    /// lowest remaining member; an emptied group is dissolved.
    pub fn leave_group(&mut self, unit: UnitId) -> Option<GroupId> {
        let placement = self.placements.get_mut(&unit)?;
        let group = placement.group.take()?;

        if let Some(entry) = self.groups.get_mut(&group) {
            entry.members.remove(&unit);
            if entry.anchor == Some(unit) {
                entry.anchor = entry.members.first().copied();
            }
            if entry.members.is_empty() {
                self.groups.remove(&group);
            }
        }
        Some(group)
    }

    /// Returns false unless `unit` is a member of `group`
    pub fn set_group_anchor(&mut self, group: GroupId, unit: UnitId) -> bool {
        match self.groups.get_mut(&group) {
            Some(entry) if entry.members.contains(&unit) => {
                entry.anchor = Some(unit);
                true
            }
            _ => false,
        }
    }

    pub fn set_organization(&mut self, unit: UnitId, org: Option<OrgId>) -> bool {
        match self.placements.get_mut(&unit) {
            Some(placement) => {
                placement.organization = org;
                true
            }
            None => false,
        }
    }
}

impl WorldView for WorldState {
    fn contains(&self, unit: UnitId) -> bool {
        self.placements.contains_key(&unit)
    }

    fn position(&self, unit: UnitId) -> Option<Position> {
        self.placements.get(&unit).map(|p| p.position)
    }

    fn units_within(&self, center: &Position, radius: f64) -> Vec<UnitId> {
        self.placements
            .iter()
            .filter(|(_, p)| center.is_within(&p.position, radius))
            .map(|(id, _)| *id)
            .collect()
    }

    fn group_of(&self, unit: UnitId) -> Option<GroupId> {
        self.placements.get(&unit).and_then(|p| p.group)
    }

    fn group_anchor(&self, group: GroupId) -> Option<UnitId> {
        self.groups.get(&group).and_then(|g| g.anchor)
    }

    fn group_members(&self, group: GroupId) -> Vec<UnitId> {
        self.groups
            .get(&group)
            .map(|g| g.members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn organization_of(&self, unit: UnitId) -> Option<OrgId> {
        self.placements.get(&unit).and_then(|p| p.organization)
    }

    fn organization_members(&self, org: OrgId) -> Vec<UnitId> {
        self.placements
            .iter()
            .filter(|(_, p)| p.organization == Some(org))
            .map(|(id, _)| *id)
            .collect()
    }

    fn units(&self) -> Vec<UnitId> {
        self.placements.keys().copied().collect()
    }
}
