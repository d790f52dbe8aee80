//! Aura propagation
//!
//! An aura master instance re-broadcasts a child effect onto other units
//! every tick. Which units receive it is decided by a `PropagationStrategy`,
//! a pure target selector over the current world state:
//!
//! - **Radius**: units within a 3-D distance of the aura's carrier
//! - **GroupMembership**: members of the carrier's group, while the carrier is
//!   still in it and the aura's source is the group's anchor
//! - **OrganizationMembership**: members of the carrier's organization,
//!   looked up afresh every tick
//!
//! Membership strategies take an optional `range`; 0 disables the extra
//! distance check so membership alone gates selection.

mod propagator;

use std::collections::BTreeSet;

use crate::effects::EffectInstance;
use crate::ids::{GroupId, UnitId};
use crate::world::WorldView;

pub use propagator::{AuraPropagator, PropagationContext, PropagationReport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropagationStrategy {
    Radius { radius: f64 },
    GroupMembership { group: GroupId, range: f64 },
    OrganizationMembership { range: f64 },
}

impl PropagationStrategy {
    pub fn radius(radius: f64) -> Self {
        Self::Radius { radius }
    }

    pub fn group(group: GroupId) -> Self {
        Self::GroupMembership { group, range: 0.0 }
    }

    pub fn organization() -> Self {
        Self::OrganizationMembership { range: 0.0 }
    }

    /// Replace the distance parameter (radius or secondary range)
    pub fn with_range(self, range: f64) -> Self {
        let range = range.max(0.0);
        match self {
            Self::Radius { .. } => Self::Radius { radius: range },
            Self::GroupMembership { group, .. } => Self::GroupMembership { group, range },
            Self::OrganizationMembership { .. } => Self::OrganizationMembership { range },
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Radius { .. } => "radius",
            Self::GroupMembership { .. } => "group",
            Self::OrganizationMembership { .. } => "organization",
        }
    }

    /// Select the units that should carry `master`'s child this tick.
    ///
    /// The carrier itself is never selected. Units that are not present in
    /// the world are never selected.
    pub fn select(&self, world: &dyn WorldView, master: &EffectInstance) -> BTreeSet<UnitId> {
        let carrier = master.owner;
        let Some(origin) = world.position(carrier) else {
            return BTreeSet::new();
        };

        let (members, range) = match *self {
            Self::Radius { radius } => {
                if radius <= 0.0 {
                    return BTreeSet::new();
                }
                (world.units_within(&origin, radius), 0.0)
            }
            Self::GroupMembership { group, range } => {
                let anchor = master.source.unwrap_or(carrier);
                if world.group_of(carrier) != Some(group) || world.group_anchor(group) != Some(anchor)
                {
                    return BTreeSet::new();
                }
                (world.group_members(group), range)
            }
            Self::OrganizationMembership { range } => match world.organization_of(carrier) {
                Some(org) => (world.organization_members(org), range),
                None => return BTreeSet::new(),
            },
        };

        members
            .into_iter()
            .filter(|unit| *unit != carrier)
            .filter(|unit| match world.position(*unit) {
                Some(pos) => range <= 0.0 || origin.is_within(&pos, range),
                None => false,
            })
            .collect()
    }
}
