//! Derived numeric properties
//!
//! A unit's final property values are folded from three layers, always in
//! this order:
//!
//! ```text
//!   base value ─► equipment modifiers ─► active effect modifiers
//!                 (source order)          (snapshot order, enabled only)
//! ```
//!
//! Base values and equipment modifiers belong to whoever owns the unit's
//! items; they are read through `PropertySource`.

mod aggregator;

use hashbrown::HashMap;

use crate::modifier::{FieldId, PropertyModifier};

pub use aggregator::PropertyAggregator;

/// Read interface for base values and equipment modifiers
pub trait PropertySource: Send + Sync {
    /// Unmodified value of `field` (0.0 when the unit has none)
    fn base_value(&self, field: FieldId) -> f64;

    /// Equipment modifiers on `field`, in the order they are applied
    fn equipment_modifiers(&self, field: FieldId) -> &[PropertyModifier];
}

/// In-memory property source
#[derive(Debug, Clone, Default)]
pub struct StaticProperties {
    base: HashMap<FieldId, f64>,
    equipment: HashMap<FieldId, Vec<PropertyModifier>>,
}

impl StaticProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(mut self, field: FieldId, value: f64) -> Self {
        self.set_base(field, value);
        self
    }

    pub fn with_equipment(mut self, modifier: PropertyModifier) -> Self {
        self.add_equipment(modifier);
        self
    }

    pub fn set_base(&mut self, field: FieldId, value: f64) {
        self.base.insert(field, value);
    }

    pub fn add_equipment(&mut self, modifier: PropertyModifier) {
        self.equipment.entry(modifier.field).or_default().push(modifier);
    }

    pub fn clear_equipment(&mut self) {
        self.equipment.clear();
    }
}

impl PropertySource for StaticProperties {
    fn base_value(&self, field: FieldId) -> f64 {
        self.base.get(&field).copied().unwrap_or(0.0)
    }

    fn equipment_modifiers(&self, field: FieldId) -> &[PropertyModifier] {
        self.equipment.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}
