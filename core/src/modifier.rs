//! Property modifiers and the formulas that combine them
//!
//! A `PropertyModifier` targets one numeric field of a unit. Modifiers are
//! applied to a value in sequence, and two modifiers on the same field can be
//! folded into one. Folding uses the *target's* formula, so it is not
//! commutative with respect to formula kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Index of a numeric property field in the catalog's canonical field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub u16);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// How a modifier's value combines with an existing value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// `current + value`
    Add,
    /// `current * value`
    Multiply,
    /// `current * max(1 / (value + 1), floor)`
    Inverse,
}

impl FormulaKind {
    /// Apply a modifier value of this kind to `current`.
    ///
    /// `inverse_floor` bounds how far an `Inverse` modifier may scale down.
    pub fn apply(self, current: f64, value: f64, inverse_floor: f64) -> f64 {
        match self {
            Self::Add => current + value,
            Self::Multiply => current * value,
            Self::Inverse => current * inverse_factor(value, inverse_floor),
        }
    }

    /// Fold `other` into `target`, where `target` carries this kind.
    ///
    /// Inverse modifiers accumulate in the denominator, so their values sum.
    pub fn combine(self, target: f64, other: f64) -> f64 {
        match self {
            Self::Add | Self::Inverse => target + other,
            Self::Multiply => target * other,
        }
    }

    /// Value that leaves a field unchanged
    pub fn identity(self) -> f64 {
        match self {
            Self::Add | Self::Inverse => 0.0,
            Self::Multiply => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Inverse => "inverse",
        }
    }
}

impl FromStr for FormulaKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "multiply" | "modifier" => Ok(Self::Multiply),
            "inverse" => Ok(Self::Inverse),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn inverse_factor(value: f64, floor: f64) -> f64 {
    let denominator = value + 1.0;
    if denominator <= 0.0 {
        return 1.0;
    }
    (1.0 / denominator).max(floor)
}

/// One numeric adjustment to one field. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyModifier {
    pub field: FieldId,
    pub formula: FormulaKind,
    pub value: f64,
}

impl PropertyModifier {
    pub const fn new(field: FieldId, formula: FormulaKind, value: f64) -> Self {
        Self {
            field,
            formula,
            value,
        }
    }

    pub const fn add(field: FieldId, value: f64) -> Self {
        Self::new(field, FormulaKind::Add, value)
    }

    pub const fn multiply(field: FieldId, value: f64) -> Self {
        Self::new(field, FormulaKind::Multiply, value)
    }

    pub const fn inverse(field: FieldId, value: f64) -> Self {
        Self::new(field, FormulaKind::Inverse, value)
    }

    /// Apply this modifier to a field value
    pub fn apply_to(&self, current: f64, inverse_floor: f64) -> f64 {
        self.formula.apply(current, self.value, inverse_floor)
    }

    /// Fold this modifier into `target`, producing a modifier with the
    /// target's field and formula.
    pub fn fold_into(&self, target: &PropertyModifier) -> PropertyModifier {
        debug_assert_eq!(self.field, target.field);
        PropertyModifier {
            field: target.field,
            formula: target.formula,
            value: target.formula.combine(target.value, self.value),
        }
    }
}

/// Ordered set of modifiers with at most one entry per field.
///
/// Entries are kept sorted by `FieldId`, which is the canonical iteration
/// order used by the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierSet {
    modifiers: Vec<PropertyModifier>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a modifier. If the field is already present the new modifier
    /// is folded into the existing one.
    pub fn insert(&mut self, modifier: PropertyModifier) {
        match self
            .modifiers
            .binary_search_by_key(&modifier.field, |m| m.field)
        {
            Ok(idx) => {
                let existing = self.modifiers[idx];
                self.modifiers[idx] = modifier.fold_into(&existing);
            }
            Err(idx) => self.modifiers.insert(idx, modifier),
        }
    }

    /// Overlay every modifier from `other` onto this set
    pub fn merge(&mut self, other: &ModifierSet) {
        for modifier in other.iter() {
            self.insert(*modifier);
        }
    }

    pub fn get(&self, field: FieldId) -> Option<&PropertyModifier> {
        self.modifiers
            .binary_search_by_key(&field, |m| m.field)
            .ok()
            .map(|idx| &self.modifiers[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyModifier> {
        self.modifiers.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.modifiers.iter().map(|m| m.field)
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

impl FromIterator<PropertyModifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = PropertyModifier>>(iter: I) -> Self {
        let mut set = ModifierSet::new();
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ModifierSet {
    type Item = &'a PropertyModifier;
    type IntoIter = std::slice::Iter<'a, PropertyModifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.modifiers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEED: FieldId = FieldId(0);
    const ARMOR: FieldId = FieldId(1);
    const FLOOR: f64 = 0.01;

    #[test]
    fn test_formula_apply() {
        assert_eq!(FormulaKind::Add.apply(10.0, 5.0, FLOOR), 15.0);
        assert_eq!(FormulaKind::Multiply.apply(10.0, 2.0, FLOOR), 20.0);
        assert_eq!(FormulaKind::Inverse.apply(10.0, 1.0, FLOOR), 5.0);
    }

    #[test]
    fn test_inverse_is_clamped_to_floor() {
        // 1 / (999 + 1) = 0.001, below the floor
        assert_eq!(FormulaKind::Inverse.apply(100.0, 999.0, 0.05), 5.0);
    }

    #[test]
    fn test_inverse_ignores_non_positive_denominator() {
        assert_eq!(FormulaKind::Inverse.apply(10.0, -1.0, FLOOR), 10.0);
    }

    #[test]
    fn test_fold_uses_target_formula() {
        let add = PropertyModifier::add(SPEED, 5.0);
        let mul = PropertyModifier::multiply(SPEED, 2.0);

        // Folding the add into the multiply multiplies: 2 * 5
        let folded = add.fold_into(&mul);
        assert_eq!(folded.formula, FormulaKind::Multiply);
        assert_eq!(folded.value, 10.0);

        // Folding the multiply into the add sums: 5 + 2
        let folded = mul.fold_into(&add);
        assert_eq!(folded.formula, FormulaKind::Add);
        assert_eq!(folded.value, 7.0);
    }

    #[test]
    fn test_modifier_set_keeps_one_entry_per_field_in_field_order() {
        let set: ModifierSet = [
            PropertyModifier::add(ARMOR, 3.0),
            PropertyModifier::multiply(SPEED, 1.5),
            PropertyModifier::multiply(SPEED, 2.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
        let fields: Vec<_> = set.fields().collect();
        assert_eq!(fields, vec![SPEED, ARMOR]);
        assert_eq!(set.get(SPEED).unwrap().value, 3.0);
    }

    #[test]
    fn test_formula_parse_accepts_aliases() {
        assert_eq!("Modifier".parse::<FormulaKind>(), Ok(FormulaKind::Multiply));
        assert_eq!(" add ".parse::<FormulaKind>(), Ok(FormulaKind::Add));
        assert!("divide".parse::<FormulaKind>().is_err());
    }
}
