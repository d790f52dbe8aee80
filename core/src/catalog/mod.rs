//! Effect catalog
//!
//! Static, read-only metadata keyed by effect type:
//! - **Fields**: the numeric properties modifiers may target, in canonical order
//! - **Categories**: stacking groups, one bit each, with an optional cap
//! - **Effects**: category mask, default duration, aura radius, display flag
//!   and default modifiers
//!
//! The catalog is validated once at load time and never mutated afterwards.
//! Any malformed row is a `CatalogError`.

mod definition;
mod error;
mod loader;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::EffectType;
use crate::modifier::{FieldId, FormulaKind, ModifierSet, PropertyModifier};

pub use definition::{CatalogRows, CategoryRow, EffectRow, FieldRow, ModifierRow};
pub use error::CatalogError;
pub use loader::{CatalogSource, StaticCatalogSource, TomlCatalogSource, load_catalog_from_path};

/// Number of distinct category bits
pub const CATEGORY_BITS: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════
// Categories
// ═══════════════════════════════════════════════════════════════════════════

/// Bitmask of stacking categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectCategory(pub u64);

impl EffectCategory {
    pub const NONE: Self = Self(0);

    /// Mask with a single bit set; empty for positions outside 0..64
    pub const fn bit(bit: u8) -> Self {
        match 1u64.checked_shl(bit as u32) {
            Some(mask) => Self(mask),
            None => Self::NONE,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set bit positions, lowest first
    pub fn bits(self) -> impl Iterator<Item = u8> {
        (0..CATEGORY_BITS as u8).filter(move |bit| self.0 & (1u64 << bit) != 0)
    }
}

impl fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A validated category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInfo {
    pub name: String,
    pub bit: u8,
    /// 0 = unlimited
    pub max_level: u32,
}

impl CategoryInfo {
    pub fn mask(&self) -> EffectCategory {
        EffectCategory::bit(self.bit)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════════

/// Validated metadata for one effect type
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInfo {
    pub effect_type: EffectType,
    pub name: String,
    pub category: EffectCategory,
    /// None = permanent
    pub duration: Option<Duration>,
    pub aura_radius: f64,
    pub display: bool,
    /// Type applied to aura targets
    pub propagated_type: EffectType,
    pub modifiers: ModifierSet,
}

impl EffectInfo {
    /// Effects with a positive default radius propagate as radius auras
    pub fn is_aura(&self) -> bool {
        self.aura_radius > 0.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct EffectCatalog {
    fields: Vec<String>,
    field_ids: HashMap<String, FieldId>,
    categories: Vec<CategoryInfo>,
    category_ids: HashMap<String, u8>,
    max_levels: [u32; CATEGORY_BITS],
    effects: BTreeMap<EffectType, EffectInfo>,
    effect_names: HashMap<String, EffectType>,
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            field_ids: HashMap::new(),
            categories: Vec::new(),
            category_ids: HashMap::new(),
            max_levels: [0; CATEGORY_BITS],
            effects: BTreeMap::new(),
            effect_names: HashMap::new(),
        }
    }
}

impl EffectCatalog {
    /// Validate raw rows into a catalog.
    ///
    /// Fails on the first malformed row: unknown field, formula, category or
    /// propagated type, duplicates, or an out-of-range category bit.
    pub fn from_rows(rows: CatalogRows) -> Result<Self, CatalogError> {
        let mut catalog = EffectCatalog::default();

        if rows.fields.len() > u16::MAX as usize {
            return Err(CatalogError::TooManyFields {
                count: rows.fields.len(),
            });
        }
        for (idx, field) in rows.fields.into_iter().enumerate() {
            if catalog.field_ids.contains_key(&field.name) {
                return Err(CatalogError::DuplicateField { name: field.name });
            }
            catalog
                .field_ids
                .insert(field.name.clone(), FieldId(idx as u16));
            catalog.fields.push(field.name);
        }

        for row in rows.categories {
            if row.bit as usize >= CATEGORY_BITS {
                return Err(CatalogError::InvalidCategoryBit {
                    name: row.name,
                    bit: row.bit,
                });
            }
            let bit_taken = catalog.categories.iter().any(|c| c.bit == row.bit);
            if bit_taken || catalog.category_ids.contains_key(&row.name) {
                return Err(CatalogError::DuplicateCategory {
                    name: row.name,
                    bit: row.bit,
                });
            }
            catalog.max_levels[row.bit as usize] = row.max_level;
            catalog.category_ids.insert(row.name.clone(), row.bit);
            catalog.categories.push(CategoryInfo {
                name: row.name,
                bit: row.bit,
                max_level: row.max_level,
            });
        }

        // First pass registers names so propagated types can refer forward
        for row in &rows.effects {
            let effect_type = EffectType(row.id);
            if catalog.effect_names.contains_key(&row.name)
                || catalog.effect_names.values().any(|t| *t == effect_type)
            {
                return Err(CatalogError::DuplicateEffect {
                    name: row.name.clone(),
                    effect_type: row.id,
                });
            }
            catalog.effect_names.insert(row.name.clone(), effect_type);
        }

        for row in rows.effects {
            let info = catalog.validate_effect(row)?;
            catalog.effects.insert(info.effect_type, info);
        }

        Ok(catalog)
    }

    fn validate_effect(&self, row: EffectRow) -> Result<EffectInfo, CatalogError> {
        if !row.aura_radius.is_finite() || row.aura_radius < 0.0 {
            return Err(CatalogError::InvalidDefinition {
                effect: row.name,
                reason: format!("aura_radius must be finite and >= 0, got {}", row.aura_radius),
            });
        }

        let mut category = EffectCategory::NONE;
        for name in &row.categories {
            let bit = self
                .category_ids
                .get(name)
                .ok_or_else(|| CatalogError::UnknownCategory {
                    effect: row.name.clone(),
                    category: name.clone(),
                })?;
            category = category.union(EffectCategory::bit(*bit));
        }

        let mut modifiers = ModifierSet::new();
        for m in &row.modifiers {
            let field = self
                .field_id(&m.field)
                .ok_or_else(|| CatalogError::UnknownField {
                    effect: row.name.clone(),
                    field: m.field.clone(),
                })?;
            let formula: FormulaKind =
                m.formula
                    .parse()
                    .map_err(|_| CatalogError::UnknownFormula {
                        effect: row.name.clone(),
                        formula: m.formula.clone(),
                    })?;
            if !m.value.is_finite() {
                return Err(CatalogError::InvalidDefinition {
                    effect: row.name.clone(),
                    reason: format!("modifier value for '{}' is not finite", m.field),
                });
            }
            modifiers.insert(PropertyModifier::new(field, formula, m.value));
        }

        let effect_type = EffectType(row.id);
        let propagated_type = match &row.propagated_type {
            Some(name) => *self.effect_names.get(name).ok_or_else(|| {
                CatalogError::UnknownPropagatedType {
                    effect: row.name.clone(),
                    reference: name.clone(),
                }
            })?,
            None => effect_type,
        };

        Ok(EffectInfo {
            effect_type,
            name: row.name,
            category,
            duration: row.duration_ms.map(Duration::from_millis),
            aura_radius: row.aura_radius,
            display: row.display,
            propagated_type,
            modifiers,
        })
    }

    // ─── Effects ────────────────────────────────────────────────────────────

    pub fn effect(&self, effect_type: EffectType) -> Option<&EffectInfo> {
        self.effects.get(&effect_type)
    }

    pub fn effect_by_name(&self, name: &str) -> Option<&EffectInfo> {
        self.effect_names
            .get(name)
            .and_then(|t| self.effects.get(t))
    }

    /// All effects in type order
    pub fn effects(&self) -> impl Iterator<Item = &EffectInfo> {
        self.effects.values()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    // ─── Categories ─────────────────────────────────────────────────────────

    /// Stacking cap for one category bit (0 = unlimited)
    pub fn max_level(&self, bit: u8) -> u32 {
        self.max_levels
            .get(bit as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn category(&self, name: &str) -> Option<&CategoryInfo> {
        self.category_ids
            .get(name)
            .and_then(|bit| self.categories.iter().find(|c| c.bit == *bit))
    }

    /// Build a mask from category names, ignoring unknown names
    pub fn category_mask<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> EffectCategory {
        names
            .into_iter()
            .filter_map(|name| self.category_ids.get(name))
            .fold(EffectCategory::NONE, |mask, bit| {
                mask.union(EffectCategory::bit(*bit))
            })
    }

    pub fn categories(&self) -> &[CategoryInfo] {
        &self.categories
    }

    // ─── Fields ─────────────────────────────────────────────────────────────

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_ids.get(name).copied()
    }

    pub fn field_name(&self, field: FieldId) -> Option<&str> {
        self.fields.get(field.0 as usize).map(String::as_str)
    }

    /// Fields in canonical order
    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(|idx| FieldId(idx as u16))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
