//! Catalog row types
//!
//! Rows are the raw, unvalidated shape of the external catalog store. They
//! are loaded from TOML files (or handed over in memory) and validated into
//! an `EffectCatalog` in one pass.

use serde::{Deserialize, Serialize};

use crate::serde_defaults::default_true;

// ═══════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════

/// A numeric property field. Declaration order is the canonical field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRow {
    pub name: String,
}

/// A stacking category occupying one bit of the category mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub name: String,

    /// Bit position in the category mask (0..=63)
    pub bit: u8,

    /// Maximum concurrently active instances carrying this bit (0 = unlimited)
    #[serde(default)]
    pub max_level: u32,
}

/// Default modifier attached to an effect type.
///
/// `field` and `formula` stay as strings here so that unknown values are
/// reported as catalog errors naming the offending effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierRow {
    pub field: String,
    pub formula: String,
    pub value: f64,
}

/// One effect type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRow {
    /// Numeric effect type id
    pub id: u32,

    /// Unique name used by scenarios and propagated-type references
    pub name: String,

    /// Category names; the instance's mask is the union of their bits
    #[serde(default)]
    pub categories: Vec<String>,

    /// Default duration in milliseconds (None = permanent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Default propagation radius for aura effects (0 = not an aura by default)
    #[serde(default)]
    pub aura_radius: f64,

    /// Whether clients should display the effect
    #[serde(default = "default_true")]
    pub display: bool,

    /// Effect name applied to aura targets (defaults to this effect)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagated_type: Option<String>,

    #[serde(default)]
    pub modifiers: Vec<ModifierRow>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Config File Structure
// ═══════════════════════════════════════════════════════════════════════════

/// Root structure for catalog files (TOML).
///
/// A catalog may be split across several files; their rows are concatenated
/// before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRows {
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldRow>,

    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryRow>,

    #[serde(default, rename = "effect")]
    pub effects: Vec<EffectRow>,
}

impl CatalogRows {
    /// Append rows from another file
    pub fn extend(&mut self, other: CatalogRows) {
        self.fields.extend(other.fields);
        self.categories.extend(other.categories);
        self.effects.extend(other.effects);
    }
}
