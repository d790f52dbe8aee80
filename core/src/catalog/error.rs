//! Error types for catalog loading

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or validating the effect catalog.
///
/// Every variant is fatal: the engine must not start with a malformed catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read catalog directory {path}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog TOML in {path}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("effect '{effect}' references unknown field '{field}'")]
    UnknownField { effect: String, field: String },

    #[error("effect '{effect}' uses unknown formula '{formula}'")]
    UnknownFormula { effect: String, formula: String },

    #[error("effect '{effect}' references unknown category '{category}'")]
    UnknownCategory { effect: String, category: String },

    #[error("effect '{effect}' propagates unknown effect '{reference}'")]
    UnknownPropagatedType { effect: String, reference: String },

    #[error("duplicate effect definition '{name}' (type {effect_type})")]
    DuplicateEffect { name: String, effect_type: u32 },

    #[error("duplicate field '{name}'")]
    DuplicateField { name: String },

    #[error("duplicate category '{name}' or bit {bit}")]
    DuplicateCategory { name: String, bit: u8 },

    #[error("category '{name}' uses bit {bit}, expected 0..=63")]
    InvalidCategoryBit { name: String, bit: u8 },

    #[error("too many fields declared ({count})")]
    TooManyFields { count: usize },

    #[error("invalid effect definition '{effect}': {reason}")]
    InvalidDefinition { effect: String, reason: String },
}
