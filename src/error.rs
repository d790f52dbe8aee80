//! Error types for the harness

use std::path::PathBuf;

use halo_core::{CatalogError, EffectError};
use thiserror::Error;

/// Errors while loading or resolving a scenario file
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario {path}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unit {unit} is declared twice")]
    DuplicateUnit { unit: u64 },

    #[error("unit {unit}: unknown property field '{field}'")]
    UnknownField { unit: u64, field: String },

    #[error("unit {unit}: unknown equipment formula '{formula}'")]
    UnknownFormula { unit: u64, formula: String },

    #[error("action {index}: unknown effect '{name}'")]
    UnknownEffect { index: usize, name: String },

    #[error("action {index}: unit {unit} is not declared")]
    UnknownUnit { index: usize, unit: u64 },

    #[error("action {index}: label '{label}' is never applied")]
    UnknownLabel { index: usize, label: String },

    #[error("action {index}: missing '{parameter}'")]
    MissingParameter {
        index: usize,
        parameter: &'static str,
    },
}

/// Top-level harness failure
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no catalog given on the command line or in the config file")]
    NoCatalog,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("scenario action could not be built")]
    Effect(#[from] EffectError),
}
