//! Catalog loading
//!
//! Loads catalog rows from a single TOML file or from a directory of TOML
//! files (recursive, sorted by path so merges are deterministic).

use std::fs;
use std::path::{Path, PathBuf};

use super::{CatalogError, CatalogRows, EffectCatalog};

/// Read-only source the catalog is loaded from once at startup
pub trait CatalogSource {
    fn load_catalog(&self) -> Result<EffectCatalog, CatalogError>;
}

/// Catalog stored as TOML on disk
#[derive(Debug, Clone)]
pub struct TomlCatalogSource {
    path: PathBuf,
}

impl TomlCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogSource for TomlCatalogSource {
    fn load_catalog(&self) -> Result<EffectCatalog, CatalogError> {
        load_catalog_from_path(&self.path)
    }
}

/// Catalog rows already held in memory (e.g. fetched from a database)
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    rows: CatalogRows,
}

impl StaticCatalogSource {
    pub fn new(rows: CatalogRows) -> Self {
        Self { rows }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn load_catalog(&self) -> Result<EffectCatalog, CatalogError> {
        EffectCatalog::from_rows(self.rows.clone())
    }
}

/// Load and validate a catalog from a TOML file or directory
pub fn load_catalog_from_path(path: &Path) -> Result<EffectCatalog, CatalogError> {
    let rows = if path.is_dir() {
        let mut files = Vec::new();
        collect_toml_files(path, &mut files)?;
        files.sort();

        let mut rows = CatalogRows::default();
        for file in &files {
            rows.extend(load_rows_from_file(file)?);
        }
        rows
    } else {
        load_rows_from_file(path)?
    };

    let catalog = EffectCatalog::from_rows(rows)?;
    tracing::info!(
        path = %path.display(),
        fields = catalog.field_count(),
        categories = catalog.categories().len(),
        effects = catalog.effect_count(),
        "Effect catalog loaded"
    );
    Ok(catalog)
}

/// Parse one catalog file without validating it
pub fn load_rows_from_file(path: &Path) -> Result<CatalogRows, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| CatalogError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

fn collect_toml_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = fs::read_dir(dir).map_err(|source| CatalogError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_toml_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EffectType;

    const FIELDS: &str = r#"
        [[field]]
        name = "speed"

        [[category]]
        name = "buff"
        bit = 0
        max_level = 2
    "#;

    const EFFECTS: &str = r#"
        [[effect]]
        id = 1
        name = "haste"
        categories = ["buff"]
        duration_ms = 3000
        modifiers = [{ field = "speed", formula = "add", value = 2.0 }]
    "#;

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        fs::write(&path, format!("{FIELDS}\n{EFFECTS}")).unwrap();

        let catalog = TomlCatalogSource::new(&path).load_catalog().unwrap();
        assert_eq!(catalog.effect_count(), 1);
        assert!(catalog.effect(EffectType(1)).is_some());
    }

    #[test]
    fn test_load_directory_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("00_fields.toml"), FIELDS).unwrap();
        let nested = dir.path().join("effects");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("haste.toml"), EFFECTS).unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let catalog = load_catalog_from_path(dir.path()).unwrap();
        assert_eq!(catalog.field_count(), 1);
        assert_eq!(catalog.effect_by_name("haste").unwrap().category.0, 1);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_catalog_from_path(Path::new("/nonexistent/catalog.toml")).unwrap_err();
        assert!(matches!(err, CatalogError::ReadFile { .. }));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[[effect]]\nid = \"not a number\"").unwrap();
        assert!(matches!(
            load_catalog_from_path(&path),
            Err(CatalogError::ParseToml { .. })
        ));
    }

    #[test]
    fn test_static_source_validates_rows() {
        let rows: CatalogRows = toml::from_str(EFFECTS).unwrap();
        // Rows reference a category that was never declared
        let err = StaticCatalogSource::new(rows).load_catalog().unwrap_err();
        assert!(matches!(err, CatalogError::UnknownCategory { .. }));
    }
}
