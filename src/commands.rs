use std::path::{Path, PathBuf};
use std::sync::Arc;

use halo_core::{ChannelSink, EffectCatalog, EffectType, World, load_catalog_from_path};
use halo_types::EngineConfig;

use crate::error::HarnessError;
use crate::scenario::{Scenario, ScenarioRunner};

/// Engine config from the user's config directory, defaults if unreadable
pub fn load_config() -> EngineConfig {
    confy::load("halo", "config").unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Config unreadable, using defaults");
        EngineConfig::default()
    })
}

/// CLI path first, then the configured default
pub fn resolve_catalog_path(
    cli: Option<PathBuf>,
    config: &EngineConfig,
) -> Result<PathBuf, HarnessError> {
    cli.or_else(|| config.catalog_path.as_ref().map(PathBuf::from))
        .ok_or(HarnessError::NoCatalog)
}

pub fn check_catalog(path: &Path) -> Result<(), HarnessError> {
    let catalog = load_catalog_from_path(path)?;

    println!("Catalog OK: {}", path.display());
    println!(
        "  {} fields, {} categories, {} effects",
        catalog.field_count(),
        catalog.categories().len(),
        catalog.effect_count()
    );
    for category in catalog.categories() {
        let cap = match category.max_level {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        };
        println!("  category {:<20} bit {:<2} cap {}", category.name, category.bit, cap);
    }
    for info in catalog.effects() {
        let duration = info
            .duration
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "permanent".to_string());
        let aura = if info.is_aura() {
            format!(" aura r={}", info.aura_radius)
        } else {
            String::new()
        };
        println!(
            "  effect {:<5} {:<24} {}{}",
            info.effect_type.0, info.name, duration, aura
        );
    }
    Ok(())
}

pub fn simulate(
    catalog_path: &Path,
    scenario_path: &Path,
    ticks: Option<u64>,
    config: EngineConfig,
) -> Result<(), HarnessError> {
    let catalog = Arc::new(load_catalog_from_path(catalog_path)?);
    let scenario = Scenario::load(scenario_path, &catalog)?;
    let ticks = ticks.unwrap_or(scenario.last_tick() + 1);

    let (sink, changes) = ChannelSink::bounded(config.notification_capacity);
    let mut world = World::new(config, catalog.clone());
    world.add_sink(Arc::new(sink));

    let mut runner = ScenarioRunner::new(scenario);
    runner.spawn_units(&mut world);

    tracing::info!(ticks, tick_ms = world.config().tick_ms, "Simulation started");

    for tick in 0..ticks {
        runner.run_due(&mut world, tick)?;
        let summary = world.tick();

        println!(
            "tick {:>4}  admitted {} refreshed {} rejected {} removed {}",
            summary.tick, summary.admitted, summary.refreshed, summary.rejected, summary.removed
        );
        for change in changes.try_iter() {
            let verb = if change.applied { "+" } else { "-" };
            let remaining = change
                .remaining_ms
                .map(|ms| format!(" {ms}ms"))
                .unwrap_or_default();
            println!(
                "    {} {} {} on {}{}",
                verb,
                effect_name(&catalog, change.effect_type),
                change.effect_id,
                change.owner,
                remaining
            );
        }
        for (unit, fields) in &summary.changed_fields {
            for field in fields {
                if let Some(value) = world.property(*unit, *field) {
                    let name = catalog.field_name(*field).unwrap_or("?");
                    println!("    {unit} {name} = {value}");
                }
            }
        }
    }

    println!("\nFinal properties:");
    let units: Vec<_> = world.unit_ids().collect();
    for unit in units {
        let values: Vec<String> = catalog
            .fields()
            .filter_map(|field| {
                let value = world.property(unit, field)?;
                Some(format!("{}={}", catalog.field_name(field).unwrap_or("?"), value))
            })
            .collect();
        let effects = world.effects(unit).map(|s| s.len()).unwrap_or(0);
        println!("  {unit}: {} ({effects} effects)", values.join(" "));
    }
    Ok(())
}

fn effect_name(catalog: &EffectCatalog, effect_type: EffectType) -> &str {
    catalog
        .effect(effect_type)
        .map(|info| info.name.as_str())
        .unwrap_or("?")
}
