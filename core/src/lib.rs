pub mod catalog;
pub mod effects;
pub mod ids;
pub mod modifier;
pub mod propagation;
pub mod properties;
pub mod serde_defaults;
pub mod world;

// Re-exports for convenience
pub use catalog::{
    CatalogError, CatalogSource, EffectCatalog, EffectCategory, EffectInfo, StaticCatalogSource,
    TomlCatalogSource, load_catalog_from_path,
};
pub use effects::{
    ApplyOutcome, ChangeSink, ChannelSink, EffectBuilder, EffectChange, EffectError,
    EffectInstance, EffectKind, EffectRegistry, EffectSnapshot, EffectState, ReconcileReport,
    RegistryHandle, RemovalTarget, SimTime,
};
pub use ids::{EffectId, EffectToken, EffectType, GroupId, OrgId, UnitId};
pub use modifier::{FieldId, FormulaKind, ModifierSet, PropertyModifier};
pub use propagation::{AuraPropagator, PropagationStrategy};
pub use properties::{PropertyAggregator, PropertySource, StaticProperties};
pub use world::{Placement, TickSummary, Unit, World, WorldState, WorldView};
