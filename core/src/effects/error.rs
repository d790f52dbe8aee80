//! Error types for building effect instances

use thiserror::Error;

use crate::ids::EffectType;

/// Errors while turning an `EffectBuilder` into an instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("no effect type was set on the builder")]
    MissingType,

    #[error("effect {0} is not in the catalog")]
    UnknownEffectType(EffectType),

    #[error("no owner unit was set on the builder")]
    MissingOwner,
}
