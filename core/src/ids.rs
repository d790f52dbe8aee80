//! Identity types shared across the engine
//!
//! Effect ids and tokens are minted from process-wide counters so they stay
//! unique across every registry without coordination.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_EFFECT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_EFFECT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A simulated unit (player avatar, NPC, structure)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnitId(pub u64);

/// A player group (gang)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// An organization (corporation, alliance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub u64);

/// Catalog-defined kind of effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectType(pub u32);

/// Identity of one applied effect instance.
///
/// Ids are minted in increasing order, which gives snapshots a canonical
/// iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(pub u64);

impl EffectId {
    pub fn mint() -> Self {
        Self(NEXT_EFFECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of one logical effect application.
///
/// Re-applying with the same token refreshes the active instance instead of
/// stacking a second one. Aura children share their master's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectToken(pub u64);

impl EffectToken {
    pub fn mint() -> Self {
        Self(NEXT_EFFECT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

macro_rules! display_as_inner {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!($prefix, "{}"), self.0)
                }
            }
        )*
    };
}

display_as_inner! {
    UnitId => "unit#",
    GroupId => "group#",
    OrgId => "org#",
    EffectType => "type#",
    EffectId => "effect#",
    EffectToken => "token#",
}
