//! Common serde default value functions

/// Default for flag fields that are on unless stated otherwise
pub fn default_true() -> bool {
    true
}
