use reelnote_core::normalize::{ReferenceSpace, REFERENCE_HEIGHT, REFERENCE_WIDTH};
use reelnote_events::bus::DEFAULT_CAPACITY;

use crate::memory::DEFAULT_TOKEN_LENGTH;

/// Review store configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; malformed values
/// fall back to the default with a warning rather than aborting.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Width of the canonical canvas reference frame (default: `1280`).
    pub reference_width: f64,
    /// Height of the canonical canvas reference frame (default: `720`).
    pub reference_height: f64,
    /// Review event channel capacity (default: `256`).
    pub event_bus_capacity: usize,
    /// Length of share tokens minted by the in-memory backend (default: `32`).
    pub share_token_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reference_width: REFERENCE_WIDTH,
            reference_height: REFERENCE_HEIGHT,
            event_bus_capacity: DEFAULT_CAPACITY,
            share_token_length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `REFERENCE_WIDTH`    | `1280`  |
    /// | `REFERENCE_HEIGHT`   | `720`   |
    /// | `EVENT_BUS_CAPACITY` | `256`   |
    /// | `SHARE_TOKEN_LENGTH` | `32`    |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            reference_width: parse_or(&lookup, "REFERENCE_WIDTH", defaults.reference_width),
            reference_height: parse_or(&lookup, "REFERENCE_HEIGHT", defaults.reference_height),
            event_bus_capacity: parse_or(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            share_token_length: parse_or(&lookup, "SHARE_TOKEN_LENGTH", defaults.share_token_length),
        }
    }

    /// The configured reference frame, or the 1280x720 default if the
    /// configured one is not usable.
    pub fn reference_space(&self) -> ReferenceSpace {
        ReferenceSpace::new(self.reference_width, self.reference_height).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Falling back to the default reference frame");
            ReferenceSpace::default()
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "Ignoring malformed setting");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(StoreConfig::from_lookup(lookup(&[])), StoreConfig::default());
    }

    #[test]
    fn values_are_parsed() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("REFERENCE_WIDTH", "1920"),
            ("REFERENCE_HEIGHT", " 1080 "),
            ("EVENT_BUS_CAPACITY", "64"),
            ("SHARE_TOKEN_LENGTH", "24"),
        ]));
        assert_eq!(config.reference_width, 1920.0);
        assert_eq!(config.reference_height, 1080.0);
        assert_eq!(config.event_bus_capacity, 64);
        assert_eq!(config.share_token_length, 24);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = StoreConfig::from_lookup(lookup(&[("EVENT_BUS_CAPACITY", "lots")]));
        assert_eq!(config.event_bus_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn unusable_reference_falls_back_to_default_frame() {
        let config = StoreConfig::from_lookup(lookup(&[("REFERENCE_WIDTH", "0")]));
        assert_eq!(config.reference_space(), ReferenceSpace::default());
    }
}
