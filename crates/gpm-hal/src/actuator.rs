//! Generic `GripActuator` trait for the multi-channel servo array, plus the
//! table of named grip configurations.
//!
//! Drivers implement this trait and are handed to the core inside a
//! [`HardwareSet`][crate::hardware::HardwareSet].  The rest of the system only
//! ever talks to the trait, so the servo controller can be swapped without
//! touching dispatch or loop logic.

use std::collections::BTreeMap;

use gpm_types::{GpmError, GripIntent};
use serde::{Deserialize, Serialize};

/// Number of servo channels driven by the actuator array.
pub const CHANNEL_COUNT: usize = 6;

/// A multi-channel actuator that moves to named grip configurations.
pub trait GripActuator: Send {
    /// Stable identifier for this actuator, e.g. `"maestro"`.
    fn id(&self) -> &str;

    /// Drive every channel to the targets of configuration `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GpmError::UnknownConfiguration`] for a name the driver does
    /// not know, and [`GpmError::HardwareFault`] when the command cannot be
    /// applied.
    fn move_to_configuration(&mut self, name: &str) -> Result<(), GpmError>;
}

/// Per-channel PWM targets (µs) for every named grip configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GripPositions {
    positions: BTreeMap<String, [u16; CHANNEL_COUNT]>,
}

impl GripPositions {
    /// An empty table.  Every lookup fails until configurations are inserted.
    pub fn empty() -> Self {
        Self {
            positions: BTreeMap::new(),
        }
    }

    /// Add or replace configuration `name`.
    pub fn insert(&mut self, name: impl Into<String>, targets: [u16; CHANNEL_COUNT]) {
        self.positions.insert(name.into().to_ascii_lowercase(), targets);
    }

    /// Look up the channel targets for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GpmError::UnknownConfiguration`] when `name` is not in the
    /// table.
    pub fn targets(&self, name: &str) -> Result<[u16; CHANNEL_COUNT], GpmError> {
        self.positions
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| GpmError::UnknownConfiguration(name.to_string()))
    }

    /// `true` when every [`GripIntent`] has an entry.
    pub fn covers_all_intents(&self) -> bool {
        GripIntent::ALL
            .iter()
            .all(|intent| self.positions.contains_key(intent.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }
}

impl Default for GripPositions {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("rest", [1500; CHANNEL_COUNT]);
        table.insert("pinch", [2000, 1800, 1500, 1500, 1500, 1500]);
        table.insert("power", [2200, 2200, 2200, 2000, 2000, 2000]);
        table.insert("open", [1000; CHANNEL_COUNT]);
        table
    }
}
