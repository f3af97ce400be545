//! [`HardwareSet`] – the capability handles injected into the control core.
//!
//! There is exactly one `HardwareSet` per process.  It is built by whoever
//! owns the drivers (the binary, or a test) and split apart by the runtime:
//! the actuator goes to the grip dispatcher, the sensor to the control loop,
//! and the power monitor is shared by both.

use std::sync::Arc;

use crate::actuator::GripActuator;
use crate::emg::EmgSensor;
use crate::power::PowerMonitor;

/// Bundle of capability handles.
pub struct HardwareSet {
    pub actuator: Box<dyn GripActuator>,
    pub power: Arc<dyn PowerMonitor>,
    pub sensor: Box<dyn EmgSensor>,
}

impl HardwareSet {
    pub fn new(
        actuator: Box<dyn GripActuator>,
        power: Arc<dyn PowerMonitor>,
        sensor: Box<dyn EmgSensor>,
    ) -> Self {
        Self {
            actuator,
            power,
            sensor,
        }
    }

    /// Identifiers of the bundled drivers, in actuator / power / sensor order.
    pub fn ids(&self) -> [String; 3] {
        [
            self.actuator.id().to_string(),
            self.power.id().to_string(),
            self.sensor.id().to_string(),
        ]
    }
}

impl std::fmt::Debug for HardwareSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSet")
            .field("actuator", &self.actuator.id())
            .field("power", &self.power.id())
            .field("sensor", &self.sensor.id())
            .finish()
    }
}
