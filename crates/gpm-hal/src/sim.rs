//! In-process simulation backend for CI/CD testing without physical hardware.
//!
//! [`SimHardware`] owns a shared simulated world (battery pack, servo array,
//! EMG electrodes) and hands out stub drivers that read and write it.  Tests
//! keep the `SimHardware` handle to inject faults and inspect what the core
//! commanded after the drivers have been moved into the runtime.
//!
//! # Example
//!
//! ```rust
//! use gpm_hal::sim::SimHardware;
//!
//! let sim = SimHardware::new();
//! let mut hw = sim.hardware_set();
//!
//! hw.actuator.move_to_configuration("pinch").expect("sim move must succeed");
//! assert_eq!(sim.actuation_calls(), vec!["pinch".to_string()]);
//!
//! sim.simulate_low_battery();
//! assert!((hw.power.read_status().unwrap().voltage - 6.5).abs() < f32::EPSILON);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gpm_types::{GpmError, PowerStatus};
use tracing::debug;

use crate::actuator::{CHANNEL_COUNT, GripActuator, GripPositions};
use crate::emg::EmgSensor;
use crate::hardware::HardwareSet;
use crate::power::PowerMonitor;

/// Samples per simulated EMG batch (16 pairs of interleaved channels).
pub const SIM_BATCH_LEN: usize = 32;
/// Resting electrode level; classifies as hold with the default thresholds.
pub const SIM_RESTING_LEVEL: u16 = 500;

// ────────────────────────────────────────────────────────────────────────────
// Shared simulated world
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SimWorld {
    status: PowerStatus,
    status_fault: Option<String>,
    channels: [u16; CHANNEL_COUNT],
    actuation_calls: Vec<String>,
    actuation_fault: Option<String>,
    batches: VecDeque<Vec<u16>>,
    sensor_ready: bool,
    sensor_fault: Option<String>,
    sensor_released: bool,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self {
            status: PowerStatus::from_readings(12.0, 0.5, 25.0),
            status_fault: None,
            channels: [1500; CHANNEL_COUNT],
            actuation_calls: Vec::new(),
            actuation_fault: None,
            batches: VecDeque::new(),
            sensor_ready: true,
            sensor_fault: None,
            sensor_released: false,
        }
    }
}

/// Handle to a simulated arm.  Clone it freely; all clones share one world.
#[derive(Clone, Default)]
pub struct SimHardware {
    world: Arc<Mutex<SimWorld>>,
    positions: GripPositions,
}

impl SimHardware {
    /// A healthy pack (12.0 V, 0.5 A, 25 °C), servos centred, sensor ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `positions` instead of the default grip table for the actuator.
    pub fn with_positions(mut self, positions: GripPositions) -> Self {
        self.positions = positions;
        self
    }

    /// Build a [`HardwareSet`] of stub drivers bound to this world.
    pub fn hardware_set(&self) -> HardwareSet {
        HardwareSet::new(
            Box::new(SimGripActuator {
                world: Arc::clone(&self.world),
                positions: self.positions.clone(),
            }),
            Arc::new(SimPowerMonitor {
                world: Arc::clone(&self.world),
            }),
            Box::new(SimEmgSensor {
                world: Arc::clone(&self.world),
            }),
        )
    }

    fn world(&self) -> MutexGuard<'_, SimWorld> {
        lock(&self.world)
    }

    // ── Power faults ────────────────────────────────────────────────────────

    pub fn set_power_status(&self, status: PowerStatus) {
        self.world().status = status;
    }

    /// Drop the pack to 6.5 V, keeping the health flag set.
    pub fn simulate_low_battery(&self) {
        self.world().status.voltage = 6.5;
    }

    pub fn simulate_high_temperature(&self) {
        self.world().status.temperature = 70.0;
    }

    pub fn simulate_high_current(&self) {
        self.world().status.current = 15.0;
    }

    pub fn simulate_unhealthy(&self) {
        self.world().status.healthy = false;
    }

    /// Make every status read fail with `cause` (`None` restores reads).
    pub fn fail_status_reads(&self, cause: Option<&str>) {
        self.world().status_fault = cause.map(str::to_string);
    }

    // ── Actuator faults / inspection ────────────────────────────────────────

    /// Make every actuation fail with `cause` (`None` restores moves).
    pub fn fail_actuation(&self, cause: Option<&str>) {
        self.world().actuation_fault = cause.map(str::to_string);
    }

    /// Every configuration name the actuator was asked to move to, in order,
    /// including failed attempts.
    pub fn actuation_calls(&self) -> Vec<String> {
        self.world().actuation_calls.clone()
    }

    pub fn channel_targets(&self) -> [u16; CHANNEL_COUNT] {
        self.world().channels
    }

    // ── Sensor scripting ────────────────────────────────────────────────────

    /// Queue one EMG batch.  When the queue is empty the sensor returns a
    /// resting batch.
    pub fn push_batch(&self, batch: Vec<u16>) {
        self.world().batches.push_back(batch);
    }

    /// Queue a batch whose channels sit at constant levels `ch0` and `ch1`.
    pub fn push_levels(&self, ch0: u16, ch1: u16) {
        let batch = (0..SIM_BATCH_LEN / 2).flat_map(|_| [ch0, ch1]).collect();
        self.push_batch(batch);
    }

    pub fn set_sensor_ready(&self, ready: bool) {
        self.world().sensor_ready = ready;
    }

    /// Make every sensor read fail with `cause` (`None` restores reads).
    pub fn fail_sensor_reads(&self, cause: Option<&str>) {
        self.world().sensor_fault = cause.map(str::to_string);
    }

    pub fn sensor_released(&self) -> bool {
        self.world().sensor_released
    }
}

fn lock(world: &Mutex<SimWorld>) -> MutexGuard<'_, SimWorld> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Stub drivers
// ────────────────────────────────────────────────────────────────────────────

/// Simulated six-channel servo controller.
pub struct SimGripActuator {
    world: Arc<Mutex<SimWorld>>,
    positions: GripPositions,
}

impl GripActuator for SimGripActuator {
    fn id(&self) -> &str {
        "sim_maestro"
    }

    fn move_to_configuration(&mut self, name: &str) -> Result<(), GpmError> {
        let mut world = lock(&self.world);
        world.actuation_calls.push(name.to_string());
        if let Some(cause) = &world.actuation_fault {
            return Err(GpmError::hardware(self.id(), cause.clone()));
        }
        let targets = self.positions.targets(name)?;
        world.channels = targets;
        debug!(configuration = name, ?targets, "sim actuator moved");
        Ok(())
    }
}

/// Simulated battery-management system.
pub struct SimPowerMonitor {
    world: Arc<Mutex<SimWorld>>,
}

impl PowerMonitor for SimPowerMonitor {
    fn id(&self) -> &str {
        "sim_bms"
    }

    fn read_status(&self) -> Result<PowerStatus, GpmError> {
        let world = lock(&self.world);
        match &world.status_fault {
            Some(cause) => Err(GpmError::hardware(self.id(), cause.clone())),
            None => Ok(world.status),
        }
    }
}

/// Simulated dual-channel EMG front end.
pub struct SimEmgSensor {
    world: Arc<Mutex<SimWorld>>,
}

impl EmgSensor for SimEmgSensor {
    fn id(&self) -> &str {
        "sim_emg"
    }

    fn is_ready(&self) -> bool {
        let world = lock(&self.world);
        world.sensor_ready && !world.sensor_released
    }

    fn read_batch(&mut self) -> Result<Vec<u16>, GpmError> {
        let mut world = lock(&self.world);
        if let Some(cause) = &world.sensor_fault {
            return Err(GpmError::hardware(self.id(), cause.clone()));
        }
        Ok(world
            .batches
            .pop_front()
            .unwrap_or_else(|| vec![SIM_RESTING_LEVEL; SIM_BATCH_LEN]))
    }

    fn release(&mut self) -> Result<(), GpmError> {
        lock(&self.world).sensor_released = true;
        Ok(())
    }
}
