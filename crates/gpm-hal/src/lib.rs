//! `gpm-hal` – Capability Interfaces
//!
//! The narrow set of hardware operations the control core consumes.  The
//! driver layer that talks to servo controllers, ADCs, and the battery
//! management system lives outside this workspace; it only has to implement
//! these traits.
//!
//! # Modules
//!
//! - [`actuator`] – [`GripActuator`][actuator::GripActuator] and the
//!   [`GripPositions`][actuator::GripPositions] table of per-channel targets.
//! - [`power`] – [`PowerMonitor`][power::PowerMonitor]: battery / power
//!   status snapshots.
//! - [`emg`] – [`EmgSensor`][emg::EmgSensor] sample batches and the
//!   [`IntentClassifier`][emg::IntentClassifier] seam, with a two-channel
//!   [`ThresholdClassifier`][emg::ThresholdClassifier].
//! - [`hardware`] – [`HardwareSet`][hardware::HardwareSet]: the bundle of
//!   capability handles injected into the core at construction time.
//! - [`sim`] – [`SimHardware`][sim::SimHardware]: an in-process backend for
//!   tests and headless runs.

pub mod actuator;
pub mod emg;
pub mod hardware;
pub mod power;
pub mod sim;

pub use actuator::{CHANNEL_COUNT, GripActuator, GripPositions};
pub use emg::{EmgSensor, IntentClassifier, ThresholdClassifier};
pub use hardware::HardwareSet;
pub use power::PowerMonitor;
pub use sim::SimHardware;
