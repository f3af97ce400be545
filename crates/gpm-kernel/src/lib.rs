//! `gpm-kernel` – Safety & Lifecycle
//!
//! Everything that decides whether the arm is allowed to move.  Nothing in
//! this crate sleeps or loops; the control loop in `gpm-runtime` drives it.
//!
//! # Modules
//!
//! - [`safety`] – [`evaluate`][safety::evaluate] checks a
//!   [`PowerStatus`][gpm_types::PowerStatus] snapshot against
//!   [`SafetyLimits`][safety::SafetyLimits] and returns every violated
//!   constraint; [`SafetyMonitor`][safety::SafetyMonitor] pulls snapshots
//!   from the power capability and keeps the latest violation list.
//! - [`lifecycle`] – [`ArmStateMachine`][lifecycle::ArmStateMachine]:
//!   the arm's lifecycle states and the static legal-transition table.
//! - [`grip_dispatcher`] – [`GripDispatcher`][grip_dispatcher::GripDispatcher]:
//!   the single gate every actuation passes through.  Runs the safety check,
//!   drives the actuator and tracks the current grip and its execution
//!   sub-state.

pub mod grip_dispatcher;
pub mod lifecycle;
pub mod safety;

pub use grip_dispatcher::{DispatchError, GripDispatcher};
pub use lifecycle::{ArmStateMachine, allowed_transitions};
pub use safety::{SafetyLimits, SafetyMonitor, evaluate};
