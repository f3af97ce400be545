//! [`GripDispatcher`] – the single gate between an intent and the actuator.
//!
//! Every call to [`GripDispatcher::execute`] runs, in order:
//!
//! 1. **Safety check** ([`SafetyMonitor::check`]): a fresh power snapshot
//!    must pass every constraint.  On failure the call returns
//!    [`DispatchError::SafetyBlocked`] and neither the actuator nor the
//!    execution sub-state is touched.
//! 2. **Actuation**: the sub-state moves to OPENING (any intent other than
//!    REST) or CLOSING (REST), then the actuator is asked to move to the
//!    intent's configuration.  Success records the new grip and HOLDING;
//!    a fault resets the sub-state to IDLE and returns
//!    [`DispatchError::ActuationFailed`].
//!
//! The dispatcher never touches the arm's lifecycle state.  Repeated calls
//! with the same intent are not deduplicated.

use gpm_hal::GripActuator;
use gpm_types::{
    EventPayload, GpmError, GripExecutionState, GripIntent, Observer, SafetyViolation,
    join_messages,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::safety::SafetyMonitor;

const SOURCE: &str = "gpm-kernel::grip_dispatcher";

/// Why a dispatch did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Safety blocked: {}", join_messages(.0))]
    SafetyBlocked(Vec<SafetyViolation>),

    #[error("Actuation failed: {0}")]
    ActuationFailed(GpmError),
}

impl From<DispatchError> for GpmError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::SafetyBlocked(violations) => GpmError::SafetyBlocked(violations),
            DispatchError::ActuationFailed(cause) => cause,
        }
    }
}

/// Owns the actuator, the current grip, and the execution sub-state.
pub struct GripDispatcher {
    actuator: Box<dyn GripActuator>,
    safety: SafetyMonitor,
    current_grip: GripIntent,
    state: GripExecutionState,
    observer: Observer,
}

impl GripDispatcher {
    /// A dispatcher that starts at REST / IDLE.
    pub fn new(actuator: Box<dyn GripActuator>, safety: SafetyMonitor) -> Self {
        Self {
            actuator,
            safety,
            current_grip: GripIntent::Rest,
            state: GripExecutionState::Idle,
            observer: Observer::detached(),
        }
    }

    /// Report dispatch outcomes, and the safety monitor's violations, to
    /// `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.safety = self.safety.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    pub fn current_grip(&self) -> GripIntent {
        self.current_grip
    }

    pub fn execution_state(&self) -> GripExecutionState {
        self.state
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.safety
    }

    /// Run the safety check without actuating.
    ///
    /// # Errors
    ///
    /// Returns every violated constraint.
    pub fn check_safety(&mut self) -> Result<(), Vec<SafetyViolation>> {
        self.safety.check()
    }

    /// Safety-gate and actuate `intent`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::SafetyBlocked`] – the safety check failed; nothing
    ///   was actuated.
    /// - [`DispatchError::ActuationFailed`] – the actuator reported a fault;
    ///   the sub-state is back to IDLE and the current grip is unchanged.
    pub fn execute(&mut self, intent: GripIntent) -> Result<(), DispatchError> {
        if let Err(violations) = self.safety.check() {
            warn!(
                intent = %intent,
                violations = %join_messages(&violations),
                "Grip blocked by safety check"
            );
            self.observer.emit(
                SOURCE,
                EventPayload::DispatchBlocked {
                    intent,
                    violations: violations.clone(),
                },
            );
            return Err(DispatchError::SafetyBlocked(violations));
        }

        self.actuate(intent)
    }

    /// Move to `intent` without a safety check.  Callers must have checked.
    fn actuate(&mut self, intent: GripIntent) -> Result<(), DispatchError> {
        self.state = if intent == GripIntent::Rest {
            GripExecutionState::Closing
        } else {
            GripExecutionState::Opening
        };
        debug!(intent = %intent, state = ?self.state, actuator = self.actuator.id(), "Actuating");

        match self.actuator.move_to_configuration(intent.as_str()) {
            Ok(()) => {
                let from = self.current_grip;
                self.current_grip = intent;
                self.state = GripExecutionState::Holding;
                info!(from = %from, to = %intent, "Grip changed");
                self.observer
                    .emit(SOURCE, EventPayload::GripChanged { from, to: intent });
                Ok(())
            }
            Err(cause) => {
                self.state = GripExecutionState::Idle;
                warn!(intent = %intent, error = %cause, "Actuation failed");
                self.observer.emit(
                    SOURCE,
                    EventPayload::ActuationFailed {
                        intent,
                        details: cause.to_string(),
                    },
                );
                Err(DispatchError::ActuationFailed(cause))
            }
        }
    }

    /// Best-effort move to REST for shutdown.  Skips the safety check: a
    /// failing power system must not prevent the hand from relaxing.
    ///
    /// # Errors
    ///
    /// Returns the actuator fault, if any.
    pub fn release(&mut self) -> Result<(), DispatchError> {
        self.actuate(GripIntent::Rest)
    }
}

impl std::fmt::Debug for GripDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GripDispatcher")
            .field("actuator", &self.actuator.id())
            .field("current_grip", &self.current_grip)
            .field("state", &self.state)
            .finish()
    }
}
