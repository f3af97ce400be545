//! Power-system safety evaluation.
//!
//! [`evaluate`] is a pure function of a [`PowerStatus`] snapshot and the
//! configured [`SafetyLimits`].  Unlike a short-circuiting rule chain it
//! checks **every** constraint, so a single pass reports all violations.
//!
//! [`SafetyMonitor`] is the stateful wrapper used by the dispatcher and the
//! control loop: it pulls a fresh snapshot from the [`PowerMonitor`]
//! capability, evaluates it, replaces its stored violation list wholesale and
//! reports each violation to the observer sink.

use std::sync::Arc;

use gpm_hal::PowerMonitor;
use gpm_types::{EventPayload, Observer, PowerStatus, SafetyViolation, ViolationKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SOURCE: &str = "gpm-kernel::safety";

// ────────────────────────────────────────────────────────────────────────────
// Limits
// ────────────────────────────────────────────────────────────────────────────

/// Thresholds the power system must stay within for the arm to move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Pack voltage below this is a `low-voltage` violation.
    #[serde(default = "default_critical_voltage")]
    pub critical_voltage: f32,
    /// Pack temperature above this is an `over-temperature` violation.
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f32,
    /// Current draw above this is an `over-current` violation.
    #[serde(default = "default_max_current")]
    pub max_current: f32,
    /// When set, charge below this is a `low-charge` violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_charge_percentage: Option<f32>,
}

fn default_critical_voltage() -> f32 {
    7.0
}

fn default_max_temperature() -> f32 {
    60.0
}

fn default_max_current() -> f32 {
    10.0
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            critical_voltage: default_critical_voltage(),
            max_temperature: default_max_temperature(),
            max_current: default_max_current(),
            min_charge_percentage: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Evaluator
// ────────────────────────────────────────────────────────────────────────────

/// Check `status` against `limits`.
///
/// Constraints are evaluated independently and in a fixed order (voltage,
/// temperature, current, health, charge), so the returned list is stable for
/// a given input.
///
/// # Errors
///
/// Returns the non-empty list of violated constraints.
pub fn evaluate(status: &PowerStatus, limits: &SafetyLimits) -> Result<(), Vec<SafetyViolation>> {
    let mut violations = Vec::new();

    if status.voltage < limits.critical_voltage {
        violations.push(
            SafetyViolation::new(
                ViolationKind::LowVoltage,
                format!("Battery low: {}V", status.voltage),
            )
            .with_reading(status.voltage, limits.critical_voltage),
        );
    }
    if status.temperature > limits.max_temperature {
        violations.push(
            SafetyViolation::new(
                ViolationKind::OverTemperature,
                format!("Temperature critical: {}°C", status.temperature),
            )
            .with_reading(status.temperature, limits.max_temperature),
        );
    }
    if status.current > limits.max_current {
        violations.push(
            SafetyViolation::new(
                ViolationKind::OverCurrent,
                format!("Current high: {}A", status.current),
            )
            .with_reading(status.current, limits.max_current),
        );
    }
    if !status.healthy {
        violations.push(SafetyViolation::new(
            ViolationKind::UnhealthyPowerSource,
            "BMS reports unhealthy state",
        ));
    }
    if let Some(min_charge) = limits.min_charge_percentage {
        if status.charge_percentage < min_charge {
            violations.push(
                SafetyViolation::new(
                    ViolationKind::LowCharge,
                    format!("Charge low: {}%", status.charge_percentage),
                )
                .with_reading(status.charge_percentage, min_charge),
            );
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Monitor
// ────────────────────────────────────────────────────────────────────────────

/// Pulls power snapshots and keeps the result of the latest evaluation.
pub struct SafetyMonitor {
    limits: SafetyLimits,
    power: Arc<dyn PowerMonitor>,
    violations: Vec<SafetyViolation>,
    observer: Observer,
}

impl SafetyMonitor {
    pub fn new(power: Arc<dyn PowerMonitor>, limits: SafetyLimits) -> Self {
        Self {
            limits,
            power,
            violations: Vec::new(),
            observer: Observer::detached(),
        }
    }

    /// Report violations to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Read the power capability and evaluate the snapshot.
    ///
    /// A failed read does not propagate: it becomes a single
    /// `status-unavailable` violation.
    ///
    /// # Errors
    ///
    /// Returns the violations of this evaluation (also retained in
    /// [`SafetyMonitor::violations`]).
    pub fn check(&mut self) -> Result<(), Vec<SafetyViolation>> {
        let outcome = match self.power.read_status() {
            Ok(status) => {
                debug!(
                    voltage = status.voltage,
                    current = status.current,
                    temperature = status.temperature,
                    "Power status read"
                );
                evaluate(&status, &self.limits)
            }
            Err(e) => Err(vec![SafetyViolation::new(
                ViolationKind::StatusUnavailable,
                format!("power status unavailable: {e}"),
            )]),
        };

        self.violations = match &outcome {
            Ok(()) => Vec::new(),
            Err(violations) => violations.clone(),
        };

        for violation in &self.violations {
            warn!(kind = %violation.kind, message = %violation.message, "Safety violation");
            self.observer
                .emit(SOURCE, EventPayload::SafetyViolation(violation.clone()));
        }

        outcome
    }

    /// Violations found by the most recent [`check`][SafetyMonitor::check].
    pub fn violations(&self) -> &[SafetyViolation] {
        &self.violations
    }

    /// `true` when the most recent check passed (or none has run yet).
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty()
    }
}

impl std::fmt::Debug for SafetyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyMonitor")
            .field("limits", &self.limits)
            .field("power", &self.power.id())
            .field("violations", &self.violations)
            .finish()
    }
}
