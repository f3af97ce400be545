use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of the prosthetic arm.  Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmState {
    Initializing,
    Idle,
    Active,
    Calibrating,
    Error,
    Shutdown,
}

impl ArmState {
    /// Every state, in declaration order.
    pub const ALL: [ArmState; 6] = [
        ArmState::Initializing,
        ArmState::Idle,
        ArmState::Active,
        ArmState::Calibrating,
        ArmState::Error,
        ArmState::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArmState::Initializing => "INITIALIZING",
            ArmState::Idle => "IDLE",
            ArmState::Active => "ACTIVE",
            ArmState::Calibrating => "CALIBRATING",
            ArmState::Error => "ERROR",
            ArmState::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target grip configuration for the actuator array.
///
/// The lowercase name returned by [`GripIntent::as_str`] is the configuration
/// name handed to the actuation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripIntent {
    Rest,
    Pinch,
    Power,
    Open,
}

impl GripIntent {
    pub const ALL: [GripIntent; 4] = [
        GripIntent::Rest,
        GripIntent::Pinch,
        GripIntent::Power,
        GripIntent::Open,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GripIntent::Rest => "rest",
            GripIntent::Pinch => "pinch",
            GripIntent::Power => "power",
            GripIntent::Open => "open",
        }
    }
}

impl fmt::Display for GripIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GripIntent {
    type Err = GpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(GripIntent::Rest),
            "pinch" => Ok(GripIntent::Pinch),
            "power" => Ok(GripIntent::Power),
            "open" => Ok(GripIntent::Open),
            _ => Err(GpmError::UnknownConfiguration(s.to_string())),
        }
    }
}

/// Sub-state of the grip dispatcher, nested under `ArmState::Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripExecutionState {
    #[default]
    Idle,
    Opening,
    Closing,
    Holding,
}

/// Immutable battery / power-system snapshot pulled from the power monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerStatus {
    /// Pack voltage in volts.
    pub voltage: f32,
    /// Draw in amps.
    pub current: f32,
    /// Pack temperature in °C.
    pub temperature: f32,
    /// State of charge, 0–100.
    pub charge_percentage: f32,
    /// Health flag reported (or derived) by the battery-management system.
    pub healthy: bool,
}

/// Voltage treated as 0 % charge.
pub const EMPTY_PACK_VOLTAGE: f32 = 10.0;
/// Voltage treated as 100 % charge.
pub const FULL_PACK_VOLTAGE: f32 = 12.6;

impl PowerStatus {
    /// Build a snapshot from raw readings, deriving the charge percentage
    /// (linear between [`EMPTY_PACK_VOLTAGE`] and [`FULL_PACK_VOLTAGE`],
    /// clamped to 0–100) and the health flag (`voltage > 10 V` and
    /// `temperature < 50 °C`).
    pub fn from_readings(voltage: f32, current: f32, temperature: f32) -> Self {
        let charge = (voltage - EMPTY_PACK_VOLTAGE) / (FULL_PACK_VOLTAGE - EMPTY_PACK_VOLTAGE)
            * 100.0;
        Self {
            voltage,
            current,
            temperature,
            charge_percentage: charge.clamp(0.0, 100.0),
            healthy: voltage > EMPTY_PACK_VOLTAGE && temperature < 50.0,
        }
    }
}

/// The constraint a [`SafetyViolation`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    LowVoltage,
    OverTemperature,
    OverCurrent,
    UnhealthyPowerSource,
    LowCharge,
    StatusUnavailable,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::LowVoltage => "low-voltage",
            ViolationKind::OverTemperature => "over-temperature",
            ViolationKind::OverCurrent => "over-current",
            ViolationKind::UnhealthyPowerSource => "unhealthy-power-source",
            ViolationKind::LowCharge => "low-charge",
            ViolationKind::StatusUnavailable => "status-unavailable",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed safety constraint.
///
/// `measured` and `threshold` are populated for numeric constraints so that
/// the violation can be diagnosed from the event alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolation {
    pub kind: ViolationKind,
    pub message: String,
    pub measured: Option<f32>,
    pub threshold: Option<f32>,
}

impl SafetyViolation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            measured: None,
            threshold: None,
        }
    }

    /// Attach the measured value and the limit it was compared against.
    pub fn with_reading(mut self, measured: f32, threshold: f32) -> Self {
        self.measured = Some(measured);
        self.threshold = Some(threshold);
        self
    }
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Join violation messages with `"; "`, the form recorded as the lifecycle
/// error message.
pub fn join_messages(violations: &[SafetyViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Structured event wrapper handed to observer sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "gpm-kernel::lifecycle"
    pub source: String,
    pub payload: EventPayload,
}

/// Discrete observations emitted by the core.  Sinks (logs, metrics, a bus)
/// consume these without the core knowing which sink is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    StateTransition {
        from: ArmState,
        to: ArmState,
        error: Option<String>,
    },
    TransitionRejected {
        from: ArmState,
        to: ArmState,
    },
    SafetyViolation(SafetyViolation),
    DispatchBlocked {
        intent: GripIntent,
        violations: Vec<SafetyViolation>,
    },
    GripChanged {
        from: GripIntent,
        to: GripIntent,
    },
    ActuationFailed {
        intent: GripIntent,
        details: String,
    },
    SequenceStepFailed {
        sequence: String,
        index: usize,
        step: String,
        cause: String,
    },
    CapabilityFault {
        component: String,
        details: String,
    },
    /// One failed sensor read; `consecutive` counts failures since the last
    /// good read.
    SensorReadFailed {
        component: String,
        consecutive: u32,
        details: String,
    },
    TickOverrun {
        elapsed_us: u64,
        period_us: u64,
    },
}

/// Anything that can receive core events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Cheap, clonable handle to an optional [`EventSink`].
///
/// Components hold an `Observer` rather than a concrete sink; a detached
/// observer silently drops events.
#[derive(Clone, Default)]
pub struct Observer {
    sink: Option<Arc<dyn EventSink>>,
}

impl Observer {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// An observer with no sink attached.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Wrap `payload` in an [`Event`] stamped now and forward it to the sink.
    pub fn emit(&self, source: &str, payload: EventPayload) {
        if let Some(sink) = &self.sink {
            sink.emit(Event {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                source: source.to_string(),
                payload,
            });
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Global error type spanning capability faults, safety blocks, and lifecycle
/// rejections.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GpmError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Unknown grip configuration: {0}")]
    UnknownConfiguration(String),

    #[error("Safety blocked: {}", join_messages(.0))]
    SafetyBlocked(Vec<SafetyViolation>),

    #[error("Actuation to {intent} failed: {details}")]
    ActuationFailed { intent: GripIntent, details: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: ArmState, to: ArmState },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Event Channel Error: {0}")]
    Channel(String),
}

impl GpmError {
    /// Convenience constructor for [`GpmError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        GpmError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }
}
