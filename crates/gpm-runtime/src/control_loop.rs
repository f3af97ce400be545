//! [`ControlLoop`] – the fixed-rate sense / check / actuate cycle.
//!
//! Each tick:
//!
//! 1. **Check** – every `safety_check_interval`-th tick (starting with the
//!    first) the power system is evaluated.  A failure moves the arm to
//!    ERROR with the joined violation messages and ends the loop.
//! 2. **Sense** – if the EMG sensor is ready, one batch is read.  Every read
//!    failure is reported, and up to `max_consecutive_sensor_faults` in a row
//!    are tolerated.  Beyond that the arm moves to ERROR and the loop ends.
//! 3. **Classify** – the [`IntentClassifier`] maps the batch to a grip, or to
//!    hold.
//! 4. **Act** – a non-hold intent goes through
//!    [`GripDispatcher::execute`].  A failed dispatch is logged and the loop
//!    carries on.
//! 5. **Pace** – sleep for what remains of the period.  An overrun starts the
//!    next tick immediately; missed ticks are not made up.
//!
//! The loop runs while the running flag is set and the arm is operational.
//! Whatever ends it, the arm is then asked to return to IDLE.  A stop
//! requested through a [`ShutdownHandle`] additionally runs
//! [`ControlLoop::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use gpm_hal::{EmgSensor, HardwareSet, IntentClassifier};
use gpm_kernel::{ArmStateMachine, GripDispatcher, SafetyLimits, SafetyMonitor};
use gpm_types::{
    ArmState, EventPayload, GpmError, GripIntent, Observer, SafetyViolation, join_messages,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command_sequencer::{GripTiming, SequenceError, grip_sequence};

const SOURCE: &str = "gpm-runtime::control_loop";

/// Grips exercised by [`ControlLoop::run_demo`], in order.
pub const DEMO_GRIPS: [GripIntent; 4] = [
    GripIntent::Open,
    GripIntent::Pinch,
    GripIntent::Power,
    GripIntent::Rest,
];

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Timing knobs for [`ControlLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopConfig {
    /// Loop frequency in Hz.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Run the safety check every N ticks.
    #[serde(default = "default_safety_check_interval")]
    pub safety_check_interval: u64,
    /// Consecutive sensor read failures tolerated before the loop faults.
    /// `0` never faults.
    #[serde(default = "default_max_consecutive_sensor_faults")]
    pub max_consecutive_sensor_faults: u32,
    /// Stop after this many ticks.  `None` runs until stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ticks: Option<u64>,
}

fn default_rate_hz() -> f64 {
    100.0
}

fn default_safety_check_interval() -> u64 {
    100
}

fn default_max_consecutive_sensor_faults() -> u32 {
    10
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            safety_check_interval: default_safety_check_interval(),
            max_consecutive_sensor_faults: default_max_consecutive_sensor_faults(),
            max_ticks: None,
        }
    }
}

impl ControlLoopConfig {
    /// Nominal tick period.
    ///
    /// # Errors
    ///
    /// [`GpmError::Config`] when the rate is not a positive finite number or
    /// the safety-check interval is zero.
    pub fn period(&self) -> Result<Duration, GpmError> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(GpmError::Config(format!(
                "rate_hz must be positive, got {}",
                self.rate_hz
            )));
        }
        if self.safety_check_interval == 0 {
            return Err(GpmError::Config(
                "safety_check_interval must be at least 1".to_string(),
            ));
        }
        Ok(Duration::from_secs_f64(1.0 / self.rate_hz))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why [`ControlLoop::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// IDLE → ACTIVE was rejected; the loop never started.
    NotReady(ArmState),
    /// The running flag was cleared.
    Stopped,
    /// The arm left IDLE/ACTIVE by some other path.
    NotOperational(ArmState),
    /// A periodic safety check failed; carries the joined violation messages.
    SafetyFault(String),
    /// A capability kept failing; carries the last fault.
    CapabilityFault(String),
    /// `max_ticks` was reached.
    TickLimit,
}

impl LoopExit {
    /// `true` for exits that left the arm in ERROR.
    pub fn is_fault(&self) -> bool {
        matches!(self, LoopExit::SafetyFault(_) | LoopExit::CapabilityFault(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown handle
// ─────────────────────────────────────────────────────────────────────────────

/// Requests a graceful stop from another thread (e.g. a Ctrl-C handler).
///
/// The loop notices within one tick period.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the lifecycle, the dispatcher and the sensing pipeline.
pub struct ControlLoop {
    lifecycle: ArmStateMachine,
    dispatcher: GripDispatcher,
    sensor: Box<dyn EmgSensor>,
    classifier: Box<dyn IntentClassifier>,
    config: ControlLoopConfig,
    period: Duration,
    running: Arc<AtomicBool>,
    tick_count: u64,
    sensor_faults: u32,
    observer: Observer,
}

impl ControlLoop {
    /// Split `hardware` across the components.  The arm starts INITIALIZING.
    ///
    /// # Errors
    ///
    /// [`GpmError::Config`] for an invalid `config`.
    pub fn new(
        hardware: HardwareSet,
        classifier: Box<dyn IntentClassifier>,
        limits: SafetyLimits,
        config: ControlLoopConfig,
    ) -> Result<Self, GpmError> {
        let period = config.period()?;
        let [actuator_id, power_id, sensor_id] = hardware.ids();
        info!(
            actuator = %actuator_id,
            power = %power_id,
            sensor = %sensor_id,
            "Hardware attached"
        );
        let HardwareSet {
            actuator,
            power,
            sensor,
        } = hardware;
        let safety = SafetyMonitor::new(power, limits);

        Ok(Self {
            lifecycle: ArmStateMachine::new(),
            dispatcher: GripDispatcher::new(actuator, safety),
            sensor,
            classifier,
            config,
            period,
            running: Arc::new(AtomicBool::new(true)),
            tick_count: 0,
            sensor_faults: 0,
            observer: Observer::detached(),
        })
    }

    /// Route every component's events to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.lifecycle = self.lifecycle.with_observer(observer.clone());
        self.dispatcher = self.dispatcher.with_observer(observer.clone());
        self.observer = observer;
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> ArmState {
        self.lifecycle.current()
    }

    pub fn lifecycle(&self) -> &ArmStateMachine {
        &self.lifecycle
    }

    pub fn dispatcher(&self) -> &GripDispatcher {
        &self.dispatcher
    }

    /// Violations found by the most recent safety check.
    pub fn violations(&self) -> &[SafetyViolation] {
        self.dispatcher.safety().violations()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    // ── Lifecycle operations ─────────────────────────────────────────────────

    /// Run the start-up safety check and leave INITIALIZING.
    ///
    /// # Errors
    ///
    /// - [`GpmError::InvalidTransition`] – the arm is not INITIALIZING.
    /// - [`GpmError::SafetyBlocked`] – the check failed; the arm is now in
    ///   ERROR.
    pub fn initialize(&mut self) -> Result<(), GpmError> {
        let from = self.lifecycle.current();
        if from != ArmState::Initializing {
            return Err(GpmError::InvalidTransition {
                from,
                to: ArmState::Idle,
            });
        }

        info!("Initializing prosthetic arm");
        match self.dispatcher.check_safety() {
            Ok(()) => {
                self.lifecycle.transition(ArmState::Idle);
                info!("Initialization complete");
                Ok(())
            }
            Err(violations) => {
                let reason = format!(
                    "Initial safety check failed: {}",
                    join_messages(&violations)
                );
                error!(reason = %reason, "Initialization failed");
                self.lifecycle
                    .transition_with_reason(ArmState::Error, Some(&reason));
                Err(GpmError::SafetyBlocked(violations))
            }
        }
    }

    /// Enter ACTIVE and tick until stopped, faulted, or out of ticks.
    pub fn run(&mut self) -> LoopExit {
        if !self.lifecycle.transition(ArmState::Active) {
            let state = self.lifecycle.current();
            warn!(state = %state, "Control loop not started");
            return LoopExit::NotReady(state);
        }
        // Tick 0 of every run is a safety tick.
        self.tick_count = 0;
        self.sensor_faults = 0;
        info!(
            rate_hz = self.config.rate_hz,
            safety_check_interval = self.config.safety_check_interval,
            "Control loop started"
        );

        let exit = loop {
            if !self.is_running() {
                break LoopExit::Stopped;
            }
            if !self.lifecycle.is_operational() {
                break LoopExit::NotOperational(self.lifecycle.current());
            }
            if self
                .config
                .max_ticks
                .is_some_and(|max| self.tick_count >= max)
            {
                break LoopExit::TickLimit;
            }

            let started = Instant::now();
            if let Err(exit) = self.tick() {
                break exit;
            }
            self.hold_cadence(started);
        };

        info!(exit = ?exit, ticks = self.tick_count, "Control loop stopped");
        self.lifecycle.transition(ArmState::Idle);

        if exit == LoopExit::Stopped {
            self.shutdown();
        }
        exit
    }

    /// One pass of check / sense / classify / act, without pacing.
    ///
    /// # Errors
    ///
    /// The [`LoopExit`] that ends the loop, after the arm has been moved to
    /// ERROR.
    pub fn tick(&mut self) -> Result<(), LoopExit> {
        let tick = self.tick_count;
        self.tick_count += 1;

        if tick % self.config.safety_check_interval == 0
            && let Err(violations) = self.dispatcher.check_safety()
        {
            let reason = join_messages(&violations);
            error!(tick, reason = %reason, "Safety check failed during operation");
            self.lifecycle
                .transition_with_reason(ArmState::Error, Some(&reason));
            return Err(LoopExit::SafetyFault(reason));
        }

        if !self.sensor.is_ready() {
            return Ok(());
        }

        let samples = match self.sensor.read_batch() {
            Ok(samples) => {
                self.sensor_faults = 0;
                samples
            }
            Err(e) => return self.on_sensor_fault(e),
        };

        if let Some(intent) = self.classifier.classify(&samples) {
            match self.dispatcher.execute(intent) {
                Ok(()) => debug!(tick, intent = %intent, "Grip dispatched"),
                Err(e) => warn!(tick, intent = %intent, error = %e, "Grip dispatch failed"),
            }
        }
        Ok(())
    }

    fn on_sensor_fault(&mut self, cause: GpmError) -> Result<(), LoopExit> {
        self.sensor_faults += 1;
        warn!(
            sensor = self.sensor.id(),
            consecutive = self.sensor_faults,
            error = %cause,
            "Sensor read failed"
        );
        self.observer.emit(
            SOURCE,
            EventPayload::SensorReadFailed {
                component: self.sensor.id().to_string(),
                consecutive: self.sensor_faults,
                details: cause.to_string(),
            },
        );

        let budget = self.config.max_consecutive_sensor_faults;
        if budget == 0 || self.sensor_faults < budget {
            return Ok(());
        }

        let reason = format!(
            "Sensor {} failed {} consecutive reads: {cause}",
            self.sensor.id(),
            self.sensor_faults
        );
        error!(reason = %reason, "Sensor fault budget exhausted");
        self.observer.emit(
            SOURCE,
            EventPayload::CapabilityFault {
                component: self.sensor.id().to_string(),
                details: cause.to_string(),
            },
        );
        self.lifecycle
            .transition_with_reason(ArmState::Error, Some(&reason));
        Err(LoopExit::CapabilityFault(reason))
    }

    fn hold_cadence(&self, started: Instant) {
        let elapsed = started.elapsed();
        match self.period.checked_sub(elapsed) {
            Some(remaining) => thread::sleep(remaining),
            None => {
                debug!(
                    elapsed_us = elapsed.as_micros(),
                    period_us = self.period.as_micros(),
                    "Tick overran its period"
                );
                self.observer.emit(
                    SOURCE,
                    EventPayload::TickOverrun {
                        elapsed_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                        period_us: u64::try_from(self.period.as_micros()).unwrap_or(u64::MAX),
                    },
                );
            }
        }
    }

    /// Walk through [`DEMO_GRIPS`], each as a checked grip sequence, pausing
    /// `settle` after every move.  A failed safety check aborts the demo; a
    /// failed move is logged and the demo moves on.  The arm ends in IDLE.
    ///
    /// # Errors
    ///
    /// - [`GpmError::InvalidTransition`] – the arm could not enter ACTIVE.
    /// - [`GpmError::SafetyBlocked`] – the demo was aborted.
    pub fn run_demo(&mut self, settle: Duration) -> Result<(), GpmError> {
        let from = self.lifecycle.current();
        if !self.lifecycle.transition(ArmState::Active) {
            return Err(GpmError::InvalidTransition {
                from,
                to: ArmState::Active,
            });
        }

        let mut outcome = Ok(());
        for intent in DEMO_GRIPS {
            info!(grip = %intent, "Demo grip");
            let mut sequence = grip_sequence(intent, GripTiming::after_move(settle))
                .with_observer(self.observer.clone());

            match sequence.run(&mut self.dispatcher) {
                Ok(()) => info!(grip = %intent, "Demo grip executed"),
                Err(SequenceError::StepFailed {
                    cause: GpmError::SafetyBlocked(violations),
                    ..
                }) => {
                    warn!(grip = %intent, "Safety check failed, aborting demo");
                    outcome = Err(GpmError::SafetyBlocked(violations));
                    break;
                }
                Err(e) => warn!(grip = %intent, error = %e, "Demo grip failed"),
            }
        }

        self.lifecycle.transition(ArmState::Idle);
        info!("Demo complete");
        outcome
    }

    /// Stop the loop, enter SHUTDOWN, relax the hand and release the sensor.
    ///
    /// Hardware failures here are logged and reported, never returned.
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        self.running.store(false, Ordering::SeqCst);
        self.lifecycle.transition(ArmState::Shutdown);

        if let Err(e) = self.dispatcher.release() {
            warn!(error = %e, "Failed to move to rest during shutdown");
        }
        if let Err(e) = self.sensor.release() {
            warn!(sensor = self.sensor.id(), error = %e, "Failed to release sensor");
            self.observer.emit(
                SOURCE,
                EventPayload::CapabilityFault {
                    component: self.sensor.id().to_string(),
                    details: e.to_string(),
                },
            );
        }
        info!("Shutdown complete");
    }
}

impl std::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("state", &self.lifecycle.current())
            .field("dispatcher", &self.dispatcher)
            .field("sensor", &self.sensor.id())
            .field("config", &self.config)
            .field("tick_count", &self.tick_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpm_hal::{SimHardware, ThresholdClassifier};
    use gpm_types::{Event, EventSink, GripExecutionState};
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<Event>>);

    impl EventSink for Collect {
        fn emit(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn fast_config() -> ControlLoopConfig {
        ControlLoopConfig {
            rate_hz: 1000.0,
            safety_check_interval: 5,
            max_consecutive_sensor_faults: 3,
            max_ticks: Some(20),
        }
    }

    fn sim_loop(config: ControlLoopConfig) -> (SimHardware, ControlLoop) {
        let sim = SimHardware::new();
        let control = ControlLoop::new(
            sim.hardware_set(),
            Box::new(ThresholdClassifier::default()),
            SafetyLimits::default(),
            config,
        )
        .unwrap();
        (sim, control)
    }

    #[test]
    fn config_defaults() {
        let config = ControlLoopConfig::default();
        assert_eq!(config.rate_hz, 100.0);
        assert_eq!(config.safety_check_interval, 100);
        assert_eq!(config.period().unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let sim = SimHardware::new();
        let zero_rate = ControlLoopConfig {
            rate_hz: 0.0,
            ..ControlLoopConfig::default()
        };
        assert!(matches!(
            ControlLoop::new(
                sim.hardware_set(),
                Box::new(ThresholdClassifier::default()),
                SafetyLimits::default(),
                zero_rate,
            ),
            Err(GpmError::Config(_))
        ));

        let zero_interval = ControlLoopConfig {
            safety_check_interval: 0,
            ..ControlLoopConfig::default()
        };
        assert!(zero_interval.period().is_err());
    }

    #[test]
    fn initialize_moves_to_idle() {
        let (_sim, mut control) = sim_loop(fast_config());
        assert_eq!(control.state(), ArmState::Initializing);
        control.initialize().unwrap();
        assert_eq!(control.state(), ArmState::Idle);
    }

    #[test]
    fn initialize_failure_records_error() {
        let (sim, mut control) = sim_loop(fast_config());
        sim.simulate_high_temperature();
        assert!(matches!(control.initialize(), Err(GpmError::SafetyBlocked(_))));
        assert_eq!(control.state(), ArmState::Error);
        assert_eq!(
            control.lifecycle().error_message(),
            Some("Initial safety check failed: Temperature critical: 70°C")
        );
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (_sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert!(matches!(
            control.initialize(),
            Err(GpmError::InvalidTransition { from: ArmState::Idle, .. })
        ));
    }

    #[test]
    fn run_requires_initialization() {
        let (sim, mut control) = sim_loop(fast_config());
        assert_eq!(control.run(), LoopExit::NotReady(ArmState::Initializing));
        assert_eq!(control.state(), ArmState::Initializing);
        assert!(sim.actuation_calls().is_empty());
    }

    #[test]
    fn run_stops_at_tick_limit_and_returns_to_idle() {
        let (_sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert_eq!(control.run(), LoopExit::TickLimit);
        assert_eq!(control.tick_count(), 20);
        assert_eq!(control.state(), ArmState::Idle);
        assert_eq!(control.lifecycle().previous(), Some(ArmState::Active));
    }

    #[test]
    fn classified_intents_are_dispatched() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.push_levels(800, 200);
        sim.push_levels(500, 500);
        sim.push_levels(200, 800);

        control.run();
        assert_eq!(sim.actuation_calls(), vec!["open", "power"]);
        assert_eq!(control.dispatcher().current_grip(), GripIntent::Power);
        assert_eq!(
            control.dispatcher().execution_state(),
            GripExecutionState::Holding
        );
    }

    #[test]
    fn periodic_safety_failure_faults_the_loop() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.simulate_low_battery();

        let exit = control.run();
        assert_eq!(exit, LoopExit::SafetyFault("Battery low: 6.5V".to_string()));
        assert!(exit.is_fault());
        assert_eq!(control.tick_count(), 1);
        assert_eq!(control.lifecycle().previous(), Some(ArmState::Error));
        assert_eq!(control.state(), ArmState::Idle);
        assert_eq!(control.violations().len(), 1);
    }

    #[test]
    fn safety_runs_only_on_the_sub_cadence() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert!(control.lifecycle.transition(ArmState::Active));

        control.tick().unwrap();
        sim.simulate_low_battery();
        for _ in 1..5 {
            control.tick().unwrap();
        }
        assert!(matches!(control.tick(), Err(LoopExit::SafetyFault(_))));
        assert_eq!(control.tick_count(), 6);
        assert_eq!(control.state(), ArmState::Error);
    }

    #[test]
    fn dispatch_failure_does_not_stop_the_loop() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.fail_actuation(Some("servo stalled"));
        sim.push_levels(800, 200);

        assert_eq!(control.run(), LoopExit::TickLimit);
        assert_eq!(sim.actuation_calls(), vec!["open"]);
        assert_eq!(
            control.dispatcher().execution_state(),
            GripExecutionState::Idle
        );
    }

    #[test]
    fn sensor_faults_are_absorbed_until_the_budget_runs_out() {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let (sim, control) = sim_loop(fast_config());
        let mut control = control.with_observer(Observer::new(sink.clone()));
        control.initialize().unwrap();
        assert!(control.lifecycle.transition(ArmState::Active));
        sim.fail_sensor_reads(Some("adc timeout"));

        assert!(control.tick().is_ok());
        assert!(control.tick().is_ok());
        assert!(matches!(control.tick(), Err(LoopExit::CapabilityFault(_))));
        assert_eq!(control.state(), ArmState::Error);

        let events = sink.0.lock().unwrap();
        let counts: Vec<u32> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::SensorReadFailed {
                    consecutive,
                    details,
                    ..
                } if details.contains("adc timeout") => Some(*consecutive),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e.payload, EventPayload::CapabilityFault { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn every_failed_read_is_reported_under_the_budget() {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let (sim, control) = sim_loop(ControlLoopConfig {
            max_consecutive_sensor_faults: 10,
            max_ticks: Some(3),
            ..fast_config()
        });
        let mut control = control.with_observer(Observer::new(sink.clone()));
        control.initialize().unwrap();
        sim.fail_sensor_reads(Some("adc timeout"));

        assert_eq!(control.run(), LoopExit::TickLimit);
        let events = sink.0.lock().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e.payload, EventPayload::SensorReadFailed { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn a_second_run_starts_with_a_safety_check() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert_eq!(control.run(), LoopExit::TickLimit);
        assert_eq!(control.tick_count(), 20);

        sim.simulate_low_battery();
        assert_eq!(
            control.run(),
            LoopExit::SafetyFault("Battery low: 6.5V".to_string())
        );
        assert_eq!(control.tick_count(), 1);
        assert_eq!(control.violations().len(), 1);
    }

    #[test]
    fn tick_limit_applies_to_each_run() {
        let (_sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert_eq!(control.run(), LoopExit::TickLimit);
        assert_eq!(control.run(), LoopExit::TickLimit);
        assert_eq!(control.tick_count(), 20);
    }

    #[test]
    fn a_good_read_resets_the_sensor_fault_count() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        assert!(control.lifecycle.transition(ArmState::Active));

        sim.fail_sensor_reads(Some("adc timeout"));
        control.tick().unwrap();
        control.tick().unwrap();
        sim.fail_sensor_reads(None);
        control.tick().unwrap();
        sim.fail_sensor_reads(Some("adc timeout"));
        control.tick().unwrap();
        control.tick().unwrap();
        assert_eq!(control.state(), ArmState::Active);
    }

    #[test]
    fn unready_sensor_is_skipped() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.set_sensor_ready(false);
        sim.fail_sensor_reads(Some("must not be read"));
        sim.push_levels(800, 200);

        assert_eq!(control.run(), LoopExit::TickLimit);
        assert!(sim.actuation_calls().is_empty());
    }

    #[test]
    fn shutdown_handle_stops_and_shuts_down() {
        let (sim, mut control) = sim_loop(ControlLoopConfig {
            max_ticks: None,
            ..fast_config()
        });
        control.initialize().unwrap();
        let handle = control.shutdown_handle();
        handle.request();
        assert!(handle.is_requested());

        assert_eq!(control.run(), LoopExit::Stopped);
        assert_eq!(control.state(), ArmState::Shutdown);
        assert_eq!(sim.actuation_calls(), vec!["rest"]);
        assert!(sim.sensor_released());
    }

    #[test]
    fn shutdown_survives_actuator_failure() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.fail_actuation(Some("bus off"));
        control.shutdown();
        assert_eq!(control.state(), ArmState::Shutdown);
        assert!(!control.is_running());
        assert!(sim.sensor_released());
    }

    #[test]
    fn demo_runs_every_grip_and_returns_to_idle() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        control.run_demo(Duration::ZERO).unwrap();
        assert_eq!(sim.actuation_calls(), vec!["open", "pinch", "power", "rest"]);
        assert_eq!(control.state(), ArmState::Idle);
    }

    #[test]
    fn demo_aborts_on_failed_safety_check() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.simulate_unhealthy();
        assert!(matches!(
            control.run_demo(Duration::ZERO),
            Err(GpmError::SafetyBlocked(_))
        ));
        assert!(sim.actuation_calls().is_empty());
        assert_eq!(control.state(), ArmState::Idle);
    }

    #[test]
    fn demo_continues_past_actuation_failure() {
        let (sim, mut control) = sim_loop(fast_config());
        control.initialize().unwrap();
        sim.fail_actuation(Some("stall"));
        control.run_demo(Duration::ZERO).unwrap();
        assert_eq!(sim.actuation_calls().len(), 4);
    }

    #[test]
    fn overruns_are_reported() {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let (_sim, control) = sim_loop(fast_config());
        let control = control.with_observer(Observer::new(sink.clone()));

        control.hold_cadence(Instant::now() - Duration::from_millis(50));
        let events = sink.0.lock().unwrap();
        assert!(matches!(
            events[0].payload,
            EventPayload::TickOverrun { period_us: 1000, .. }
        ));
    }
}
