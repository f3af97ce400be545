//! End-to-end scenarios over the simulation backend.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gpm_hal::{SimHardware, ThresholdClassifier};
use gpm_kernel::{
    ArmStateMachine, DispatchError, GripDispatcher, SafetyLimits, SafetyMonitor, evaluate,
};
use gpm_middleware::{EventBus, Topic};
use gpm_runtime::{
    CommandSequence, CommandStep, ControlLoop, ControlLoopConfig, LoopExit, SequenceError,
};
use gpm_types::{
    ArmState, EventPayload, GpmError, GripExecutionState, GripIntent, Observer, PowerStatus,
    ViolationKind,
};

fn control_loop(sim: &SimHardware, config: ControlLoopConfig) -> ControlLoop {
    ControlLoop::new(
        sim.hardware_set(),
        Box::new(ThresholdClassifier::default()),
        SafetyLimits::default(),
        config,
    )
    .expect("valid config")
}

#[test]
fn low_voltage_blocks_pinch_without_actuation() {
    let status = PowerStatus {
        voltage: 6.5,
        current: 0.5,
        temperature: 25.0,
        charge_percentage: 0.0,
        healthy: true,
    };
    let violations = evaluate(&status, &SafetyLimits::default()).unwrap_err();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::LowVoltage);

    let sim = SimHardware::new();
    sim.set_power_status(status);
    let hw = sim.hardware_set();
    let mut dispatcher = GripDispatcher::new(
        hw.actuator,
        SafetyMonitor::new(hw.power, SafetyLimits::default()),
    );

    let err = dispatcher.execute(GripIntent::Pinch).unwrap_err();
    assert!(matches!(err, DispatchError::SafetyBlocked(ref v) if v.len() == 1));
    assert!(sim.actuation_calls().is_empty());
    assert_eq!(dispatcher.current_grip(), GripIntent::Rest);
    assert_eq!(dispatcher.execution_state(), GripExecutionState::Idle);
}

#[test]
fn lifecycle_rejects_active_to_active() {
    let mut arm = ArmStateMachine::new();
    assert_eq!(arm.current(), ArmState::Initializing);
    assert!(arm.transition(ArmState::Idle));
    assert!(arm.transition(ArmState::Active));
    assert!(!arm.transition(ArmState::Active));
    assert_eq!(arm.current(), ArmState::Active);
}

#[test]
fn sequence_stops_at_failing_step() {
    let mut ran = Vec::new();
    let mut seq = CommandSequence::new(
        "abc",
        vec![
            CommandStep::new("stepA", Duration::ZERO, |ran: &mut Vec<&'static str>| {
                ran.push("A");
                Ok(())
            }),
            CommandStep::new("stepB", Duration::ZERO, |ran: &mut Vec<&'static str>| {
                ran.push("B");
                Err(GpmError::hardware("stepB", "refused"))
            }),
            CommandStep::new("stepC", Duration::ZERO, |ran: &mut Vec<&'static str>| {
                ran.push("C");
                Ok(())
            }),
        ],
    );

    let err = seq.run(&mut ran).unwrap_err();
    assert!(matches!(
        err,
        SequenceError::StepFailed { index: 2, ref step, .. } if step == "stepB"
    ));
    assert_eq!(ran, vec!["A", "B"]);
    assert!(!seq.is_completed());
}

#[test]
fn loop_holds_its_cadence() {
    let sim = SimHardware::new();
    let ticks = 10;
    let mut control = control_loop(
        &sim,
        ControlLoopConfig {
            rate_hz: 50.0,
            max_ticks: Some(ticks),
            ..ControlLoopConfig::default()
        },
    );
    control.initialize().unwrap();

    let start = Instant::now();
    assert_eq!(control.run(), LoopExit::TickLimit);
    let elapsed = start.elapsed();

    let nominal = control.period() * ticks as u32;
    assert!(elapsed + control.period() >= nominal, "too fast: {elapsed:?}");
    assert!(elapsed < nominal * 2, "too slow: {elapsed:?}");
}

#[test]
fn shutdown_from_another_thread_within_a_tick() {
    let sim = SimHardware::new();
    let mut control = control_loop(&sim, ControlLoopConfig::default());
    control.initialize().unwrap();
    let handle = control.shutdown_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.request();
        Instant::now()
    });

    let exit = control.run();
    let finished = Instant::now();
    let requested = stopper.join().unwrap();

    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(control.state(), ArmState::Shutdown);
    assert!(finished.duration_since(requested) < control.period() * 5);
    assert_eq!(sim.actuation_calls().last().map(String::as_str), Some("rest"));
    assert!(sim.sensor_released());
}

#[test]
fn grip_and_lifecycle_events_reach_the_bus() {
    let bus = EventBus::default();
    let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);
    let mut safety = bus.subscribe_to(Topic::Safety);
    let mut grip = bus.subscribe_to(Topic::Grip);

    let sim = SimHardware::new();
    let mut control = control_loop(
        &sim,
        ControlLoopConfig {
            rate_hz: 1000.0,
            safety_check_interval: 3,
            max_ticks: Some(10),
            ..ControlLoopConfig::default()
        },
    )
    .with_observer(Observer::new(Arc::new(bus.clone())));

    control.initialize().unwrap();
    sim.push_levels(200, 800);

    assert_eq!(control.run(), LoopExit::TickLimit);

    let changed = grip.try_recv().expect("grip event");
    assert!(matches!(
        changed.payload,
        EventPayload::GripChanged {
            from: GripIntent::Rest,
            to: GripIntent::Power
        }
    ));
    assert!(grip.try_recv().is_none());

    let mut states = Vec::new();
    while let Some(event) = lifecycle.try_recv() {
        if let EventPayload::StateTransition { to, .. } = event.payload {
            states.push(to);
        }
    }
    assert_eq!(states, vec![ArmState::Idle, ArmState::Active, ArmState::Idle]);
    assert!(safety.try_recv().is_none());
}

#[test]
fn safety_fault_is_reported_with_reading_and_threshold() {
    let bus = EventBus::default();
    let mut safety = bus.subscribe_to(Topic::Safety);
    let mut lifecycle = bus.subscribe_to(Topic::Lifecycle);

    let sim = SimHardware::new();
    let mut control = control_loop(&sim, ControlLoopConfig::default())
        .with_observer(Observer::new(Arc::new(bus.clone())));
    control.initialize().unwrap();
    sim.simulate_high_temperature();

    let exit = control.run();
    assert_eq!(
        exit,
        LoopExit::SafetyFault("Temperature critical: 70°C".to_string())
    );

    let event = safety.try_recv().expect("violation event");
    match event.payload {
        EventPayload::SafetyViolation(v) => {
            assert_eq!(v.kind, ViolationKind::OverTemperature);
            assert_eq!(v.measured, Some(70.0));
            assert_eq!(v.threshold, Some(60.0));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let mut error = None;
    while let Some(event) = lifecycle.try_recv() {
        if let EventPayload::StateTransition {
            to: ArmState::Error,
            error: message,
            ..
        } = event.payload
        {
            error = message;
        }
    }
    assert_eq!(error.as_deref(), Some("Temperature critical: 70°C"));
    assert_eq!(control.state(), ArmState::Idle);
}
