//! Command Sequencer.
//!
//! Runs ordered, fail-fast lists of [`CommandStep`]s.  Composite operations
//! such as "safety check, then move" are expressed as a [`CommandSequence`]
//! and may be looked up by name through a [`SequenceRegistry`].
//!
//! Each step's action receives a mutable execution context `C` (use `()` for
//! context-free steps) and reports failure by returning a [`GpmError`].  Any
//! `Err` is treated as step failure: the run stops there, later steps are not
//! executed, and nothing already done is rolled back.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use gpm_runtime::command_sequencer::{CommandSequence, CommandStep, SequenceError};
//! use gpm_types::GpmError;
//!
//! let mut seq = CommandSequence::new("demo", vec![
//!     CommandStep::new("a", Duration::ZERO, |_: &mut ()| Ok(())),
//!     CommandStep::new("b", Duration::ZERO, |_: &mut ()| Err(GpmError::Config("nope".into()))),
//! ]);
//!
//! let err = seq.run(&mut ()).unwrap_err();
//! assert!(matches!(err, SequenceError::StepFailed { index: 2, .. }));
//! assert!(!seq.is_completed());
//! ```

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use gpm_kernel::GripDispatcher;
use gpm_types::{EventPayload, GpmError, GripIntent, Observer};
use thiserror::Error;
use tracing::{debug, info, warn};

const SOURCE: &str = "gpm-runtime::command_sequencer";

/// Settle time after the safety-check step of a grip sequence.
pub const GRIP_CHECK_SETTLE: Duration = Duration::from_millis(100);
/// Settle time after the move step of a grip sequence.
pub const GRIP_MOVE_SETTLE: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequenceError {
    /// Step number `index` (1-based) returned an error.
    #[error("Sequence '{sequence}' failed at step {index} ({step}): {cause}")]
    StepFailed {
        sequence: String,
        index: usize,
        step: String,
        cause: GpmError,
    },

    #[error("Unknown sequence: {0}")]
    UnknownSequence(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandStep
// ─────────────────────────────────────────────────────────────────────────────

type StepAction<C> = Box<dyn FnMut(&mut C) -> Result<(), GpmError> + Send>;

/// One named action followed by a settle delay.
pub struct CommandStep<C> {
    name: String,
    action: StepAction<C>,
    delay: Duration,
}

impl<C> CommandStep<C> {
    /// `delay` elapses after the action succeeds and before the next step.
    pub fn new(
        name: impl Into<String>,
        delay: Duration,
        action: impl FnMut(&mut C) -> Result<(), GpmError> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            action: Box::new(action),
            delay,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<C> std::fmt::Debug for CommandStep<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStep")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandSequence
// ─────────────────────────────────────────────────────────────────────────────

/// An ordered, reusable list of steps.
pub struct CommandSequence<C> {
    name: String,
    steps: Vec<CommandStep<C>>,
    cursor: usize,
    completed: bool,
    observer: Observer,
}

impl<C> CommandSequence<C> {
    pub fn new(name: impl Into<String>, steps: Vec<CommandStep<C>>) -> Self {
        Self {
            name: name.into(),
            steps,
            cursor: 0,
            completed: false,
            observer: Observer::detached(),
        }
    }

    /// Report step failures to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CommandStep<C>] {
        &self.steps
    }

    /// Index of the step currently (or last) being executed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `true` once every step of the last run succeeded.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Reset, then execute every step in order against `ctx`.
    ///
    /// # Errors
    ///
    /// [`SequenceError::StepFailed`] for the first step whose action returned
    /// an error.  Steps after it are not run.
    pub fn run(&mut self, ctx: &mut C) -> Result<(), SequenceError> {
        self.cursor = 0;
        self.completed = false;
        info!(sequence = %self.name, steps = self.steps.len(), "Running sequence");

        while self.cursor < self.steps.len() {
            let step = &mut self.steps[self.cursor];
            let index = self.cursor + 1;
            debug!(sequence = %self.name, index, step = %step.name, "Running step");

            if let Err(cause) = (step.action)(ctx) {
                warn!(
                    sequence = %self.name,
                    index,
                    step = %step.name,
                    error = %cause,
                    "Sequence step failed"
                );
                self.observer.emit(
                    SOURCE,
                    EventPayload::SequenceStepFailed {
                        sequence: self.name.clone(),
                        index,
                        step: step.name.clone(),
                        cause: cause.to_string(),
                    },
                );
                return Err(SequenceError::StepFailed {
                    sequence: self.name.clone(),
                    index,
                    step: step.name.clone(),
                    cause,
                });
            }

            if !step.delay.is_zero() {
                thread::sleep(step.delay);
            }
            self.cursor += 1;
        }

        self.completed = true;
        info!(sequence = %self.name, "Sequence completed");
        Ok(())
    }
}

impl<C> std::fmt::Debug for CommandSequence<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSequence")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("cursor", &self.cursor)
            .field("completed", &self.completed)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SequenceRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Named sequences, owned by the registry.
pub struct SequenceRegistry<C> {
    sequences: HashMap<String, CommandSequence<C>>,
}

impl<C> Default for SequenceRegistry<C> {
    fn default() -> Self {
        Self {
            sequences: HashMap::new(),
        }
    }
}

impl<C> SequenceRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sequence` under its own name, returning any sequence it
    /// replaced.
    pub fn register(&mut self, sequence: CommandSequence<C>) -> Option<CommandSequence<C>> {
        self.sequences.insert(sequence.name.clone(), sequence)
    }

    pub fn get(&self, name: &str) -> Option<&CommandSequence<C>> {
        self.sequences.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the sequence registered as `name`.
    ///
    /// # Errors
    ///
    /// - [`SequenceError::UnknownSequence`] – nothing registered under `name`.
    /// - [`SequenceError::StepFailed`] – as for [`CommandSequence::run`].
    pub fn execute(&mut self, name: &str, ctx: &mut C) -> Result<(), SequenceError> {
        self.sequences
            .get_mut(name)
            .ok_or_else(|| SequenceError::UnknownSequence(name.to_string()))?
            .run(ctx)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grip sequences
// ─────────────────────────────────────────────────────────────────────────────

/// Settle times used by [`grip_sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GripTiming {
    pub check_settle: Duration,
    pub move_settle: Duration,
}

impl Default for GripTiming {
    fn default() -> Self {
        Self {
            check_settle: GRIP_CHECK_SETTLE,
            move_settle: GRIP_MOVE_SETTLE,
        }
    }
}

impl GripTiming {
    /// No delay after the check, `settle` after the move.
    pub fn after_move(settle: Duration) -> Self {
        Self {
            check_settle: Duration::ZERO,
            move_settle: settle,
        }
    }
}

/// "Safety check" then "Move to <grip>", run against a [`GripDispatcher`].
pub fn grip_sequence(intent: GripIntent, timing: GripTiming) -> CommandSequence<GripDispatcher> {
    CommandSequence::new(
        format!("grip_{intent}"),
        vec![
            CommandStep::new(
                "Safety check",
                timing.check_settle,
                |dispatcher: &mut GripDispatcher| {
                    dispatcher.check_safety().map_err(GpmError::SafetyBlocked)
                },
            ),
            CommandStep::new(
                format!("Move to {intent}"),
                timing.move_settle,
                move |dispatcher: &mut GripDispatcher| {
                    dispatcher.execute(intent).map_err(GpmError::from)
                },
            ),
        ],
    )
}
