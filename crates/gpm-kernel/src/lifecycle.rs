//! [`ArmStateMachine`] – lifecycle of the arm.
//!
//! The legal moves between [`ArmState`]s are a static adjacency table,
//! exposed as [`allowed_transitions`]:
//!
//! | From | Allowed to |
//! |---|---|
//! | INITIALIZING | IDLE, ERROR |
//! | IDLE | ACTIVE, CALIBRATING, SHUTDOWN, ERROR |
//! | ACTIVE | IDLE, ERROR, SHUTDOWN |
//! | CALIBRATING | IDLE, ERROR |
//! | ERROR | IDLE, SHUTDOWN |
//! | SHUTDOWN | – (terminal) |
//!
//! Self-transitions are not in the table and are therefore rejected.
//!
//! # Example
//!
//! ```
//! use gpm_kernel::ArmStateMachine;
//! use gpm_types::ArmState;
//!
//! let mut arm = ArmStateMachine::new();
//! assert!(arm.transition(ArmState::Idle));
//! assert!(arm.transition(ArmState::Active));
//! assert!(!arm.transition(ArmState::Active));
//! assert_eq!(arm.current(), ArmState::Active);
//! ```

use gpm_types::{ArmState, EventPayload, Observer};
use tracing::{info, warn};

const SOURCE: &str = "gpm-kernel::lifecycle";

/// Error message recorded when ERROR is entered without a reason.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Permitted successor states of `from`.
pub fn allowed_transitions(from: ArmState) -> &'static [ArmState] {
    match from {
        ArmState::Initializing => &[ArmState::Idle, ArmState::Error],
        ArmState::Idle => &[
            ArmState::Active,
            ArmState::Calibrating,
            ArmState::Shutdown,
            ArmState::Error,
        ],
        ArmState::Active => &[ArmState::Idle, ArmState::Error, ArmState::Shutdown],
        ArmState::Calibrating => &[ArmState::Idle, ArmState::Error],
        ArmState::Error => &[ArmState::Idle, ArmState::Shutdown],
        ArmState::Shutdown => &[],
    }
}

/// Owner of the current [`ArmState`].  The only writer of that state.
#[derive(Debug)]
pub struct ArmStateMachine {
    current: ArmState,
    previous: Option<ArmState>,
    error_message: Option<String>,
    observer: Observer,
}

impl Default for ArmStateMachine {
    fn default() -> Self {
        Self {
            current: ArmState::Initializing,
            previous: None,
            error_message: None,
            observer: Observer::detached(),
        }
    }
}

impl ArmStateMachine {
    /// A machine in [`ArmState::Initializing`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Report transitions to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    pub fn current(&self) -> ArmState {
        self.current
    }

    /// The state before the last successful transition.
    pub fn previous(&self) -> Option<ArmState> {
        self.previous
    }

    /// Reason recorded on the last entry into ERROR, while still in ERROR.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// `true` while the arm may be driven (IDLE or ACTIVE).
    pub fn is_operational(&self) -> bool {
        matches!(self.current, ArmState::Idle | ArmState::Active)
    }

    pub fn can_transition(&self, target: ArmState) -> bool {
        allowed_transitions(self.current).contains(&target)
    }

    /// Move to `target` if the table allows it.  Returns `false` and leaves
    /// the state untouched otherwise.
    pub fn transition(&mut self, target: ArmState) -> bool {
        self.transition_with_reason(target, None)
    }

    /// Like [`transition`][ArmStateMachine::transition], recording `reason`
    /// as the error message when `target` is ERROR.  Entering ERROR without a
    /// reason records `"Unknown error"`.
    pub fn transition_with_reason(&mut self, target: ArmState, reason: Option<&str>) -> bool {
        let from = self.current;
        if !self.can_transition(target) {
            warn!(from = %from, to = %target, "Invalid state transition rejected");
            self.observer
                .emit(SOURCE, EventPayload::TransitionRejected { from, to: target });
            return false;
        }

        self.previous = Some(from);
        self.current = target;
        self.error_message = if target == ArmState::Error {
            Some(reason.unwrap_or(UNKNOWN_ERROR).to_string())
        } else {
            None
        };

        match &self.error_message {
            Some(error) => warn!(from = %from, to = %target, error = %error, "State transition"),
            None => info!(from = %from, to = %target, "State transition"),
        }
        self.observer.emit(
            SOURCE,
            EventPayload::StateTransition {
                from,
                to: target,
                error: self.error_message.clone(),
            },
        );
        true
    }
}
