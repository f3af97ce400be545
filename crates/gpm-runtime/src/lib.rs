//! `gpm-runtime` – Control Loop & Sequencing
//!
//! Ties the kernel components to the hardware capabilities and drives them
//! on a fixed cadence.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]:
//!   initialisation, the fixed-rate sense / check / actuate loop, the grip
//!   demo and graceful shutdown.  A [`ShutdownHandle`][control_loop::ShutdownHandle]
//!   stops the loop from another thread.
//! - [`command_sequencer`] – [`CommandSequence`][command_sequencer::CommandSequence]:
//!   ordered, fail-fast multi-step commands and a
//!   [`SequenceRegistry`][command_sequencer::SequenceRegistry] to run them by
//!   name.  [`grip_sequence`][command_sequencer::grip_sequence] builds the
//!   standard "safety check, then move" sequence.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   installs the global `tracing` subscriber with an optional OTLP span
//!   exporter.

pub mod command_sequencer;
pub mod control_loop;
pub mod telemetry;

pub use command_sequencer::{
    CommandSequence, CommandStep, GripTiming, SequenceError, SequenceRegistry, grip_sequence,
};
pub use control_loop::{ControlLoop, ControlLoopConfig, LoopExit, ShutdownHandle};
pub use telemetry::{TracerProviderGuard, init_tracing, init_tracing_with_level};
