//! `gpm-middleware` – The Nervous System
//!
//! Carries structured core events to whoever is listening (log shippers,
//! telemetry exporters, a dashboard) without the core knowing who that is.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.  [`EventBus`] implements
//!   [`EventSink`][gpm_types::EventSink], so it plugs straight into an
//!   [`Observer`][gpm_types::Observer].

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
