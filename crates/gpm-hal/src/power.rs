//! Generic `PowerMonitor` trait for the battery-management system.

use gpm_types::{GpmError, PowerStatus};

/// Source of [`PowerStatus`] snapshots.
///
/// Takes `&self` so one monitor can be shared (behind an `Arc`) between the
/// grip dispatcher and the control loop; drivers that cache readings use
/// interior mutability.
pub trait PowerMonitor: Send + Sync {
    /// Stable identifier, e.g. `"bms"`.
    fn id(&self) -> &str;

    /// Pull a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GpmError::HardwareFault`] if the BMS cannot be read.
    fn read_status(&self) -> Result<PowerStatus, GpmError>;
}
