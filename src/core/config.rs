//! # Run lock configuration.
//!
//! Provides [`RunLockConfig`], the settings a [`RunLock`](crate::RunLock) is built with:
//! `RunLock::with_config(config)`.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1 (the event bus always exists)
//! - `initial_capacity = 0` → the running map allocates lazily

/// Configuration for a run lock.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped)
/// - `initial_capacity`: Number of keys the running map is pre-sized for
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct RunLockConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers that lag behind more than `bus_capacity` events observe `Lagged` and skip
    /// older items.
    pub bus_capacity: usize,

    /// Number of concurrently running keys the map is pre-sized for.
    pub initial_capacity: usize,
}

impl RunLockConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for RunLockConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 256`
    /// - `initial_capacity = 0` (grow on demand)
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            initial_capacity: 0,
        }
    }
}
