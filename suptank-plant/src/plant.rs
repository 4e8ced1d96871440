//! Plant interface.

use std::time::Duration;

/// Highest representable tank level.
pub const LEVEL_MAX: u16 = u16::MAX;

/// One of the two plant valves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Valve {
    /// Drains tank 1 into tank 2.
    V1,
    /// Drains tank 2 out of the plant.
    V2,
}

/// Sensor readings taken at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readings {
    pub v1_open: bool,
    pub v2_open: bool,
    pub h1: u16,
    pub h2: u16,
    pub pump_input: u16,
    pub pump_flow: u16,
    pub overflowing: bool,
}

/// A physical (or simulated) process with two tanks, two valves and a pump.
///
/// Implementations synchronize internally; every method takes `&self`.
pub trait Plant: Send + Sync {
    /// Starts the process.
    fn power_on(&self);

    /// Stops the process. Actuator set-points are kept.
    fn power_off(&self);

    /// Returns whether the process is running.
    fn is_powered(&self) -> bool;

    /// Reads every sensor.
    fn readings(&self) -> Readings;

    /// Opens or closes a valve.
    fn set_valve_open(&self, valve: Valve, open: bool);

    /// Sets the pump input.
    fn set_pump_input(&self, input: u16);

    /// Advances the process by `dt`. Plants that evolve on their own ignore this.
    fn advance(&self, _dt: Duration) {}
}
