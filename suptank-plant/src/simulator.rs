//! Two-tank simulator.
//!
//! The pump fills tank 1. With valve 1 open, tank 1 drains into tank 2 at a
//! rate proportional to the square root of its level; with valve 2 open,
//! tank 2 drains out of the plant the same way. A tank that reaches
//! [`LEVEL_MAX`] is clamped there and raises the overflow flag.

use crate::plant::{Plant, Readings, Valve, LEVEL_MAX};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Simulator coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorParams {
    /// Pump flow produced per unit of pump input.
    pub pump_gain: f64,
    /// Level gained by tank 1 per unit of pump flow per second.
    pub inflow_rate: f64,
    /// Drain coefficient of valve 1 (level units per second per sqrt(level)).
    pub v1_coefficient: f64,
    /// Drain coefficient of valve 2.
    pub v2_coefficient: f64,
}

impl Default for SimulatorParams {
    fn default() -> Self {
        Self {
            pump_gain: 1.0,
            inflow_rate: 0.05,
            v1_coefficient: 20.0,
            v2_coefficient: 20.0,
        }
    }
}

#[derive(Debug, Default)]
struct TankState {
    powered: bool,
    v1_open: bool,
    v2_open: bool,
    h1: f64,
    h2: f64,
    pump_input: u16,
    overflowing: bool,
}

/// Simulated plant.
#[derive(Debug, Default)]
pub struct TankSimulator {
    params: SimulatorParams,
    state: Mutex<TankState>,
}

impl TankSimulator {
    /// Creates a simulator with empty tanks, closed valves and the pump stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simulator with custom coefficients.
    pub fn with_params(params: SimulatorParams) -> Self {
        Self {
            params,
            state: Mutex::new(TankState::default()),
        }
    }

    /// Returns the simulator coefficients.
    pub fn params(&self) -> &SimulatorParams {
        &self.params
    }

    /// Forces the tank levels. Intended for seeding scenarios.
    pub fn set_levels(&self, h1: u16, h2: u16) {
        let mut state = self.state.lock();
        state.h1 = h1 as f64;
        state.h2 = h2 as f64;
        state.overflowing = h1 == LEVEL_MAX || h2 == LEVEL_MAX;
    }

    fn pump_flow(&self, state: &TankState) -> f64 {
        if !state.powered {
            return 0.0;
        }
        (state.pump_input as f64 * self.params.pump_gain).clamp(0.0, LEVEL_MAX as f64)
    }
}

impl Plant for TankSimulator {
    fn power_on(&self) {
        self.state.lock().powered = true;
        tracing::info!("Plant powered on");
    }

    fn power_off(&self) {
        self.state.lock().powered = false;
        tracing::info!("Plant powered off");
    }

    fn is_powered(&self) -> bool {
        self.state.lock().powered
    }

    fn readings(&self) -> Readings {
        let state = self.state.lock();
        Readings {
            v1_open: state.v1_open,
            v2_open: state.v2_open,
            h1: state.h1.round() as u16,
            h2: state.h2.round() as u16,
            pump_input: state.pump_input,
            pump_flow: self.pump_flow(&state).round() as u16,
            overflowing: state.overflowing,
        }
    }

    fn set_valve_open(&self, valve: Valve, open: bool) {
        let mut state = self.state.lock();
        match valve {
            Valve::V1 => state.v1_open = open,
            Valve::V2 => state.v2_open = open,
        }
    }

    fn set_pump_input(&self, input: u16) {
        self.state.lock().pump_input = input;
    }

    fn advance(&self, dt: Duration) {
        let mut state = self.state.lock();
        if !state.powered {
            return;
        }
        let secs = dt.as_secs_f64();
        let max = LEVEL_MAX as f64;

        let inflow = self.pump_flow(&state) * self.params.inflow_rate;
        let q1 = if state.v1_open {
            self.params.v1_coefficient * state.h1.sqrt()
        } else {
            0.0
        };
        let q2 = if state.v2_open {
            self.params.v2_coefficient * state.h2.sqrt()
        } else {
            0.0
        };

        // Outflow cannot exceed what the tank holds
        let q1 = q1.min(state.h1 / secs.max(f64::EPSILON) + inflow);
        let q2 = q2.min(state.h2 / secs.max(f64::EPSILON) + q1);

        let h1 = state.h1 + (inflow - q1) * secs;
        let h2 = state.h2 + (q1 - q2) * secs;

        state.overflowing = h1 >= max || h2 >= max;
        state.h1 = h1.clamp(0.0, max);
        state.h2 = h2.clamp(0.0, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> TankSimulator {
        let sim = TankSimulator::new();
        sim.power_on();
        sim
    }

    #[test]
    fn test_initial_state() {
        let sim = TankSimulator::new();
        assert!(!sim.is_powered());
        assert_eq!(sim.readings(), Readings::default());
    }

    #[test]
    fn test_setpoints_are_reflected() {
        let sim = running();
        sim.set_valve_open(Valve::V1, true);
        sim.set_pump_input(5000);

        let r = sim.readings();
        assert!(r.v1_open);
        assert!(!r.v2_open);
        assert_eq!(r.pump_input, 5000);
        assert_eq!(r.pump_flow, 5000);
    }

    #[test]
    fn test_no_flow_when_powered_off() {
        let sim = TankSimulator::new();
        sim.set_pump_input(5000);
        sim.advance(Duration::from_secs(1));

        let r = sim.readings();
        assert_eq!(r.pump_flow, 0);
        assert_eq!(r.h1, 0);
    }

    #[test]
    fn test_pump_fills_tank1() {
        let sim = running();
        sim.set_pump_input(1000);
        sim.advance(Duration::from_secs(1));

        // 1000 flow * 0.05 per second
        assert_eq!(sim.readings().h1, 50);
        assert_eq!(sim.readings().h2, 0);
    }

    #[test]
    fn test_valve1_transfers_to_tank2() {
        let sim = running();
        sim.set_levels(10000, 0);
        sim.set_valve_open(Valve::V1, true);
        sim.advance(Duration::from_millis(100));

        let r = sim.readings();
        assert!(r.h1 < 10000);
        assert!(r.h2 > 0);
        // Mass is conserved while valve 2 is closed and the pump is off
        assert!((r.h1 as i32 + r.h2 as i32 - 10000).abs() <= 1);
    }

    #[test]
    fn test_valve2_drains_tank2() {
        let sim = running();
        sim.set_levels(0, 10000);
        sim.set_valve_open(Valve::V2, true);
        sim.advance(Duration::from_millis(100));

        assert!(sim.readings().h2 < 10000);
    }

    #[test]
    fn test_levels_never_negative() {
        let sim = running();
        sim.set_levels(4, 4);
        sim.set_valve_open(Valve::V1, true);
        sim.set_valve_open(Valve::V2, true);
        for _ in 0..100 {
            sim.advance(Duration::from_secs(1));
        }
        let r = sim.readings();
        assert_eq!(r.h1, 0);
        assert_eq!(r.h2, 0);
    }

    #[test]
    fn test_overflow_flag() {
        let sim = running();
        sim.set_levels(LEVEL_MAX - 10, 0);
        sim.set_pump_input(u16::MAX);
        sim.advance(Duration::from_secs(1));

        let r = sim.readings();
        assert_eq!(r.h1, LEVEL_MAX);
        assert!(r.overflowing);

        // Draining below capacity clears the flag
        sim.set_pump_input(0);
        sim.set_valve_open(Valve::V1, true);
        sim.advance(Duration::from_secs(1));
        assert!(!sim.readings().overflowing);
    }

    #[test]
    fn test_params_from_yaml() {
        let params: SimulatorParams = serde_yaml::from_str("pump_gain: 0.5\n").unwrap();
        assert_eq!(params.pump_gain, 0.5);
        assert_eq!(params.inflow_rate, SimulatorParams::default().inflow_rate);
    }
}
