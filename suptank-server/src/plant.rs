//! Plant adapter.
//!
//! Thin facade over a [`Plant`] that the dispatcher reads and mutates.
//! While online the adapter also drives the process model forward on a
//! fixed tick.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use suptank_plant::{Plant, Valve};
use suptank_protocol::PlantSnapshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Facade over the process model.
pub struct PlantAdapter {
    plant: Arc<dyn Plant>,
    tick: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PlantAdapter {
    /// Creates an adapter. A zero `tick` disables automatic advancing.
    pub fn new(plant: Arc<dyn Plant>, tick: Duration) -> Self {
        Self {
            plant,
            tick,
            ticker: Mutex::new(None),
        }
    }

    /// Powers the plant on and starts ticking it.
    ///
    /// Must be called from within a tokio runtime when ticking is enabled.
    pub fn bring_online(&self) {
        self.plant.power_on();

        if self.tick.is_zero() {
            return;
        }
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }

        let plant = Arc::clone(&self.plant);
        let tick = self.tick;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                plant.advance(tick);
            }
        }));
        tracing::debug!("Plant ticking every {:?}", tick);
    }

    /// Stops ticking and powers the plant off.
    pub fn bring_offline(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
        self.plant.power_off();
    }

    pub fn is_online(&self) -> bool {
        self.plant.is_powered()
    }

    /// Takes a fresh snapshot of the process state.
    pub fn snapshot(&self) -> PlantSnapshot {
        let r = self.plant.readings();
        PlantSnapshot {
            v1_open: r.v1_open,
            v2_open: r.v2_open,
            h1: r.h1,
            h2: r.h2,
            pump_input: r.pump_input,
            pump_flow: r.pump_flow,
            overflowing: r.overflowing,
        }
    }

    pub fn set_valve(&self, valve: Valve, open: bool) {
        self.plant.set_valve_open(valve, open);
    }

    pub fn set_pump_input(&self, input: u16) {
        self.plant.set_pump_input(input);
    }
}

impl Drop for PlantAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for PlantAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantAdapter")
            .field("tick", &self.tick)
            .field("online", &self.is_online())
            .field("ticking", &self.ticker.lock().is_some())
            .finish()
    }
}
