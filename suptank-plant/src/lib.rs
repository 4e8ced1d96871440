//! # suptank-plant
//!
//! Process model for the suptank supervisory server.
//!
//! This crate provides:
//! - The [`Plant`] trait the server reads sensors from and writes set-points to
//! - [`TankSimulator`], a two-tank gravity-drain model driven by one pump

pub mod plant;
pub mod simulator;

pub use plant::{Plant, Readings, Valve, LEVEL_MAX};
pub use simulator::{SimulatorParams, TankSimulator};
