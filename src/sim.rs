//! Sim module - in-process segway simulator served over session channels

pub mod plant;
pub mod server;

pub use plant::{PlantConfig, SegwayPlant};
pub use server::{spawn_simulator, SimulatorStats};
