//! Control module - PID law and the balance episode loop

pub mod balance;
pub mod pid;

pub use balance::{BalanceLoop, BalanceSettings, EndReason, Episode, EpisodeResult};
pub use pid::{PidController, PidGains};
