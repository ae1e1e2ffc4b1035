//! Core traits and types for instruction-stepped emulation.
//!
//! A machine is a CPU stepping against a [`Bus`], with peripherals advanced
//! by the cycle counts the CPU reports. All timing derives from the machine's
//! master clock frequency; the [`FrameClock`] turns host frame times into
//! cycle budgets without accumulating drift.

mod bus;
mod clock;
mod cpu;
mod tickable;
mod ticks;

pub use bus::Bus;
pub use clock::{FrameClock, MasterClock};
pub use cpu::Cpu;
pub use tickable::Tickable;
pub use ticks::Ticks;
