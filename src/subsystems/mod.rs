//! Long-running subsystems of the consultation bot.

pub mod comms;
pub mod runtime;
