//! Control panel state and behavior.
//!
//! This module owns the run state, progress counters, status log and button
//! state. Presentation layers (TUI, headless) feed it user intent and channel
//! events and render what it exposes.

mod controller;
pub(crate) mod state;

pub(crate) use controller::ControlPanel;
