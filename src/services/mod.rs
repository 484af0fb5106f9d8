//! Terminal I/O services
//!
//! This module contains all code that deals with the terminal device,
//! OS signals, and logging setup.

pub mod tracing_setup;
pub mod tty;
