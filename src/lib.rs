// Terminal device library - raw, signal-aware access to a terminal

pub mod config;
pub mod services;

pub use config::{ConfigError, TtyConfig};
pub use services::tty::{
    ManualNotifier, ModeSnapshot, ResizeCallback, ResizeNotifier, SigwinchNotifier,
    TerminalDevice, Tty, TtyError, WindowSize,
};
