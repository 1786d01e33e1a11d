//! Shell-backed privileged executor for disciplined
//!
//! Runs each command as `<prefix...> "<command>"`, where the prefix is
//! whatever grants elevated rights on the target (`su -c`, `adb shell`,
//! a Shizuku `rish -c` wrapper, or plain `sh -c` when already privileged).

mod shell;

pub use shell::*;
