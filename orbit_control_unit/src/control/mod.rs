//! Control algorithms for the orbit feedback loop.

pub mod pid;

pub use pid::{Pid, PidGains};
