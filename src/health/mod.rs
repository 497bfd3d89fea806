// src/health/mod.rs

//! Host health sampling: probes and the periodic monitor.

pub mod monitor;
pub mod probe;

pub use monitor::HealthMonitor;
pub use probe::{HostProbe, HttpProbe, SystemProbe};
