// src/lib.rs

//! Website probing and scoring engine.
//!
//! Given a URL, `Prober::probe` measures DNS, TCP, TLS, TTFB and total load
//! times, grades the certificate and the security headers, runs a few signal
//! detectors and totals the page's sub-resources into a `SiteReport`.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use crate::config::{ProbeConfig, TransportMode};
pub use crate::core::batch::{TaskId, TaskRegistry, TaskState, TaskStatus, TargetOutcome};
pub use crate::core::models::{ProbeOptions, SiteReport};
pub use crate::core::report::FlatRecord;
pub use crate::core::scanner::{Prober, run_site_probe};
pub use crate::error::{ProbeError, Result};
