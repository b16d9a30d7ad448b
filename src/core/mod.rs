// src/core/mod.rs

// Root of the `core` module: the probing engine and the data it produces.

/// Data structures shared by every stage, such as `SiteReport` and `ProbeOptions`.
pub mod models;

/// Input normalization and hostname extraction.
pub mod target;

/// Per-stage scanners and the `Prober` that sequences them.
pub mod scanner;

/// Flat records and display lines derived from a `SiteReport`.
pub mod report;

/// Batch tasks over many targets.
pub mod batch;
