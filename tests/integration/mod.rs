//! Integration test suite for the campaign engine.
//!
//! These tests drive the public API end to end: phase definitions through the
//! deployment pipeline, and benchmark runs through regression detection,
//! reporting, export and monitoring.
//!
//! # Test Categories
//!
//! - `deployment_e2e`: Phase execution, rollback and pipeline halting
//! - `performance_pipeline`: Benchmarks, regressions, alerts and export
//! - `monitoring`: Periodic monitor and history persistence
//!
//! # CI Compatibility
//!
//! Only standard POSIX utilities (`echo`, `true`, `false`, `sh`, `rm`) are
//! spawned, and benchmark timings come from injected samplers.

mod fixtures;

mod deployment_e2e;
mod performance_pipeline;
mod monitoring;
