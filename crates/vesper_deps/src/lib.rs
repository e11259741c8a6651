//! Dependency tracking and change monitoring for incremental synthesis.
//!
//! [`DependencyGraph`] records which modules instantiate which, answers
//! transitive-dependent queries for invalidation, and produces a best-effort
//! topological ordering. [`ChangeMonitor`] classifies modules as added,
//! deleted, or modified against a fingerprint baseline, consuming the
//! design's mutation journal and falling back to snapshot diffing.

#![warn(missing_docs)]

pub mod graph;
pub mod monitor;

pub use graph::DependencyGraph;
pub use monitor::ChangeMonitor;
