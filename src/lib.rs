//! # Zenith Fabric Planner
//!
//! Deterministic GPU-cluster fabric topology planner.
//!
//! Copyright 2026 Wahyu Ardiansyah and Zenith AI Contributors
//! Licensed under Apache License 2.0
//!
//! Given a declarative hardware description (GPUs, CPUs, NICs, PCIe
//! switches, NVSwitches, their interconnect) plus a set of tunable
//! options, this crate builds a topology graph, computes best paths
//! between compute endpoints, searches for a set of Hamiltonian rings
//! through all GPUs under bandwidth and path-quality constraints,
//! derives paired tree channels from those rings, and optionally
//! matches the topology against a registry of pre-computed patterns to
//! bypass the search. A stepwise decision log is emitted throughout so
//! every choice is auditable.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Zenith Fabric Planner                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────────┐  ┌─────────────────────┐  │
//! │  │  types    │  │ decision_log  │  │      config         │  │
//! │  │  (A)      │  │     (B)       │  │  (input surfaces)   │  │
//! │  └───────────┘  └───────────────┘  └─────────────────────┘  │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │              topology :: System builder (C)             ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │   paths :: all-pairs best path + PXN upgrade + trim (D) ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌───────────────────────────┐  ┌──────────────────────────┐│
//! │  │  search :: ring/tree (E)  │  │  patterns :: matcher (F) ││
//! │  └───────────────────────────┘  └──────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │              plan :: init driver (G)                    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Non-goals
//!
//! No real hardware probing, no device-driver interaction, no
//! collective execution, no parallelism: the planner runs to completion
//! on a single execution context given immutable input and returns
//! immutable output plus a decision log. The interactive viewer, the
//! option-panel UI, per-rank runtime wiring, protocol tuning heuristics
//! and assistant integration are external collaborators, out of scope
//! for this crate.

#![warn(missing_docs)]
#![allow(clippy::too_many_arguments)]

pub mod config;
pub mod decision_log;
pub mod error;
pub mod patterns;
pub mod paths;
pub mod plan;
pub mod search;
pub mod topology;
pub mod types;

// Re-exports
pub use config::{HardwareDesc, Options, ScaleUnit};
pub use decision_log::DecisionLog;
pub use error::{Error, Result};
pub use plan::{init, Plan};
pub use topology::System;
pub use types::{Channel, Pattern, TopoGraph};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
