//! Error taxonomy for the fabric planner.
//!
//! Per the core's propagation policy, only structurally impossible input
//! aborts construction. Search timeouts, exhausted relaxation cascades,
//! missing best paths, and pattern-matcher budget exhaustion are all
//! expressed in-band (a `timed_out` flag, a zero-channel `TopoGraph`, a
//! `Dis`-typed `Path`, and matcher fallthrough, respectively) rather than
//! through this type.

/// Errors raised while building or planning a topology.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The hardware description is structurally impossible to build: an
    /// out-of-range NUMA reference, a demanded PCIe-switch hierarchy with
    /// zero switches, or a non-positive bandwidth.
    #[error("invalid hardware configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
