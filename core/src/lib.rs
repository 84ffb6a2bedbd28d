//! Core engine for reltrain, a chained-release database migration tool.
//!
//! Releases form a singly-linked chain reconstructed from predecessor
//! links; each target database records applied versions in an audit table,
//! and the engine applies the outstanding range transactionally per
//! target. Backends plug in through the [`driver::TargetDriver`] seam:
//! `reltrain-pg` is the PostgreSQL implementation, and
//! [`driver::memory`] backs the test-suite.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod state;

pub use catalog::Catalog;
pub use config::Config;
pub use engine::Engine;
