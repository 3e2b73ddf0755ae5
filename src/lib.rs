//! # suite-oracle
//!
//! `suite-oracle` measures and validates unit-test suites for a bytecode
//! runtime whose tests run in an external launcher process:
//! - `coverage`: discover existing tests, execute them under a trace and
//!   report per-criterion coverage, bit-strings and a coverage matrix
//! - `runner`: framework-neutral execution backends and mutation analysis
//! - `validate`: compile and stability filtering of generated candidates
//!
//! Process-wide execution state (trace collector, context loader, active
//! mutant, sandbox) lives in one [`context::ExecutionContext`] passed by
//! `&mut`; scoped guards restore it on every exit path.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod budget;
pub mod classes;
pub mod config;
pub mod context;
pub mod coverage;
pub mod mutant;
pub mod outcome;
pub mod prelude;
pub mod runner;
pub mod stats;
pub mod trace;
pub mod validate;
