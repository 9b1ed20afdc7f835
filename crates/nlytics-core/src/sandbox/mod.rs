//! Sandbox executor for analysis programs.
//!
//! A program runs in a fresh [`context::ExecutionContext`] holding a private
//! copy of the dataset, the allowed module handles, the builtin whitelist and
//! stubs for every disallowed primitive. Interpretation is bounded by a
//! [`Watchdog`] timer, `max_collection_len` and the capture buffer limits.
//!
//! - [`executor`]: entry point, result read-back, panic containment
//! - [`interp`]: statement and expression evaluation
//! - [`frame_ops`], [`series_ops`], [`groupby`], [`modules`]: the tabular surface
//! - [`builtins`], [`collections`], [`ops`], [`format`]: the core language surface

pub mod args;
pub mod builtins;
pub mod capture;
pub mod collections;
pub mod context;
pub mod executor;
pub mod fault;
pub mod format;
pub mod frame_ops;
pub mod groupby;
pub mod interp;
pub mod modules;
pub mod ops;
pub mod outcome;
pub mod select;
pub mod series_ops;
pub mod stats;
pub mod text;
pub mod value;
pub mod watchdog;

pub use capture::OutputCapture;
pub use executor::SandboxExecutor;
pub use fault::FaultClass;
pub use outcome::{ExecutionError, ExecutionOutcome, FaultKind, ResultValue, ScalarValue};
pub use watchdog::Watchdog;
