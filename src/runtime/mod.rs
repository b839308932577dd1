//! In-process execution of transformed classes
//!
//! The [`Machine`] links class models produced by the engine and interprets their instruction
//! sequences directly, with host bindings for the support types generated code calls into
//! (contexts, conduits, advice bundles). There is no global execution state: frames live on the
//! Rust call stack, so advice callbacks can re-enter the machine while a call is in flight.

mod interp;
mod linker;
mod value;

pub use interp::*;
pub use linker::*;
pub use value::*;
