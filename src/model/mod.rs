//! Class model: names, access flags, descriptors, annotations, and the mutable class node that
//! transformation sessions operate on.
//!
//! A [`ClassNode`] is what the codec decodes raw bytecode into and what it encodes back to bytes
//! once a transformation pass is finished. Everything in this module is plain data: behaviour
//! (building instruction sequences, describing structural changes) lives in [`crate::code`] and
//! [`crate::transform`].

mod access_flags;
mod annotation;
mod class;
mod descriptors;
mod names;

pub use access_flags::*;
pub use annotation::*;
pub use class::*;
pub use descriptors::*;
pub use names::*;
