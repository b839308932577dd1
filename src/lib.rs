//! Plastic: a class transformation and generation engine
//!
//! Classes are decoded into a structured model, reshaped through a declarative session API, and
//! linked into an embedded runtime machine that executes the generated instruction streams.
//! Callers never splice raw instructions into existing bytes: every change (introduced fields and
//! methods, injected values, field conduits, method advice, interface proxies) is described
//! against the model and materialized when the session finalizes.
//!
//! ```no_run
//! use plastic::pool::{ClassPool, MapLoader, PoolSettings, TransformerDelegate};
//! use plastic::transform::ClassTransform;
//! use plastic::Error;
//! use std::rc::Rc;
//!
//! struct NoChanges;
//!
//! impl TransformerDelegate for NoChanges {
//!     fn transform(&self, _transform: &mut ClassTransform) -> Result<(), Error> {
//!         Ok(())
//!     }
//! }
//!
//! let settings = PoolSettings {
//!     controlled_packages: vec![String::from("app/")],
//!     ..PoolSettings::default()
//! };
//! let pool = ClassPool::new(Box::new(MapLoader::new()), Rc::new(NoChanges), settings);
//! ```

pub mod code;
pub mod codec;
mod errors;
pub mod model;
pub mod pool;
pub mod runtime;
pub mod transform;

pub use errors::Error;
