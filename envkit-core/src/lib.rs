#![warn(missing_docs)]
//! Core types for composable environment wrappers.
//!
//! An [`Environment`] accepts an action and returns a [`TimeStep`] carrying
//! an observation, a reward and the episode position. Actions and
//! observations are structured values ([`ValueTree`]) described by structured
//! specs ([`SpecTree`]). Wrappers (see the `envkit-wrappers` crate) implement
//! [`Environment`] themselves and transform specs and values on the way
//! through, so chains compose transparently.
pub mod error;
pub mod testing;

mod env;
pub use env::Environment;

mod spec;
pub use spec::{ArraySpec, Dtype, SpecTree};

mod timestep;
pub use timestep::{StepKind, TimeStep};

mod value;
pub use value::{Array, ValueTree};
