//! Block reconstruction strategies
//!
//! Tasks never know which implementation they run: they look the configured
//! name up in a [`ReconstructorRegistry`], hand the factory the job
//! configuration, and drive the resulting [`Reconstructor`] with a [`Decoder`]
//! for the job's codec.
//!
//! ## Key Components
//!
//! - [`Reconstructor`] - capability trait with one entry point per repair kind
//! - [`Decoder`] - codec binding handed to every call
//! - [`ReconstructorRegistry`] - name to factory mapping
//! - [`PresenceCheckReconstructor`] - built-in strategy

mod presence;
mod registry;
mod traits;

pub use presence::PresenceCheckReconstructor;
pub use registry::{ReconstructorFactory, ReconstructorRegistry, RegistryError};
pub use traits::{Decoder, ReconstructError, Reconstructor};
