//! Administrative layer
//!
//! The relay core's external collaborator: an HTTP management API over the
//! registry plus the JSON-file persistence it consumes. Kept out of the
//! data path; everything here talks to the core through the same four
//! mutations and two listings the registry exposes.

pub mod api;
pub mod persist;

pub use api::AdminServer;
pub use persist::{ConfigDocument, JsonConfigStore, UserEntry};
