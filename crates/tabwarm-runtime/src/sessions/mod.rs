//! Session Registry.

pub mod registry;

pub use registry::{ClientSession, CloseReason, SessionRegistry};
