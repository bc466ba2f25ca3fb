//! The Prerender Service: state on a home thread, requests through a handle.

mod command;
pub mod core;
pub mod handle;
pub mod service;
mod writer;

pub use self::core::{ManagerCore, ManagerDeps, ManagerSnapshot, NavigationOutcome, ResourceOrigin};
pub use handle::ManagerHandle;
pub use service::{HOME_THREAD_NAME, TabwarmService};
