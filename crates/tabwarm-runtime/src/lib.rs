//! # tabwarm-runtime
//!
//! Speculative page loading for trusted client processes.
//!
//! - **Sessions**: [`SessionRegistry`] tracks connected clients, their
//!   callbacks, referrers, and keep-alive bindings
//! - **Throttle**: [`RequestThrottler`] rate-limits predictions per owner
//!   identity and bans identities whose predictions keep missing
//! - **Prerender**: [`PrerenderManager`] holds at most one speculative
//!   resource and one warm spare
//! - **Relay**: [`NavigationRelay`] turns surface lifecycle events into
//!   callback notifications
//! - **Service**: [`TabwarmService`] owns all of the above on a dedicated
//!   home thread; [`ManagerHandle`] marshals requests onto it
//!
//! ## Crate Position
//!
//! Depends on: tabwarm-core, tabwarm-settings, tabwarm-store.
//! Depended on by: embedding hosts.

#![deny(unsafe_code)]

pub mod affinity;
pub mod collaborators;
pub mod errors;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod prerender;
pub mod relay;
pub mod sessions;
pub mod throttle;

#[cfg(test)]
mod testutil;

pub use collaborators::{
    HostCapabilities, KeepAliveBinder, NavigationRequest, PolicySource, PredictionExtras,
    RenderFactory, SessionCallback, StaticPolicy,
};
pub use errors::{CallbackError, DisallowReason, ManagerError, Rejected, RenderError, Result};
pub use events::{EventEmitter, ManagerEvent};
pub use manager::{
    ManagerCore, ManagerDeps, ManagerHandle, ManagerSnapshot, NavigationOutcome, ResourceOrigin,
    TabwarmService,
};
pub use prerender::{PrerenderManager, SlotOutcome, SpeculationPolicy};
pub use relay::NavigationRelay;
pub use sessions::{CloseReason, SessionRegistry};
pub use throttle::RequestThrottler;
