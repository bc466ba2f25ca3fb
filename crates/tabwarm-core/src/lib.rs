//! # tabwarm-core
//!
//! Foundation types shared by every tabwarm crate.
//!
//! - **Branded IDs**: [`ids::ConnectionId`], [`ids::OwnerIdentity`], [`ids::RenderHandle`]
//! - **Navigation events**: [`events::NavigationEventKind`] pushed to client callbacks,
//!   [`events::SurfaceEvent`] reported by browsing surfaces
//! - **Time**: [`clock::Clock`] with a wall-clock and a manually driven implementation
//! - **Logging**: [`logging::init_subscriber`] for binaries and embedding hosts
//! - **Constants**: throttling floors, ceilings, and horizons
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other tabwarm crates.

#![deny(unsafe_code)]

pub mod clock;
pub mod constants;
pub mod events;
pub mod ids;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{NavigationEventKind, SurfaceEvent};
pub use ids::{ConnectionId, IdError, OwnerIdentity, RenderHandle};
