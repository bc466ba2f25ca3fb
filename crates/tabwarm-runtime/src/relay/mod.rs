//! Navigation Event Relay.

pub mod navigation;
pub mod progress;

pub use navigation::{NavigationRelay, RelayReport};
pub use progress::{LoadPhase, LoadProgress, LoadTiming, ProgressTracker, Transition};
