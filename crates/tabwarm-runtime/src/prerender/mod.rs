//! Prerender / Spare Resource Manager and the policy gate in front of it.

pub mod policy;
pub mod slots;

pub use policy::SpeculationPolicy;
pub use slots::{
    EndedPrerender, PrerenderManager, PrerenderSlot, PrerenderStart, SlotOutcome, SpareResource,
    TakeOutcome,
};
