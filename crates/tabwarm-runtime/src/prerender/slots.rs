//! The Prerender / Spare Resource Manager.
//!
//! Owns at most one speculative resource ([`PrerenderSlot`]) and at most one
//! idle pre-warmed resource (the spare). It is the only component that talks
//! to the [`RenderFactory`].
//!
//! Slot lifecycle: `Empty -> Pending -> {Adopted, Cancelled, Superseded} -> Empty`.
//! Every transition out of `Pending` destroys or detaches the resource before
//! returning.

use std::collections::BTreeMap;
use std::fmt;

use tabwarm_core::{ConnectionId, RenderHandle};
use tracing::{debug, info, warn};

use crate::affinity::ThreadAffinity;
use crate::collaborators::{NavigationRequest, RenderFactory};
use crate::errors::RenderError;

/// How a prerender slot ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// A matching navigation took the resource.
    Adopted,
    /// Cancelled by its session or by a policy change.
    Cancelled,
    /// Replaced by a newer prediction.
    Superseded,
    /// A navigation did not match it.
    Mispredicted,
    /// Torn down at shutdown.
    Shutdown,
}

impl SlotOutcome {
    /// Short label for logs, metrics, and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adopted => "adopted",
            Self::Cancelled => "cancelled",
            Self::Superseded => "superseded",
            Self::Mispredicted => "mispredicted",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SlotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The live speculative resource and the request that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrerenderSlot {
    /// Session that predicted it.
    pub owner: ConnectionId,
    /// Predicted URL.
    pub url: String,
    /// Normalized referrer (`""` when absent).
    pub referrer: String,
    /// Backing resource.
    pub resource: RenderHandle,
    /// When the prerender started.
    pub created_at_ms: i64,
}

impl PrerenderSlot {
    fn matches(&self, session: &ConnectionId, url: &str, referrer: &str) -> bool {
        self.owner == *session && self.url == url && self.referrer == referrer
    }
}

/// A prerender slot that just ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndedPrerender {
    /// Session that predicted it.
    pub owner: ConnectionId,
    /// Predicted URL.
    pub url: String,
    /// How it ended.
    pub outcome: SlotOutcome,
}

/// Result of [`PrerenderManager::start_prerender`].
#[derive(Debug)]
pub struct PrerenderStart {
    /// The previous prerender, destroyed to make room.
    pub superseded: Option<EndedPrerender>,
    /// Whether a spare was destroyed to make room.
    pub spare_destroyed: bool,
    /// The new resource, or why it could not be created.
    pub started: Result<RenderHandle, RenderError>,
}

/// Result of [`PrerenderManager::take_for_navigation`].
#[derive(Debug, PartialEq, Eq)]
pub enum TakeOutcome {
    /// The prerendered resource is detached and handed over.
    Adopted {
        /// Resource to show.
        handle: RenderHandle,
        /// The slot it came from.
        slot: EndedPrerender,
    },
    /// Nothing matched. A held slot, if any, was destroyed.
    Mispredict {
        /// The destroyed slot.
        discarded: Option<EndedPrerender>,
    },
}

/// A spare handed over for reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpareResource {
    /// Resource to navigate.
    pub handle: RenderHandle,
    /// The first real navigation must replace the `about:blank` entry.
    pub replace_current_entry: bool,
}

/// Sole owner of speculative and spare render resources.
pub struct PrerenderManager {
    factory: Box<dyn RenderFactory>,
    prerender: Option<PrerenderSlot>,
    spare: Option<RenderHandle>,
    affinity: ThreadAffinity,
}

impl PrerenderManager {
    /// Manager with both slots empty.
    pub fn new(factory: Box<dyn RenderFactory>) -> Self {
        Self {
            factory,
            prerender: None,
            spare: None,
            affinity: ThreadAffinity::current(),
        }
    }

    /// Start a prerender of `url` for `owner`.
    ///
    /// Last request wins: any spare and any previous prerender are destroyed
    /// first, even if creating the new one then fails.
    pub fn start_prerender(
        &mut self,
        owner: &ConnectionId,
        url: &str,
        referrer: &str,
        headers: BTreeMap<String, String>,
        now_ms: i64,
    ) -> PrerenderStart {
        self.affinity.assert_current("PrerenderManager::start_prerender");
        let spare_destroyed = self.destroy_spare();
        let superseded = self.end_prerender(SlotOutcome::Superseded);

        let request = NavigationRequest {
            url: url.to_string(),
            referrer: referrer.to_string(),
            headers,
            replace_current_entry: false,
            speculative: true,
        };
        let started = self.create_and_navigate(&request).map(|resource| {
            self.prerender = Some(PrerenderSlot {
                owner: owner.clone(),
                url: url.to_string(),
                referrer: referrer.to_string(),
                resource,
                created_at_ms: now_ms,
            });
            debug!(%owner, url, %resource, "prerender started");
            resource
        });
        PrerenderStart {
            superseded,
            spare_destroyed,
            started,
        }
    }

    /// Hand over the prerendered resource if `(session, url, referrer)`
    /// matches the slot exactly. Otherwise destroy the slot.
    pub fn take_for_navigation(
        &mut self,
        session: &ConnectionId,
        url: &str,
        referrer: &str,
    ) -> TakeOutcome {
        self.affinity.assert_current("PrerenderManager::take_for_navigation");
        match self.prerender.take() {
            Some(slot) if slot.matches(session, url, referrer) => {
                debug!(%session, url, resource = %slot.resource, "prerender adopted");
                TakeOutcome::Adopted {
                    handle: slot.resource,
                    slot: EndedPrerender {
                        owner: slot.owner,
                        url: slot.url,
                        outcome: SlotOutcome::Adopted,
                    },
                }
            }
            Some(slot) => {
                debug!(%session, url, predicted = %slot.url, "mispredict");
                self.factory.destroy(slot.resource);
                TakeOutcome::Mispredict {
                    discarded: Some(EndedPrerender {
                        owner: slot.owner,
                        url: slot.url,
                        outcome: SlotOutcome::Mispredicted,
                    }),
                }
            }
            None => TakeOutcome::Mispredict { discarded: None },
        }
    }

    /// Destroy the prerender if `session` is `None` or owns it.
    pub fn cancel(&mut self, session: Option<&ConnectionId>) -> Option<EndedPrerender> {
        self.affinity.assert_current("PrerenderManager::cancel");
        let owned = match (&self.prerender, session) {
            (Some(_), None) => true,
            (Some(slot), Some(s)) => slot.owner == *s,
            (None, _) => false,
        };
        if !owned {
            return None;
        }
        self.end_prerender(SlotOutcome::Cancelled)
    }

    /// Hand over the spare, if one is warm.
    pub fn take_spare(&mut self) -> Option<SpareResource> {
        self.affinity.assert_current("PrerenderManager::take_spare");
        let handle = self.spare.take()?;
        debug!(%handle, "spare consumed");
        Some(SpareResource {
            handle,
            replace_current_entry: true,
        })
    }

    /// Create the spare unless one exists or a prerender holds the slot.
    pub fn maybe_create_spare(&mut self) -> Result<Option<RenderHandle>, RenderError> {
        self.affinity.assert_current("PrerenderManager::maybe_create_spare");
        if self.spare.is_some() || self.prerender.is_some() {
            return Ok(None);
        }
        let handle = self.factory.create()?;
        self.spare = Some(handle);
        debug!(%handle, "spare created");
        Ok(Some(handle))
    }

    /// Create a resource for a navigation nothing was warm for.
    pub fn create_fresh(&mut self) -> Result<RenderHandle, RenderError> {
        self.affinity.assert_current("PrerenderManager::create_fresh");
        self.factory.create()
    }

    /// Load `request` into a resource already handed over. The resource is
    /// destroyed if the load is refused.
    pub fn navigate(
        &mut self,
        handle: RenderHandle,
        request: &NavigationRequest,
    ) -> Result<(), RenderError> {
        self.affinity.assert_current("PrerenderManager::navigate");
        if let Err(e) = self.factory.navigate(handle, request) {
            warn!(%handle, url = %request.url, error = %e, "navigation refused, destroying resource");
            self.factory.destroy(handle);
            return Err(e);
        }
        Ok(())
    }

    /// Release a resource that was handed over earlier. Handles still held
    /// in a slot are refused.
    pub fn release(&mut self, handle: RenderHandle) -> bool {
        self.affinity.assert_current("PrerenderManager::release");
        let held = self.spare == Some(handle)
            || self.prerender.as_ref().is_some_and(|slot| slot.resource == handle);
        if held {
            warn!(%handle, "refusing to release a resource still held in a slot");
            return false;
        }
        self.factory.destroy(handle);
        true
    }

    /// Destroy both slots.
    pub fn shutdown(&mut self) -> Option<EndedPrerender> {
        self.affinity.assert_current("PrerenderManager::shutdown");
        let _ = self.destroy_spare();
        let ended = self.end_prerender(SlotOutcome::Shutdown);
        info!("prerender manager shut down");
        ended
    }

    /// The live prerender slot.
    pub fn prerender_slot(&self) -> Option<&PrerenderSlot> {
        self.prerender.as_ref()
    }

    /// The warm spare, if any.
    pub fn spare(&self) -> Option<RenderHandle> {
        self.spare
    }

    fn create_and_navigate(&mut self, request: &NavigationRequest) -> Result<RenderHandle, RenderError> {
        let handle = self.factory.create()?;
        self.navigate(handle, request)?;
        Ok(handle)
    }

    fn end_prerender(&mut self, outcome: SlotOutcome) -> Option<EndedPrerender> {
        let slot = self.prerender.take()?;
        self.factory.destroy(slot.resource);
        debug!(owner = %slot.owner, url = %slot.url, %outcome, "prerender ended");
        Some(EndedPrerender {
            owner: slot.owner,
            url: slot.url,
            outcome,
        })
    }

    fn destroy_spare(&mut self) -> bool {
        let Some(handle) = self.spare.take() else {
            return false;
        };
        self.factory.destroy(handle);
        true
    }
}
