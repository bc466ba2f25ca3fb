//! Contracts for the collaborators the manager is embedded between.
//!
//! The connection host, render factory, policy signals, and keep-alive
//! binding all live outside this crate. Only the shapes below cross the
//! boundary.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use tabwarm_core::{ConnectionId, NavigationEventKind, OwnerIdentity, RenderHandle};

use crate::errors::{CallbackError, RenderError};

/// Client-side notification sink registered at session open.
///
/// Calls happen on the home thread. Implementations must not block.
pub trait SessionCallback: Send + Sync {
    /// Whether the client process is still reachable.
    fn is_alive(&self) -> bool;

    /// A lifecycle transition of the surface bound to `connection`.
    fn on_navigation_event(
        &self,
        connection: &ConnectionId,
        kind: NavigationEventKind,
    ) -> Result<(), CallbackError>;

    /// The session is being torn down by the manager.
    fn on_session_invalid(&self, connection: &ConnectionId) -> Result<(), CallbackError>;
}

/// What a render resource should load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationRequest {
    /// Target URL.
    pub url: String,
    /// Referrer, `""` when absent.
    pub referrer: String,
    /// Extra request headers (lowercase names).
    pub headers: BTreeMap<String, String>,
    /// The first history entry must replace the current one.
    pub replace_current_entry: bool,
    /// Loaded ahead of a navigation, not yet visible.
    pub speculative: bool,
}

/// Creates, navigates, and destroys render resources.
///
/// Owned by the home thread. Only the prerender manager calls it.
pub trait RenderFactory: Send {
    /// Create a fresh resource parked on `about:blank`.
    fn create(&mut self) -> Result<RenderHandle, RenderError>;

    /// Release a resource. Unknown handles are ignored.
    fn destroy(&mut self, handle: RenderHandle);

    /// Start loading `request` into `handle`.
    fn navigate(&mut self, handle: RenderHandle, request: &NavigationRequest)
    -> Result<(), RenderError>;
}

/// Host signals consulted before any speculative rendering.
#[cfg_attr(test, mockall::automock)]
pub trait PolicySource: Send + Sync {
    /// The active network is metered.
    fn network_metered(&self) -> bool;
    /// The device is classified as low-end.
    fn low_end_device(&self) -> bool;
    /// A host feature flag turns speculative rendering off.
    fn feature_disabled(&self) -> bool;
}

/// Fixed policy signals, for hosts without live ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticPolicy {
    /// Reported by [`PolicySource::network_metered`].
    pub metered: bool,
    /// Reported by [`PolicySource::low_end_device`].
    pub low_end: bool,
    /// Reported by [`PolicySource::feature_disabled`].
    pub disabled: bool,
}

impl PolicySource for StaticPolicy {
    fn network_metered(&self) -> bool {
        self.metered
    }

    fn low_end_device(&self) -> bool {
        self.low_end
    }

    fn feature_disabled(&self) -> bool {
        self.disabled
    }
}

/// Raises a client process's priority while it holds a keep-alive.
#[cfg_attr(test, mockall::automock)]
pub trait KeepAliveBinder: Send + Sync {
    /// Bind a keep-alive for `connection`. Returns `false` if the host refused.
    fn bind(&self, connection: &ConnectionId, owner: OwnerIdentity) -> bool;
    /// Release the keep-alive for `connection`.
    fn unbind(&self, connection: &ConnectionId);
}

/// What the host platform supports, negotiated once at start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Host platform API level.
    pub platform_version: u32,
    /// Keep-alive binding is available.
    pub keep_alive: bool,
    /// A spare render resource can be kept warm.
    pub spare_renderer: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            platform_version: 0,
            keep_alive: true,
            spare_renderer: true,
        }
    }
}

/// Optional data attached to a prediction or navigation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredictionExtras {
    /// Request headers, keyed by name.
    pub headers: BTreeMap<String, String>,
}

impl PredictionExtras {
    /// Extras carrying one header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.headers.insert(name.into(), value.into());
        self
    }

    /// Headers with lowercased names.
    pub fn normalized_headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.clone()))
            .collect()
    }
}

/// Invoke a client callback, folding panics into [`CallbackError::Failed`].
pub(crate) fn deliver(
    call: impl FnOnce() -> Result<(), CallbackError>,
) -> Result<(), CallbackError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "callback panicked".to_string());
            Err(CallbackError::Failed(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn deliver_passes_results_through() {
        assert!(deliver(|| Ok(())).is_ok());
        assert_matches!(deliver(|| Err(CallbackError::Dead)), Err(CallbackError::Dead));
    }

    #[test]
    fn deliver_catches_panics() {
        let result = deliver(|| panic!("client exploded"));
        assert_matches!(result, Err(CallbackError::Failed(msg)) if msg == "client exploded");
    }

    #[test]
    fn header_names_are_normalized() {
        let extras = PredictionExtras::default().with_header(" Accept-Language", "en");
        let headers = extras.normalized_headers();
        assert_eq!(headers.get("accept-language").map(String::as_str), Some("en"));
    }

    #[test]
    fn static_policy_reports_fields() {
        let policy = StaticPolicy {
            metered: true,
            ..StaticPolicy::default()
        };
        assert!(policy.network_metered());
        assert!(!policy.low_end_device());
        assert!(!policy.feature_disabled());
    }
}
