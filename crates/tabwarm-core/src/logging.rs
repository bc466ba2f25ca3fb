//! Tracing subscriber setup.
//!
//! Library crates only emit `tracing` events; installing a subscriber is the
//! job of the binary or the embedding host. `RUST_LOG` wins over the
//! configured level when set.

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` if present, otherwise `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global fmt subscriber.
///
/// Returns `false` if a global subscriber was already installed (the host
/// owns logging in that case).
pub fn init_subscriber(level: &str, json: bool) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "tracing subscriber already installed");
            false
        }
    }
}
