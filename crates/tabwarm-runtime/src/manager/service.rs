//! The home thread.
//!
//! [`TabwarmService::start`] spawns a dedicated OS thread running a
//! current-thread tokio runtime. All manager state lives there; callers
//! reach it through [`ManagerHandle`]. Two helper tasks share the thread:
//! a one-shot store warm-up and the dead-session sweeper. Both hold weak
//! senders, so dropping every handle still closes the command channel.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tabwarm_core::Clock;
use tabwarm_settings::TabwarmSettings;
use tabwarm_store::ThrottleStore;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::command::Command;
use super::core::{ManagerCore, ManagerDeps};
use super::handle::ManagerHandle;
use crate::errors::{ManagerError, Result};
use crate::events::EventEmitter;

/// Name of the thread that owns manager state.
pub const HOME_THREAD_NAME: &str = "tabwarm-home";

/// A running manager and its home thread.
pub struct TabwarmService {
    handle: ManagerHandle,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TabwarmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabwarmService")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl TabwarmService {
    /// Spawn the home thread and wait until the manager is ready.
    pub fn start(settings: TabwarmSettings, deps: ManagerDeps) -> Result<Self> {
        let emitter = Arc::new(EventEmitter::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

        let home_emitter = Arc::clone(&emitter);
        let thread = std::thread::Builder::new()
            .name(HOME_THREAD_NAME.into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                runtime.block_on(home_loop(settings, deps, home_emitter, rx, weak, ready_tx));
            })
            .map_err(|e| ManagerError::HomeThread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(thread = HOME_THREAD_NAME, "manager started");
                Ok(Self {
                    handle: ManagerHandle::new(tx, emitter),
                    thread: Some(thread),
                })
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                Err(ManagerError::HomeThread(message))
            }
            Err(_) => {
                let _ = thread.join();
                Err(ManagerError::HomeThread(
                    "home thread exited during startup".into(),
                ))
            }
        }
    }

    /// A handle for issuing requests. Clone freely.
    pub fn handle(&self) -> ManagerHandle {
        self.handle.clone()
    }

    /// Stop the manager and wait for the home thread to exit.
    ///
    /// Pending saves are flushed and every open session is told it is no
    /// longer valid before this returns.
    pub async fn shutdown(mut self) -> Result<()> {
        let requested = self.handle.shutdown().await;
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| ManagerError::HomeThread(e.to_string()))?;
            if joined.is_err() {
                return Err(ManagerError::HomeThread("home thread panicked".into()));
            }
        }
        match requested {
            Ok(()) | Err(ManagerError::Shutdown) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TabwarmService {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.post_shutdown();
        }
    }
}

async fn home_loop(
    settings: TabwarmSettings,
    deps: ManagerDeps,
    emitter: Arc<EventEmitter>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    weak: mpsc::WeakUnboundedSender<Command>,
    ready: std::sync::mpsc::Sender<std::result::Result<(), String>>,
) {
    let forget_after_ms = settings.throttle.forget_after_ms;
    let sweep_every = Duration::from_millis(settings.sessions.sweep_interval_ms.max(1));
    let store = deps.store.clone();
    let clock = Arc::clone(&deps.clock);

    let mut core = ManagerCore::new(settings, deps, emitter);
    let _ = ready.send(Ok(()));

    let warm = tokio::spawn(warm_store(store, clock, forget_after_ms, weak.clone()));
    let sweeper = tokio::spawn(sweep_dead_sessions(sweep_every, weak));

    let mut shutdown_reply = None;
    while let Some(command) = rx.recv().await {
        trace!(command = command.name(), "applying command");
        if let Command::Shutdown { reply } = command {
            shutdown_reply = reply;
            break;
        }
        command.apply(&mut core).await;
    }

    warm.abort();
    sweeper.abort();
    rx.close();
    core.shutdown().await;
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
    debug!("home loop exited");
}

/// Purge stale rows, then preload the rest into the throttler.
async fn warm_store(
    store: ThrottleStore,
    clock: Arc<dyn Clock>,
    forget_after_ms: i64,
    tx: mpsc::WeakUnboundedSender<Command>,
) {
    let now_ms = clock.now_ms();
    let loaded = tokio::task::spawn_blocking(move || {
        let _ = store.purge_stale(now_ms, forget_after_ms)?;
        store.load_all()
    })
    .await;
    let records = match loaded {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            warn!(error = %e, "throttle store warm-up failed, loading on demand");
            return;
        }
        Err(e) => {
            warn!(error = %e, "throttle store warm-up task failed");
            return;
        }
    };
    debug!(rows = records.len(), "throttle store read");
    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(Command::StoreWarmed { records });
    }
}

async fn sweep_dead_sessions(period: Duration, tx: mpsc::WeakUnboundedSender<Command>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    let _ = ticker.tick().await;
    loop {
        let _ = ticker.tick().await;
        let Some(tx) = tx.upgrade() else {
            break;
        };
        if tx.send(Command::SweepDeadSessions).is_err() {
            break;
        }
    }
}
