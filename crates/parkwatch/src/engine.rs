//! Engine: owns the reconciler, both timers and shutdown coordination.
//!
//! Transports hold an `Arc<Engine>` and reach the core only through
//! [`CommandSurface`] and [`SnapshotPublisher`].

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::RemoteChannel;
use crate::commands::CommandSurface;
use crate::config::EngineConfig;
use crate::error::{ChannelError, ConfigError};
use crate::reconciler::Reconciler;
use crate::slot::Slot;
use crate::snapshot::SnapshotPublisher;
use crate::status::SyncTracker;
use crate::timer;
use crate::version::VersionInfo;

/// Handles of the running timers.
struct Timers {
    token: CancellationToken,
    expiry: JoinHandle<()>,
    poll: JoinHandle<()>,
}

pub struct Engine {
    config: EngineConfig,
    reconciler: Arc<Reconciler>,
    commands: CommandSurface,
    snapshots: SnapshotPublisher,
    timers: Mutex<Option<Timers>>,
    version: VersionInfo,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Engine {
    /// Build an engine with slots `1..=N`, all free. Timers are not started.
    pub fn new(config: EngineConfig, channel: Arc<dyn RemoteChannel>) -> Result<Self, ConfigError> {
        config.validate()?;

        let sync = Arc::new(SyncTracker::new());
        let reconciler = Arc::new(Reconciler::new(&config, channel, sync)?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            commands: CommandSurface::new(Arc::clone(&reconciler)),
            snapshots: SnapshotPublisher::new(Arc::clone(&reconciler)),
            reconciler,
            config,
            timers: Mutex::new(None),
            version: VersionInfo::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    fn lock_timers(&self) -> MutexGuard<'_, Option<Timers>> {
        match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Timer handle mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Spawn the expiry and poll timers on the current runtime.
    ///
    /// Returns false if they were already running.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) -> bool {
        let mut timers = self.lock_timers();
        if timers.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let expiry = timer::spawn_expiry_timer(
            Arc::clone(&self.reconciler),
            self.config.expiry_interval,
            token.clone(),
        );
        let poll = timer::spawn_poll_timer(
            Arc::clone(&self.reconciler),
            self.config.poll_interval,
            self.config.poll_window,
            token.clone(),
        );
        *timers = Some(Timers {
            token,
            expiry,
            poll,
        });

        tracing::info!(
            slots = self.config.slot_count,
            expiry_interval = ?self.config.expiry_interval,
            poll_interval = ?self.config.poll_interval,
            "Engine started"
        );
        true
    }

    /// Cancel both timers and wait for them to finish.
    ///
    /// No tick runs after this returns. Stopping a stopped engine is a no-op.
    pub async fn stop(&self) {
        let Some(timers) = self.lock_timers().take() else {
            return;
        };

        timers.token.cancel();
        for (name, handle) in [("expiry", timers.expiry), ("poll", timers.poll)] {
            if let Err(e) = handle.await {
                tracing::warn!(timer = name, error = %e, "Timer task ended abnormally");
            }
        }
        tracing::info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_timers().is_some()
    }

    /// Run one poll cycle now, outside the poll timer's cadence.
    pub async fn poll_once(&self) -> Result<Vec<Slot>, ChannelError> {
        timer::poll_once(&self.reconciler, self.config.poll_window).await
    }

    pub fn commands(&self) -> &CommandSurface {
        &self.commands
    }

    pub fn snapshots(&self) -> &SnapshotPublisher {
        &self.snapshots
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
