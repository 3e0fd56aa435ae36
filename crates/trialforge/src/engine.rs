//! The running engine: every component, wired once at startup.
//!
//! Startup order matters and is fixed:
//!
//! ```text
//! store ──→ migrations ──→ main context ──→ pool ──→ registry reload ──→ pool fill
//! ```
//!
//! Nothing touches the store before migrations succeed, and a migration
//! failure aborts startup with [`TrialforgeError::Migration`].

use std::sync::Arc;

use tracing::{debug, info, warn};
use trialforge_pool::{MainContext, ResourcePool, WorldProvider};
use trialforge_protocol::SessionId;
use trialforge_session::{Clock, JoinMode, JoinOutcome, SessionRegistry};
use trialforge_snapshot::{RestorablePlayer, SnapshotStore};
use trialforge_store::{Migrator, Store};

use crate::{EngineBuilder, EngineConfig, TrialforgeError};

/// A started Trialforge engine.
///
/// Built with [`Engine::builder`]. Call [`shutdown`](Self::shutdown)
/// before dropping it so sessions are persisted and threads stop.
pub struct Engine {
    config: EngineConfig,
    store: Arc<Store>,
    main: Arc<MainContext>,
    pool: Arc<ResourcePool>,
    registry: SessionRegistry,
    snapshots: SnapshotStore,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) async fn start(
        config: EngineConfig,
        provider: Arc<dyn WorldProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrialforgeError> {
        let store = Arc::new(Store::open(config.store.clone())?);

        let report = Migrator::builtin(&store).run()?;
        info!(
            from = report.from_version,
            to = report.to_version,
            applied = report.applied.len(),
            "store schema ready"
        );

        let main = Arc::new(MainContext::spawn()?);
        let pool = match ResourcePool::start(config.pool.clone(), provider, main.clone(), store.clone()) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                main.shutdown();
                return Err(e.into());
            }
        };

        let registry = SessionRegistry::new(config.registry.clone(), pool.clone(), store.clone(), clock);
        let snapshots = SnapshotStore::new(store.clone());
        let engine = Self {
            config,
            store,
            main,
            pool,
            registry,
            snapshots,
        };

        if let Err(e) = engine.load_sessions().await {
            engine.stop_threads().await;
            return Err(e);
        }
        let queued = match engine.pool.fill().await {
            Ok(tickets) => tickets.len(),
            Err(e) => {
                warn!(error = %e, "could not queue initial pool fill");
                0
            }
        };
        info!(
            sessions = engine.registry.session_count().await,
            pool_available = engine.pool.count_available(),
            pool_queued = queued,
            "engine started"
        );
        Ok(engine)
    }

    async fn load_sessions(&self) -> Result<(), TrialforgeError> {
        self.registry.reload().await?;
        if let Some(dir) = &self.config.registry.snapshot_dir {
            if dir.is_dir() {
                self.registry.reload_from_dir(dir).await?;
            }
        }
        Ok(())
    }

    /// Persists every session, then stops the pool worker and the main
    /// context thread.
    pub async fn shutdown(self) -> Result<(), TrialforgeError> {
        let persisted = self.registry.persist().await;
        let files = match &self.config.registry.snapshot_dir {
            Some(dir) => self.registry.persist_to_dir(dir).await.map(Some),
            None => Ok(None),
        };
        self.stop_threads().await;
        if let Err(e) = self.store.checkpoint() {
            warn!(error = %e, "store checkpoint failed on shutdown");
        }
        self.store.close();

        let persisted = persisted?;
        let files = files?;
        info!(sessions = persisted, files = ?files, "engine stopped");
        Ok(())
    }

    async fn stop_threads(&self) {
        self.pool.shutdown().await;
        self.main.shutdown();
    }

    // -----------------------------------------------------------------------
    // Connection hooks
    // -----------------------------------------------------------------------

    /// Call when a player's connection drops.
    ///
    /// If they were in an Active session, their state is saved against it
    /// and they leave the session. Returns that session.
    pub async fn disconnect<P>(&self, player: &P) -> Result<Option<SessionId>, TrialforgeError>
    where
        P: RestorablePlayer + ?Sized,
    {
        let player_id = player.id();
        let Some(session) = self.registry.get_by_player(&player_id).await else {
            debug!(%player_id, "disconnect outside any session");
            return Ok(None);
        };

        self.snapshots.save(player, &session.id)?;
        self.registry.leave(player_id).await?;
        info!(%player_id, session_id = %session.id, "member disconnected, state saved");
        Ok(Some(session.id))
    }

    /// Call when a player connects.
    ///
    /// If a snapshot exists for a session that is still Active, the player
    /// rejoins it in restore mode and the snapshot is applied. Snapshots of
    /// finished sessions are discarded. If the snapshot can't be applied the
    /// join is undone and the snapshot kept.
    pub async fn reconnect<P>(&self, player: &mut P) -> Result<Option<JoinOutcome>, TrialforgeError>
    where
        P: RestorablePlayer + ?Sized,
    {
        let player_id = player.id();
        let Some(session_id) = self.snapshots.latest_session_for(&player_id)? else {
            return Ok(None);
        };

        let active = self
            .registry
            .get_by_id(&session_id)
            .await
            .is_some_and(|s| s.status.is_active());
        if !active {
            let cleared = self.snapshots.clear_player(&player_id)?;
            info!(%player_id, %session_id, cleared, "session no longer active, snapshots discarded");
            return Ok(None);
        }

        let outcome = self.registry.join(player_id, &session_id, JoinMode::Restore).await?;
        match self.snapshots.restore(player, &session_id) {
            Ok(true) => {
                info!(%player_id, %session_id, "member reconnected, state restored");
            }
            Ok(false) => {
                warn!(%player_id, %session_id, "snapshot vanished before restore, placing at start");
                player.place_at_start(&outcome.spawn_world);
            }
            Err(e) => {
                if let Err(leave) = self.registry.leave(player_id).await {
                    warn!(%player_id, %session_id, error = %leave, "could not undo restore join");
                }
                return Err(e.into());
            }
        }
        Ok(Some(outcome))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
