//! The session registry: every session, and which player is in which.
//!
//! # Locking
//!
//! ```text
//! memberships (RwLock)  →  sessions (RwLock)  →  one session's Mutex
//! ```
//!
//! Locks are always taken in this order and never the reverse.
//!
//! - Membership changes (join, leave, complete, fail, delete) hold the
//!   memberships write lock for the whole two-sided update, so no one can
//!   observe a player mapped to a session that doesn't list them.
//! - Everything else (pause, resume, settings, finalize) takes only the
//!   one session's mutex, so different sessions never wait on each other.
//! - The sessions map is only write-locked to insert or remove entries.
//!
//! `memberships` only ever points at Active sessions. When a session
//! completes or fails, its members are unmapped and its member set becomes
//! the final roster.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use trialforge_pool::{PoolError, ResourcePool};
use trialforge_protocol::{JsonCodec, PlayerId, SessionId, WorldNames, WorldRules};
use trialforge_store::Store;

use crate::persist;
use crate::session::Session;
use crate::{
    Clock, JoinMode, JoinOutcome, RegistryConfig, SessionError, SessionInfo, SessionSettings,
    SessionStatus, SettingId, SettingValue,
};

type SessionHandle = Arc<Mutex<Session>>;

/// Owns every session and the player → session index.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    /// Each player is in at most one Active session.
    memberships: RwLock<HashMap<PlayerId, SessionId>>,
    pool: Arc<ResourcePool>,
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
    codec: JsonCodec,
}

impl SessionRegistry {
    pub fn new(
        config: RegistryConfig,
        pool: Arc<ResourcePool>,
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            pool,
            store,
            clock,
            config,
            codec: JsonCodec,
        }
    }

    // -----------------------------------------------------------------------
    // Creation and provisioning
    // -----------------------------------------------------------------------

    /// Registers a new Active session with a random id. Its worlds are not
    /// provisioned until [`finalize`](Self::finalize).
    pub async fn create(&self, name: &str, owner: PlayerId) -> Result<SessionInfo, SessionError> {
        self.create_with_id(SessionId::random(), name, owner).await
    }

    /// [`create`](Self::create) with a caller-chosen id.
    pub async fn create_with_id(
        &self,
        id: SessionId,
        name: &str,
        owner: PlayerId,
    ) -> Result<SessionInfo, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            warn!(session_id = %id, "session id collision");
            return Err(SessionError::IdCollision(id));
        }
        let session = Session::new(id, name.to_string(), owner, now);
        let info = session.info(now);
        sessions.insert(id, Arc::new(Mutex::new(session)));

        info!(session_id = %id, %name, %owner, world = %info.world, "session created");
        Ok(info)
    }

    /// Provisions the session's worlds and applies its settings to them.
    ///
    /// Claims a parked pool entry if there is one, otherwise creates the
    /// worlds on demand. On failure the session stays unprovisioned and
    /// the caller is expected to [`delete`](Self::delete) it.
    ///
    /// If the session is deleted while its worlds are being provisioned,
    /// the new worlds are discarded, nothing is written and
    /// [`SessionError::NotFound`] is returned.
    pub async fn finalize(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        let handle = self.handle(id).await?;
        let (names, rules) = {
            let mut s = handle.lock().await;
            if !s.status.is_active() {
                return Err(not_active(&s, "finalize"));
            }
            if s.provisioned || s.provisioning {
                return Err(SessionError::AlreadyFinalized(*id));
            }
            s.provisioning = true;
            (s.world(), s.settings.world_rules())
        };

        let result = self.provision(id, &names, &rules).await;

        let mut s = handle.lock().await;
        s.provisioning = false;
        if s.deleted {
            warn!(session_id = %id, "session deleted while provisioning, discarding its worlds");
            if result.is_ok() {
                self.pool.discard(&names).await;
            }
            return Err(SessionError::NotFound(*id));
        }
        if let Err(source) = result {
            error!(session_id = %id, error = %source, "session provisioning failed");
            return Err(SessionError::ProvisioningFailed { id: *id, source });
        }
        s.provisioned = true;
        persist::write_session(&self.store, &s)?;

        info!(session_id = %id, world = %names, "session finalized");
        Ok(s.info(self.clock.now()))
    }

    async fn provision(
        &self,
        id: &SessionId,
        names: &WorldNames,
        rules: &WorldRules,
    ) -> Result<(), PoolError> {
        match self.pool.claim_for_session(id).await {
            Ok(Some(claimed)) => match self.pool.activate(&claimed, rules).await {
                Ok(()) => {
                    self.refill_pool().await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(session_id = %id, error = %e, "claimed worlds failed to activate, creating worlds on demand");
                    self.pool.discard(&claimed).await;
                }
            },
            Ok(None) => info!(session_id = %id, "pool empty, creating worlds on demand"),
            Err(e) => warn!(session_id = %id, error = %e, "pool claim failed, creating worlds on demand"),
        }
        self.pool.create_on_demand(names, rules).await?;
        self.refill_pool().await;
        Ok(())
    }

    async fn refill_pool(&self) {
        if let Err(e) = self.pool.fill().await {
            warn!(error = %e, "could not queue pool refill");
        }
    }

    /// Changes settings. Only allowed while Active and before finalize.
    pub async fn update_settings(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionSettings) -> Result<(), SessionError>,
    ) -> Result<SessionSettings, SessionError> {
        let handle = self.handle(id).await?;
        let mut s = handle.lock().await;
        if !s.status.is_active() {
            return Err(not_active(&s, "settings"));
        }
        if s.provisioned || s.provisioning {
            return Err(SessionError::SettingsLocked(*id));
        }
        let mut settings = s.settings.clone();
        f(&mut settings)?;
        s.settings = settings.clone();
        debug!(session_id = %id, "session settings updated");
        Ok(settings)
    }

    pub async fn set_setting(
        &self,
        id: &SessionId,
        setting: SettingId,
        value: SettingValue,
    ) -> Result<SessionSettings, SessionError> {
        self.update_settings(id, |s| s.set(setting, value)).await
    }

    /// Advances one setting as a menu click would.
    pub async fn advance_setting(
        &self,
        id: &SessionId,
        setting: SettingId,
    ) -> Result<SettingValue, SessionError> {
        let settings = self.update_settings(id, |s| s.advance(setting).map(|_| ())).await?;
        Ok(settings.get(setting))
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds `player` to session `id`, first removing them from any other
    /// session they are in.
    ///
    /// The target is validated before anything changes: on error the
    /// player stays exactly where they were.
    pub async fn join(
        &self,
        player: PlayerId,
        id: &SessionId,
        mode: JoinMode,
    ) -> Result<JoinOutcome, SessionError> {
        let now = self.clock.now();
        let mut memberships = self.memberships.write().await;
        let sessions = self.sessions.read().await;
        let target = sessions.get(id).ok_or(SessionError::NotFound(*id))?;

        let mut t = target.lock().await;
        if !t.status.is_active() {
            return Err(not_active(&t, "join"));
        }
        if t.members.contains_key(&player) {
            return Err(SessionError::AlreadyMember(player, *id));
        }
        if !t.provisioned {
            return Err(SessionError::NotProvisioned(*id));
        }

        let previous = memberships.get(&player).copied();
        if let Some(prev_id) = previous.filter(|prev_id| prev_id != id) {
            if let Some(prev) = sessions.get(&prev_id) {
                let mut p = prev.lock().await;
                p.members.remove(&player);
                info!(session_id = %prev_id, %player, members = p.members.len(), "player left session");
                self.autosave(&p);
            }
        }

        t.add_member(player, now);
        memberships.insert(player, *id);
        info!(session_id = %id, %player, ?mode, members = t.members.len(), "player joined session");
        self.autosave(&t);

        Ok(JoinOutcome {
            session_id: *id,
            previous,
            place_at_start: mode == JoinMode::Normal,
            spawn_world: t.world_name.clone(),
        })
    }

    /// Removes `player` from their session. An emptied session stays
    /// addressable.
    pub async fn leave(&self, player: PlayerId) -> Result<SessionId, SessionError> {
        let mut memberships = self.memberships.write().await;
        let id = memberships
            .remove(&player)
            .ok_or(SessionError::NotInSession(player))?;

        let sessions = self.sessions.read().await;
        if let Some(handle) = sessions.get(&id) {
            let mut s = handle.lock().await;
            s.members.remove(&player);
            info!(session_id = %id, %player, members = s.members.len(), "player left session");
            self.autosave(&s);
        }
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Timer and status
    // -----------------------------------------------------------------------

    /// Pauses the timer. Returns `false` if it was already paused.
    pub async fn pause(&self, id: &SessionId) -> Result<bool, SessionError> {
        let handle = self.handle(id).await?;
        let mut s = handle.lock().await;
        if !s.status.is_active() {
            return Err(not_active(&s, "pause"));
        }
        let changed = s.pause(self.clock.now());
        if changed {
            info!(session_id = %id, "session paused");
            self.autosave(&s);
        }
        Ok(changed)
    }

    /// Resumes the timer. Returns `false` if it wasn't paused.
    pub async fn resume(&self, id: &SessionId) -> Result<bool, SessionError> {
        let handle = self.handle(id).await?;
        let mut s = handle.lock().await;
        if !s.status.is_active() {
            return Err(not_active(&s, "resume"));
        }
        let changed = s.resume(self.clock.now());
        if changed {
            info!(session_id = %id, total_paused_ms = s.total_paused_ms, "session resumed");
            self.autosave(&s);
        }
        Ok(changed)
    }

    pub async fn complete(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        self.finish(id, SessionStatus::Completed, "complete").await
    }

    pub async fn fail(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        self.finish(id, SessionStatus::Failed, "fail").await
    }

    async fn finish(
        &self,
        id: &SessionId,
        status: SessionStatus,
        action: &'static str,
    ) -> Result<SessionInfo, SessionError> {
        let now = self.clock.now();
        let mut memberships = self.memberships.write().await;
        let handle = self.handle(id).await?;
        let mut s = handle.lock().await;
        if !s.status.can_transition_to(status) {
            return Err(not_active(&s, action));
        }

        s.finish(status, now);
        for player in s.members.keys() {
            if memberships.get(player) == Some(id) {
                memberships.remove(player);
            }
        }

        let info = s.info(now);
        info!(
            session_id = %id,
            %status,
            duration = %info.formatted_duration(),
            members = info.members.len(),
            "session finished"
        );
        self.autosave(&s);
        Ok(info)
    }

    /// Removes a session, its memberships and its store rows. The worlds
    /// themselves are left to the host.
    pub async fn delete(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        let mut memberships = self.memberships.write().await;
        let handle = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or(SessionError::NotFound(*id))?;
        let mut s = handle.lock().await;
        s.deleted = true;
        memberships.retain(|_, session_id| *session_id != *id);
        persist::delete_session(&self.store, id)?;

        info!(session_id = %id, "session deleted");
        Ok(s.info(self.clock.now()))
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Every session, oldest first.
    pub async fn get_all(&self) -> Vec<SessionInfo> {
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        let mut infos = Vec::with_capacity(sessions.len());
        for handle in sessions.values() {
            infos.push(handle.lock().await.info(now));
        }
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    pub async fn get_active(&self) -> Vec<SessionInfo> {
        let mut infos = self.get_all().await;
        infos.retain(|i| i.status.is_active());
        infos
    }

    pub async fn get_by_id(&self, id: &SessionId) -> Option<SessionInfo> {
        let handle = self.handle(id).await.ok()?;
        let s = handle.lock().await;
        Some(s.info(self.clock.now()))
    }

    /// The Active session `player` is in, if any.
    pub async fn get_by_player(&self, player: &PlayerId) -> Option<SessionInfo> {
        let memberships = self.memberships.read().await;
        let id = memberships.get(player)?;
        let handle = self.sessions.read().await.get(id).cloned()?;
        let s = handle.lock().await;
        Some(s.info(self.clock.now()))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Writes every provisioned session to the store. Returns how many
    /// were written. Unprovisioned sessions are transient and skipped.
    pub async fn persist(&self) -> Result<usize, SessionError> {
        let sessions = self.sessions.read().await;
        let mut written = 0;
        for handle in sessions.values() {
            let s = handle.lock().await;
            if s.provisioned {
                persist::write_session(&self.store, &s)?;
                written += 1;
            }
        }
        info!(sessions = written, "sessions persisted");
        Ok(written)
    }

    /// Loads every stored session not already known. Returns how many
    /// were added.
    pub async fn reload(&self) -> Result<usize, SessionError> {
        let loaded = persist::read_sessions(&self.store)?;
        let added = self.attach(loaded).await;
        info!(sessions = added, "sessions reloaded from store");
        Ok(added)
    }

    /// Writes one `<id>.json` per session into `dir`.
    pub async fn persist_to_dir(&self, dir: &Path) -> Result<usize, SessionError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| SessionError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let sessions = self.sessions.read().await;
        let mut written = 0;
        for handle in sessions.values() {
            let s = handle.lock().await;
            persist::write_file(&self.codec, dir, &s).await?;
            written += 1;
        }
        info!(dir = %dir.display(), sessions = written, "session files written");
        Ok(written)
    }

    /// Loads every `*.json` session file in `dir` not already known.
    pub async fn reload_from_dir(&self, dir: &Path) -> Result<usize, SessionError> {
        let loaded = persist::read_files(&self.codec, dir).await?;
        let added = self.attach(loaded).await;
        info!(dir = %dir.display(), sessions = added, "session files loaded");
        Ok(added)
    }

    /// Inserts loaded sessions and rebuilds memberships for Active ones.
    async fn attach(&self, loaded: Vec<Session>) -> usize {
        let mut memberships = self.memberships.write().await;
        let mut sessions = self.sessions.write().await;
        let live_dir = self.pool.live_dir();
        let mut added = 0;

        for mut session in loaded {
            if sessions.contains_key(&session.id) {
                debug!(session_id = %session.id, "session already loaded, skipping");
                continue;
            }
            if session.provisioned && !live_dir.join(&session.world_name).exists() {
                warn!(
                    session_id = %session.id,
                    world = %session.world_name,
                    "world folder missing, reattaching by name"
                );
            }
            if session.status.is_active() {
                let taken: Vec<PlayerId> = session
                    .members
                    .keys()
                    .filter(|player| memberships.contains_key(player))
                    .copied()
                    .collect();
                for player in &taken {
                    warn!(
                        %player,
                        session_id = %session.id,
                        kept_in = ?memberships.get(player),
                        "player listed in two active sessions, dropping the later membership"
                    );
                    session.members.remove(player);
                }
                for player in session.members.keys() {
                    memberships.insert(*player, session.id);
                }
                if !taken.is_empty() {
                    self.autosave(&session);
                }
            }
            sessions.insert(session.id, Arc::new(Mutex::new(session)));
            added += 1;
        }
        added
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn handle(&self, id: &SessionId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::NotFound(*id))
    }

    /// Mirrors a provisioned session to the store. Failures are logged;
    /// the in-memory state stays authoritative until the next save.
    fn autosave(&self, session: &Session) {
        if !self.config.autosave || !session.provisioned {
            return;
        }
        if let Err(e) = persist::write_session(&self.store, session) {
            warn!(session_id = %session.id, error = %e, "session autosave failed");
        }
    }
}

fn not_active(session: &Session, action: &'static str) -> SessionError {
    SessionError::NotActive {
        id: session.id,
        status: session.status,
        action,
    }
}
