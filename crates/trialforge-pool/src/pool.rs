//! The resource pool: world sets generated ahead of demand.
//!
//! # Layout
//!
//! ```text
//! <pool>/
//!   pool_3f9a.../                  parked entry
//!     pool_3f9a...
//!     pool_3f9a..._secondaryA
//!     pool_3f9a..._secondaryB
//!   .staging-pool_77c1.../         prepare in progress (ignored)
//!   .broken-pool_0b2e.../          quarantined after a failed claim (ignored)
//! ```
//!
//! A prepare moves freshly generated worlds into a dot-prefixed staging
//! folder and renames it into place only after all three moves succeed,
//! so a listing never sees a half-parked entry. A staging folder found at
//! startup means a prepare was interrupted; it is reported, not touched.
//!
//! A claim that fails partway moves the worlds it already took back into
//! the entry. If the entry itself is at fault, or cannot be restored, it
//! is renamed to a `.broken-` folder so later claims skip it.
//!
//! # Worker
//!
//! Prepares are queued on a bounded channel and run one at a time by a
//! worker task. Each job walks the [`PrepareStage`] machine, hopping to
//! the [`MainContext`] for every stage that touches live worlds and doing
//! the filesystem relocation itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use rand::Rng;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use trialforge_protocol::{SessionId, WorldKind, WorldNames, WorldRules};
use trialforge_store::Store;
use trialforge_store::rusqlite::params;

use crate::{MainContext, PoolConfig, PoolError, PrepareStage, WorldError, WorldProvider, WorldSpec};

/// Prefix of every pool entry name.
pub const POOL_ENTRY_PREFIX: &str = "pool_";

const STAGING_PREFIX: &str = ".staging-";
const BROKEN_PREFIX: &str = ".broken-";

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// Completion of one queued prepare.
///
/// Dropping the ticket does not cancel the prepare.
#[derive(Debug)]
pub struct PrepareTicket {
    receiver: oneshot::Receiver<bool>,
}

impl PrepareTicket {
    /// Resolves to `true` if the entry was parked, `false` if any step
    /// failed or the worker stopped first.
    pub async fn wait(self) -> bool {
        self.receiver.await.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// ResourcePool
// ---------------------------------------------------------------------------

enum PoolCommand {
    Prepare { reply: oneshot::Sender<bool> },
    Shutdown,
}

struct PoolShared {
    config: PoolConfig,
    live_dir: PathBuf,
    provider: Arc<dyn WorldProvider>,
    main: Arc<MainContext>,
    store: Arc<Store>,
    in_flight: AtomicUsize,
}

/// Handle to the pool and its worker.
pub struct ResourcePool {
    shared: Arc<PoolShared>,
    sender: mpsc::Sender<PoolCommand>,
    /// Serializes claims so two sessions never race for one entry.
    claim_lock: Mutex<()>,
}

impl ResourcePool {
    /// Creates the pool directory if needed and spawns the worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: PoolConfig,
        provider: Arc<dyn WorldProvider>,
        main: Arc<MainContext>,
        store: Arc<Store>,
    ) -> Result<Self, PoolError> {
        std::fs::create_dir_all(&config.pool_dir)
            .map_err(|e| PoolError::io(&config.pool_dir, e))?;
        let live_dir = provider.world_container();
        std::fs::create_dir_all(&live_dir).map_err(|e| PoolError::io(&live_dir, e))?;
        report_stale_staging(&config.pool_dir);

        let (tx, rx) = mpsc::channel(config.channel_size.max(1));
        let shared = Arc::new(PoolShared {
            config,
            live_dir,
            provider,
            main,
            store,
            in_flight: AtomicUsize::new(0),
        });

        tokio::spawn(
            PoolWorker {
                shared: shared.clone(),
                receiver: rx,
            }
            .run(),
        );

        let pool = Self {
            shared,
            sender: tx,
            claim_lock: Mutex::new(()),
        };
        info!(
            pool_dir = %pool.pool_dir().display(),
            live_dir = %pool.live_dir().display(),
            available = pool.count_available(),
            "resource pool started"
        );
        Ok(pool)
    }

    /// Directory holding parked entries.
    pub fn pool_dir(&self) -> &Path {
        &self.shared.config.pool_dir
    }

    /// Directory holding live worlds.
    pub fn live_dir(&self) -> &Path {
        &self.shared.live_dir
    }

    /// Queues one prepare and returns a ticket for its outcome.
    pub async fn prepare_async(&self) -> Result<PrepareTicket, PoolError> {
        let (reply, receiver) = oneshot::channel();
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(PoolCommand::Prepare { reply }).await.is_err() {
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::WorkerGone);
        }
        Ok(PrepareTicket { receiver })
    }

    /// Prepares queued or running right now.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Queues enough prepares that parked plus in-flight entries reach
    /// `target`. Returns one ticket per queued prepare.
    pub async fn fill_to(&self, target: usize) -> Result<Vec<PrepareTicket>, PoolError> {
        let have = self.count_available() + self.in_flight();
        let missing = target.saturating_sub(have);
        let mut tickets = Vec::with_capacity(missing);
        for _ in 0..missing {
            tickets.push(self.prepare_async().await?);
        }
        if missing > 0 {
            info!(target, have, queued = missing, "filling resource pool");
        }
        Ok(tickets)
    }

    /// [`fill_to`](Self::fill_to) the configured target size.
    pub async fn fill(&self) -> Result<Vec<PrepareTicket>, PoolError> {
        self.fill_to(self.shared.config.target_size).await
    }

    /// Number of parked entries.
    pub fn count_available(&self) -> usize {
        match self.entries() {
            Ok(entries) => entries.len(),
            Err(e) => {
                warn!(error = %e, "cannot list pool directory");
                0
            }
        }
    }

    /// Names of parked entries, in claim order.
    pub fn entries(&self) -> Result<Vec<String>, PoolError> {
        list_entries(self.pool_dir())
    }

    /// Moves the first parked entry into the live directory under the
    /// session's world names.
    ///
    /// Returns `Ok(None)` without side effects when the pool is empty. If a
    /// move fails, worlds already moved go back into the entry and the
    /// error is returned. An entry that is missing a world, or cannot be
    /// restored, is quarantined.
    pub async fn claim_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<WorldNames>, PoolError> {
        let _claim = self.claim_lock.lock().await;

        let Some(entry) = self.entries()?.into_iter().next() else {
            debug!(%session_id, "pool empty, nothing to claim");
            return Ok(None);
        };

        let source = WorldNames::new(entry.as_str());
        let target = WorldNames::for_session(session_id);
        let entry_dir = self.pool_dir().join(&entry);
        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(WorldKind::ALL.len());

        for kind in WorldKind::ALL {
            let from = entry_dir.join(source.name(kind));
            let to = self.live_dir().join(target.name(kind));
            if let Err(e) = move_world(&from, &to).await {
                error!(%session_id, %entry, world = %kind, error = %e, "claim failed, rolling back");
                let restored = restore_moved(&moved).await;
                // A taken live name is the session's problem; anything else is the entry's.
                if !restored || !matches!(e, PoolError::LiveWorldExists(_)) {
                    self.quarantine(&entry).await;
                }
                return Err(e);
            }
            moved.push((from, to));
        }

        match tokio::fs::remove_dir_all(&entry_dir).await {
            Ok(()) => self.forget_entry(&entry),
            Err(e) => {
                warn!(%entry, error = %e, "claimed entry folder could not be removed");
                self.quarantine(&entry).await;
            }
        }

        info!(
            %session_id,
            %entry,
            world = %target,
            remaining = self.count_available(),
            "pool entry claimed"
        );
        Ok(Some(target))
    }

    /// Loads a claimed world set and applies `rules` to each world.
    pub async fn activate(&self, names: &WorldNames, rules: &WorldRules) -> Result<(), PoolError> {
        let provider = self.shared.provider.clone();
        let names = names.clone();
        let rules = rules.clone();
        self.shared
            .main
            .run(move || -> Result<(), WorldError> {
                for (_, name) in names.all() {
                    provider.load_world(&name)?;
                    provider.apply_rules(&name, &rules)?;
                }
                Ok(())
            })
            .await??;
        Ok(())
    }

    /// Generates a world set directly in the live directory. Used when the
    /// pool has nothing to claim.
    pub async fn create_on_demand(
        &self,
        names: &WorldNames,
        rules: &WorldRules,
    ) -> Result<(), PoolError> {
        let provider = self.shared.provider.clone();
        let seed = random_seed();
        let specs = world_specs(names, seed);
        let rules = rules.clone();
        self.shared
            .main
            .run(move || -> Result<(), WorldError> {
                for spec in &specs {
                    provider.create_world(spec)?;
                    provider.apply_rules(&spec.name, &rules)?;
                }
                Ok(())
            })
            .await??;
        info!(world = %names, seed, "worlds created on demand");
        Ok(())
    }

    /// Unloads a live world set and deletes its folders. Used to throw away
    /// worlds nobody will play in. Failures are logged, not returned.
    pub async fn discard(&self, names: &WorldNames) {
        let provider = self.shared.provider.clone();
        let to_unload = names.clone();
        let unloaded = self
            .shared
            .main
            .run(move || {
                for (_, name) in to_unload.all() {
                    if let Err(e) = provider.unload_world(&name) {
                        debug!(world = %name, error = %e, "world not unloaded before discard");
                    }
                }
            })
            .await;
        if let Err(e) = unloaded {
            warn!(world = %names, error = %e, "could not unload worlds before discard");
        }

        for (_, name) in names.all() {
            let folder = self.live_dir().join(&name);
            match tokio::fs::remove_dir_all(&folder).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => error!(
                    path = %folder.display(),
                    error = %e,
                    "failed to remove discarded world, manual cleanup required"
                ),
            }
        }
        info!(world = %names, "live worlds discarded");
    }

    /// Stops the worker. Prepares still queued resolve `false`.
    pub async fn shutdown(&self) {
        if self.sender.send(PoolCommand::Shutdown).await.is_err() {
            debug!("pool worker already stopped");
        }
    }

    /// Takes `entry` out of the listing for good, keeping its folder for
    /// inspection when it can be renamed.
    async fn quarantine(&self, entry: &str) {
        let entry_dir = self.pool_dir().join(entry);
        let broken = self.pool_dir().join(format!("{BROKEN_PREFIX}{entry}"));
        if let Err(e) = tokio::fs::rename(&entry_dir, &broken).await {
            warn!(%entry, error = %e, "entry could not be quarantined, removing it");
            if let Err(e) = tokio::fs::remove_dir_all(&entry_dir).await {
                error!(%entry, error = %e, "broken entry is still listed, manual cleanup required");
            }
        } else {
            warn!(%entry, path = %broken.display(), "pool entry quarantined");
        }
        self.forget_entry(entry);
    }

    fn forget_entry(&self, entry: &str) {
        if let Err(e) = self
            .shared
            .store
            .execute("DELETE FROM pool_entries WHERE name = ?1", [entry])
        {
            warn!(%entry, error = %e, "pool entry row not removed");
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct PrepareJob {
    names: WorldNames,
    seed: i64,
}

impl PrepareJob {
    fn new() -> Self {
        let mut rng = rand::rng();
        let entry = format!("{POOL_ENTRY_PREFIX}{:016x}", rng.random::<u64>());
        Self {
            names: WorldNames::new(entry),
            seed: rng.random(),
        }
    }

    fn entry(&self) -> &str {
        self.names.primary()
    }
}

struct PoolWorker {
    shared: Arc<PoolShared>,
    receiver: mpsc::Receiver<PoolCommand>,
}

impl PoolWorker {
    async fn run(mut self) {
        debug!("pool worker started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                PoolCommand::Prepare { reply } => {
                    let parked = self.prepare().await;
                    self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                    let _ = reply.send(parked);
                }
                PoolCommand::Shutdown => break,
            }
        }

        self.receiver.close();
        while let Ok(cmd) = self.receiver.try_recv() {
            if let PoolCommand::Prepare { .. } = cmd {
                self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
        debug!("pool worker stopped");
    }

    async fn prepare(&self) -> bool {
        let job = PrepareJob::new();
        let mut stage = PrepareStage::Requested;
        debug!(entry = job.entry(), seed = job.seed, "prepare requested");

        while !stage.is_terminal() {
            let next = match self.step(&job, stage).await {
                Ok(next) => next,
                Err(e) => {
                    error!(entry = job.entry(), %stage, error = %e, "prepare failed");
                    PrepareStage::Failed
                }
            };
            debug_assert!(stage.can_transition_to(next));
            debug!(entry = job.entry(), from = %stage, to = %next, "prepare stage");
            stage = next;
        }

        if stage == PrepareStage::Done {
            info!(entry = job.entry(), "pool entry parked");
            true
        } else {
            false
        }
    }

    /// Performs `stage`'s work and returns the stage to move to.
    async fn step(&self, job: &PrepareJob, stage: PrepareStage) -> Result<PrepareStage, PoolError> {
        match stage {
            PrepareStage::Requested => {}
            PrepareStage::Generating => self.generate(job).await?,
            PrepareStage::AwaitingSurroundings => self.await_surroundings(job).await?,
            PrepareStage::Unloading => self.unload(job).await?,
            PrepareStage::Relocating => self.relocate(job).await?,
            PrepareStage::Done | PrepareStage::Failed => return Ok(stage),
        }
        Ok(stage.next().unwrap_or(PrepareStage::Failed))
    }

    /// Creates the three worlds with standard rules. Sessions apply their
    /// own rules on activation.
    async fn generate(&self, job: &PrepareJob) -> Result<(), PoolError> {
        let provider = self.shared.provider.clone();
        let specs = world_specs(&job.names, job.seed);
        let rules = WorldRules::default();
        self.shared
            .main
            .run(move || -> Result<(), WorldError> {
                for spec in &specs {
                    provider.create_world(spec)?;
                    provider.apply_rules(&spec.name, &rules)?;
                }
                Ok(())
            })
            .await??;
        Ok(())
    }

    async fn await_surroundings(&self, job: &PrepareJob) -> Result<(), PoolError> {
        loop {
            let provider = self.shared.provider.clone();
            let names = job.names.clone();
            let ready = self
                .shared
                .main
                .run(move || {
                    names
                        .all()
                        .iter()
                        .all(|(_, name)| provider.surroundings_ready(name))
                })
                .await?;
            if ready {
                return Ok(());
            }
            tokio::time::sleep(self.shared.config.surroundings_poll).await;
        }
    }

    async fn unload(&self, job: &PrepareJob) -> Result<(), PoolError> {
        let provider = self.shared.provider.clone();
        let names = job.names.clone();
        self.shared
            .main
            .run(move || -> Result<(), WorldError> {
                for (_, name) in names.all() {
                    provider.unload_world(&name)?;
                }
                Ok(())
            })
            .await??;
        Ok(())
    }

    async fn relocate(&self, job: &PrepareJob) -> Result<(), PoolError> {
        let pool_dir = &self.shared.config.pool_dir;
        let staging = pool_dir.join(format!("{STAGING_PREFIX}{}", job.entry()));
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| PoolError::io(&staging, e))?;

        let parked = pool_dir.join(job.entry());
        if let Err(e) = self.park(job, &staging, &parked).await {
            self.abandon(job, &staging).await;
            return Err(e);
        }

        if let Err(e) = self.shared.store.execute(
            "INSERT OR REPLACE INTO pool_entries (name, seed, created_at) VALUES (?1, ?2, ?3)",
            params![job.entry(), job.seed, Utc::now()],
        ) {
            warn!(entry = job.entry(), error = %e, "pool entry row not recorded");
        }
        Ok(())
    }

    async fn park(&self, job: &PrepareJob, staging: &Path, parked: &Path) -> Result<(), PoolError> {
        for (_, name) in job.names.all() {
            move_world(&self.shared.live_dir.join(&name), &staging.join(&name)).await?;
        }
        tokio::fs::rename(staging, parked)
            .await
            .map_err(|e| PoolError::io(parked, e))
    }

    /// Deletes whatever a failed relocation left behind, staged or live.
    /// The worlds are already unloaded.
    async fn abandon(&self, job: &PrepareJob, staging: &Path) {
        let mut leftovers = vec![staging.to_path_buf()];
        leftovers.extend(job.names.all().into_iter().map(|(_, name)| self.shared.live_dir.join(name)));
        for path in leftovers {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => debug!(entry = job.entry(), path = %path.display(), "abandoned prepare folder removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(entry = job.entry(), path = %path.display(), error = %e, "abandoned prepare folder not removed"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

fn world_specs(names: &WorldNames, seed: i64) -> Vec<WorldSpec> {
    names
        .all()
        .into_iter()
        .map(|(kind, name)| WorldSpec { name, kind, seed })
        .collect()
}

fn random_seed() -> i64 {
    rand::rng().random()
}

/// Renames `from` to `to`, refusing to overwrite.
async fn move_world(from: &Path, to: &Path) -> Result<(), PoolError> {
    match tokio::fs::try_exists(to).await {
        Ok(false) => {}
        Ok(true) => return Err(PoolError::LiveWorldExists(to.to_path_buf())),
        Err(e) => return Err(PoolError::io(to, e)),
    }
    tokio::fs::rename(from, to)
        .await
        .map_err(|e| PoolError::io(from, e))
}

/// Moves claimed worlds back to where they came from. A world that cannot
/// go back is deleted so no stray live folder survives. Returns `false`
/// if anything could not be moved back.
async fn restore_moved(moved: &[(PathBuf, PathBuf)]) -> bool {
    let mut restored = true;
    for (from, to) in moved.iter().rev() {
        let Err(e) = tokio::fs::rename(to, from).await else {
            continue;
        };
        restored = false;
        warn!(path = %to.display(), error = %e, "claimed world could not be moved back");
        if let Err(e) = tokio::fs::remove_dir_all(to).await {
            error!(
                path = %to.display(),
                error = %e,
                "failed to remove partially claimed world, manual cleanup required"
            );
        }
    }
    restored
}

fn list_entries(pool_dir: &Path) -> Result<Vec<String>, PoolError> {
    let read = std::fs::read_dir(pool_dir).map_err(|e| PoolError::io(pool_dir, e))?;
    let mut names = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| PoolError::io(pool_dir, e))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| PoolError::io(entry.path(), e))?
            .is_dir();
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_dir && !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn report_stale_staging(pool_dir: &Path) {
    let Ok(read) = std::fs::read_dir(pool_dir) else {
        return;
    };
    for entry in read.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(STAGING_PREFIX) {
            warn!(
                path = %entry.path().display(),
                "interrupted prepare left a staging folder; delete it, or rename it without the prefix to park it"
            );
        } else if name.starts_with(BROKEN_PREFIX) {
            warn!(path = %entry.path().display(), "quarantined pool entry found; inspect and delete it");
        }
    }
}
