//! An in-process [`WorldProvider`] that writes plain folders.
//!
//! Each "world" is a directory containing a `level.dat` text file with its
//! seed. Failures can be injected per world name, and every call records
//! whether it arrived on the main context thread.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use trialforge_protocol::WorldRules;

use crate::{MainContext, WorldError, WorldProvider, WorldSpec};

#[derive(Default)]
struct FakeState {
    loaded: HashSet<String>,
    rules: HashMap<String, WorldRules>,
    polls: HashMap<String, u32>,
    polls_needed: u32,
    fail_create: HashSet<String>,
    fail_load: HashSet<String>,
    lose_on_unload: HashSet<String>,
    create_delay: Duration,
    created: Vec<WorldSpec>,
    off_main_calls: usize,
}

/// Folder-backed fake world engine for tests.
pub struct FakeWorlds {
    container: PathBuf,
    state: Mutex<FakeState>,
}

impl FakeWorlds {
    /// A fake engine whose live worlds live under `container`.
    pub fn new(container: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            state: Mutex::new(FakeState {
                polls_needed: 1,
                ..Default::default()
            }),
        }
    }

    /// Makes `surroundings_ready` return `true` only on the `n`th poll.
    pub fn set_polls_needed(&self, n: u32) {
        self.lock().polls_needed = n.max(1);
    }

    /// Makes `create_world` fail for any world whose name ends with `suffix`.
    pub fn fail_creating(&self, suffix: impl Into<String>) {
        self.lock().fail_create.insert(suffix.into());
    }

    /// Makes `load_world` fail for any world whose name ends with `suffix`.
    pub fn fail_loading(&self, suffix: impl Into<String>) {
        self.lock().fail_load.insert(suffix.into());
    }

    /// Makes `unload_world` delete the folder of any world whose name ends
    /// with `suffix`, as a crashing engine might.
    pub fn lose_on_unload(&self, suffix: impl Into<String>) {
        self.lock().lose_on_unload.insert(suffix.into());
    }

    /// Blocks the calling thread for `delay` in every `create_world`.
    pub fn set_create_delay(&self, delay: Duration) {
        self.lock().create_delay = delay;
    }

    /// Clears all injected failures and delays.
    pub fn heal(&self) {
        let mut state = self.lock();
        state.fail_create.clear();
        state.fail_load.clear();
        state.lose_on_unload.clear();
        state.create_delay = Duration::ZERO;
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.lock().loaded.contains(name)
    }

    /// Rules last applied to `name`.
    pub fn rules_for(&self, name: &str) -> Option<WorldRules> {
        self.lock().rules.get(name).cloned()
    }

    /// Every world created so far, in order.
    pub fn created(&self) -> Vec<WorldSpec> {
        self.lock().created.clone()
    }

    /// How often `surroundings_ready` was polled for `name`.
    pub fn polls(&self, name: &str) -> u32 {
        self.lock().polls.get(name).copied().unwrap_or(0)
    }

    /// Calls that arrived on a thread other than the main context.
    pub fn off_main_calls(&self) -> usize {
        self.lock().off_main_calls
    }

    /// Seed written to a world folder's `level.dat`.
    pub fn read_seed(folder: &Path) -> Option<i64> {
        std::fs::read_to_string(folder.join("level.dat"))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) -> MutexGuard<'_, FakeState> {
        let mut state = self.lock();
        if !MainContext::is_current_thread() {
            state.off_main_calls += 1;
        }
        state
    }
}

impl WorldProvider for FakeWorlds {
    fn world_container(&self) -> PathBuf {
        self.container.clone()
    }

    fn create_world(&self, spec: &WorldSpec) -> Result<(), WorldError> {
        let delay = self.lock().create_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut state = self.enter();
        if state.fail_create.iter().any(|s| spec.name.ends_with(s.as_str())) {
            return Err(WorldError::new(&spec.name, "generation failed"));
        }
        let folder = self.container.join(&spec.name);
        std::fs::create_dir_all(&folder)
            .and_then(|()| std::fs::write(folder.join("level.dat"), spec.seed.to_string()))
            .map_err(|e| WorldError::new(&spec.name, e.to_string()))?;
        state.loaded.insert(spec.name.clone());
        state.created.push(spec.clone());
        Ok(())
    }

    fn surroundings_ready(&self, name: &str) -> bool {
        let mut state = self.enter();
        let needed = state.polls_needed;
        let polls = state.polls.entry(name.to_string()).or_insert(0);
        *polls += 1;
        *polls >= needed
    }

    fn apply_rules(&self, name: &str, rules: &WorldRules) -> Result<(), WorldError> {
        let mut state = self.enter();
        if !state.loaded.contains(name) {
            return Err(WorldError::new(name, "not loaded"));
        }
        state.rules.insert(name.to_string(), rules.clone());
        Ok(())
    }

    fn unload_world(&self, name: &str) -> Result<(), WorldError> {
        let mut state = self.enter();
        if !state.loaded.remove(name) {
            return Err(WorldError::new(name, "not loaded"));
        }
        if state.lose_on_unload.iter().any(|s| name.ends_with(s.as_str())) {
            std::fs::remove_dir_all(self.container.join(name))
                .map_err(|e| WorldError::new(name, e.to_string()))?;
        }
        Ok(())
    }

    fn load_world(&self, name: &str) -> Result<(), WorldError> {
        let mut state = self.enter();
        if state.fail_load.iter().any(|s| name.ends_with(s.as_str())) {
            return Err(WorldError::new(name, "load failed"));
        }
        if !self.container.join(name).join("level.dat").is_file() {
            return Err(WorldError::new(name, "no world folder"));
        }
        state.loaded.insert(name.to_string());
        Ok(())
    }
}
