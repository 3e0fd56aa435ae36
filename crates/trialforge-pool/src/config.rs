//! Pool configuration and the prepare state machine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`ResourcePool`](crate::ResourcePool).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Directory holding parked pool entries. Should live on the same
    /// filesystem as the live world container so moves are renames.
    pub pool_dir: PathBuf,

    /// How many parked entries `fill` aims to keep available.
    pub target_size: usize,

    /// Delay between surroundings readiness polls while preparing.
    #[serde(with = "millis")]
    pub surroundings_poll: Duration,

    /// Capacity of the worker's command channel.
    pub channel_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_dir: PathBuf::from("world_pool"),
            target_size: 2,
            surroundings_poll: Duration::from_millis(250),
            channel_size: 64,
        }
    }
}

impl PoolConfig {
    /// Default settings with the pool rooted at `pool_dir`.
    pub fn at(pool_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool_dir: pool_dir.into(),
            ..Default::default()
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// PrepareStage
// ---------------------------------------------------------------------------

/// Where a prepare stage is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageContext {
    /// The [`MainContext`](crate::MainContext) thread. Anything touching
    /// live world handles.
    Main,
    /// The pool worker task. Filesystem work only.
    Worker,
}

/// Progress of one prepare job.
///
/// ```text
/// Requested → Generating → AwaitingSurroundings → Unloading → Relocating → Done
///                 ↘               ↘                    ↘            ↘
///                                       Failed
/// ```
///
/// Any non-terminal stage may fail. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareStage {
    Requested,
    Generating,
    AwaitingSurroundings,
    Unloading,
    Relocating,
    Done,
    Failed,
}

impl PrepareStage {
    /// The stage that follows a successful step, or `None` when terminal.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Requested => Some(Self::Generating),
            Self::Generating => Some(Self::AwaitingSurroundings),
            Self::AwaitingSurroundings => Some(Self::Unloading),
            Self::Unloading => Some(Self::Relocating),
            Self::Relocating => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Failed => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }

    /// Returns `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The context that executes this stage's work, if it has any.
    pub fn context(self) -> Option<StageContext> {
        match self {
            Self::Generating | Self::AwaitingSurroundings | Self::Unloading => {
                Some(StageContext::Main)
            }
            Self::Relocating => Some(StageContext::Worker),
            Self::Requested | Self::Done | Self::Failed => None,
        }
    }
}

impl fmt::Display for PrepareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Generating => write!(f, "Generating"),
            Self::AwaitingSurroundings => write!(f, "AwaitingSurroundings"),
            Self::Unloading => write!(f, "Unloading"),
            Self::Relocating => write!(f, "Relocating"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
