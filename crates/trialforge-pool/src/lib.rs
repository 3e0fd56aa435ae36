//! Asynchronous world pre-provisioning for Trialforge.
//!
//! Generating a world set is slow, so the pool generates sets ahead of
//! demand and parks them on disk. A new session then claims a parked set
//! with three directory renames instead of waiting for generation.
//!
//! # Key types
//!
//! - [`ResourcePool`]: queues prepares, claims parked entries
//! - [`MainContext`]: the single thread allowed to touch live worlds
//! - [`WorldProvider`]: the world engine boundary the host implements
//! - [`PrepareStage`]: per-job state machine run by the pool worker
//! - [`PoolConfig`]: directories, target size, poll interval

mod config;
mod error;
#[cfg(any(test, feature = "testing"))]
mod fake;
mod main_context;
mod pool;
mod provider;

pub use config::{PoolConfig, PrepareStage, StageContext};
pub use error::{PoolError, WorldError};
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeWorlds;
pub use main_context::{MAIN_THREAD_NAME, MainContext};
pub use pool::{POOL_ENTRY_PREFIX, PrepareTicket, ResourcePool};
pub use provider::{WorldProvider, WorldSpec};
