//! # Trialforge
//!
//! Session and world lifecycle engine for group challenge servers.
//!
//! A host embeds the [`Engine`], implements [`WorldProvider`] and
//! [`RestorablePlayer`] on top of its game server, and calls into the
//! session registry from its commands and menus.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trialforge::prelude::*;
//!
//! // let engine = Engine::builder()
//! //     .config(EngineConfig::from_toml_file("trialforge.toml")?)
//! //     .start(Arc::new(MyWorlds::new()))
//! //     .await?;
//! //
//! // let session = engine.registry().create("Alpha", owner).await?;
//! // engine.registry().finalize(&session.id).await?;
//! // engine.registry().join(owner, &session.id, JoinMode::Normal).await?;
//! ```

mod builder;
mod config;
mod engine;
mod error;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::TrialforgeError;

pub use trialforge_pool as pool;
pub use trialforge_protocol as protocol;
pub use trialforge_session as session;
pub use trialforge_snapshot as snapshot;
pub use trialforge_store as store;

pub use trialforge_pool::WorldProvider;
pub use trialforge_snapshot::RestorablePlayer;

/// Installs a `tracing` subscriber that logs to stdout.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// The types most hosts need.
pub mod prelude {
    pub use crate::{Engine, EngineBuilder, EngineConfig, TrialforgeError};
    pub use trialforge_pool::{PoolConfig, WorldProvider, WorldSpec};
    pub use trialforge_protocol::{PlayerId, SessionId, WorldNames, WorldRules};
    pub use trialforge_session::{
        Clock, JoinMode, JoinOutcome, RegistryConfig, SessionError, SessionInfo, SessionStatus,
        SystemClock,
    };
    pub use trialforge_snapshot::{PlayerState, RestorablePlayer};
    pub use trialforge_store::StoreConfig;
}
