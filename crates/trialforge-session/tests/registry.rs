//! Integration tests for the session registry with a real pool and store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use trialforge_pool::{FakeWorlds, MainContext, PoolConfig, ResourcePool};
use trialforge_protocol::{Difficulty, PlayerId, SessionId, WorldKind};
use trialforge_session::{
    Clock, JoinMode, ManualClock, RegistryConfig, SessionError, SessionRegistry, SessionStatus,
    SettingId, SettingValue, StarterKit,
};
use trialforge_store::rusqlite::params;
use trialforge_store::{Migrator, Store, StoreConfig};

// =========================================================================
// Helpers
// =========================================================================

struct Fixture {
    dir: tempfile::TempDir,
    worlds: Arc<FakeWorlds>,
    store: Arc<Store>,
    pool: Arc<ResourcePool>,
    clock: Arc<ManualClock>,
    registry: SessionRegistry,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(StoreConfig::at(dir.path().join("trialforge.db"))).unwrap());
    Migrator::builtin(&store).run().unwrap();
    let worlds = Arc::new(FakeWorlds::new(dir.path().join("worlds")));
    let main = Arc::new(MainContext::spawn().unwrap());
    let config = PoolConfig {
        surroundings_poll: Duration::from_millis(1),
        target_size: 0,
        ..PoolConfig::at(dir.path().join("pool"))
    };
    let pool = Arc::new(ResourcePool::start(config, worlds.clone(), main, store.clone()).unwrap());
    let clock = Arc::new(ManualClock::default());
    let registry = SessionRegistry::new(
        RegistryConfig::default(),
        pool.clone(),
        store.clone(),
        clock.clone(),
    );
    Fixture {
        dir,
        worlds,
        store,
        pool,
        clock,
        registry,
    }
}

impl Fixture {
    /// A fresh registry over the same store, pool and clock.
    fn restarted(&self) -> SessionRegistry {
        SessionRegistry::new(
            RegistryConfig::default(),
            self.pool.clone(),
            self.store.clone(),
            self.clock.clone(),
        )
    }

    fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn ready_session(&self, name: &str) -> SessionId {
        let info = self.registry.create(name, PlayerId::random()).await.unwrap();
        self.registry.finalize(&info.id).await.unwrap();
        info.id
    }
}

// =========================================================================
// Create and finalize
// =========================================================================

#[tokio::test]
async fn test_create_starts_active_and_unprovisioned() {
    let f = fixture();
    let owner = PlayerId::random();

    let info = f.registry.create("Alpha", owner).await.unwrap();

    assert_eq!(info.status, SessionStatus::Active);
    assert_eq!(info.owner, owner);
    assert!(!info.provisioned);
    assert!(info.members.is_empty());
    assert!(info.started_at.is_none());
    assert_eq!(info.world.primary(), format!("session_{}", info.id.simple()));
}

#[tokio::test]
async fn test_create_with_existing_id_is_rejected() {
    let f = fixture();
    let id = SessionId::random();
    f.registry.create_with_id(id, "Alpha", PlayerId::random()).await.unwrap();

    let result = f.registry.create_with_id(id, "Beta", PlayerId::random()).await;

    assert!(matches!(result, Err(SessionError::IdCollision(dup)) if dup == id));
    assert_eq!(f.registry.get_by_id(&id).await.unwrap().name, "Alpha");
}

#[tokio::test]
async fn test_finalize_empty_pool_creates_worlds_on_demand() {
    let f = fixture();
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();

    let finalized = f.registry.finalize(&info.id).await.unwrap();

    assert!(finalized.provisioned);
    for (_, name) in info.world.all() {
        assert!(f.pool.live_dir().join(&name).is_dir(), "{name} should exist");
        assert!(f.worlds.rules_for(&name).is_some());
    }
}

#[tokio::test]
async fn test_finalize_claims_parked_entry_and_applies_settings() {
    let f = fixture();
    assert!(f.pool.prepare_async().await.unwrap().wait().await);
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();
    f.registry
        .set_setting(&info.id, SettingId::Difficulty, SettingValue::Difficulty(Difficulty::Hard))
        .await
        .unwrap();
    f.registry
        .set_setting(&info.id, SettingId::UltraHardcore, SettingValue::Toggle(true))
        .await
        .unwrap();

    f.registry.finalize(&info.id).await.unwrap();

    assert_eq!(f.pool.count_available(), 0);
    let rules = f.worlds.rules_for(&info.world.name(WorldKind::SecondaryA)).unwrap();
    assert_eq!(rules.difficulty, Difficulty::Hard);
    assert!(!rules.natural_regeneration);
}

#[tokio::test]
async fn test_finalize_twice_is_rejected() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;

    let result = f.registry.finalize(&id).await;

    assert!(matches!(result, Err(SessionError::AlreadyFinalized(_))));
}

#[tokio::test]
async fn test_finalize_failure_leaves_session_unprovisioned_and_deletable() {
    let f = fixture();
    f.worlds.fail_creating(WorldKind::SecondaryB.suffix());
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();

    let result = f.registry.finalize(&info.id).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::ProvisioningFailed { .. }));
    assert_eq!(err.message_key(), "session.finalize.failed");
    assert!(!f.registry.get_by_id(&info.id).await.unwrap().provisioned);

    f.registry.delete(&info.id).await.unwrap();
    assert!(f.registry.get_by_id(&info.id).await.is_none());
}

#[tokio::test]
async fn test_finalize_after_failure_can_be_retried() {
    let f = fixture();
    f.worlds.fail_creating(WorldKind::SecondaryB.suffix());
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();
    assert!(f.registry.finalize(&info.id).await.is_err());

    f.worlds.heal();

    assert!(f.registry.finalize(&info.id).await.unwrap().provisioned);
}

#[tokio::test]
async fn test_finalize_activation_failure_falls_back_to_on_demand() {
    let f = fixture();
    assert!(f.pool.prepare_async().await.unwrap().wait().await);
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();
    f.worlds.fail_loading(WorldKind::SecondaryA.suffix());

    let finalized = f.registry.finalize(&info.id).await.unwrap();

    assert!(finalized.provisioned);
    assert_eq!(f.pool.count_available(), 0);
    assert_eq!(f.worlds.created().len(), 6, "three parked, three on demand");
    for (_, name) in info.world.all() {
        assert!(f.pool.live_dir().join(&name).is_dir(), "{name} should exist");
        assert!(f.worlds.is_loaded(&name));
    }
}

#[tokio::test]
async fn test_finalize_deleted_while_provisioning_returns_not_found() {
    let f = Arc::new(fixture());
    f.worlds.set_create_delay(Duration::from_millis(100));
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();
    let finalizing = {
        let f = f.clone();
        let id = info.id;
        tokio::spawn(async move { f.registry.finalize(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    f.registry.delete(&info.id).await.unwrap();
    let result = finalizing.await.unwrap();

    assert!(matches!(result, Err(SessionError::NotFound(id)) if id == info.id));
    assert!(f.registry.get_by_id(&info.id).await.is_none());
    assert_eq!(f.restarted().reload().await.unwrap(), 0, "deleted session stays deleted");
    for (_, name) in info.world.all() {
        assert!(!f.pool.live_dir().join(&name).exists(), "{name} should be discarded");
        assert!(!f.worlds.is_loaded(&name));
    }
}

// =========================================================================
// Settings
// =========================================================================

#[tokio::test]
async fn test_settings_change_before_finalize() {
    let f = fixture();
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();

    let kit = f.registry.advance_setting(&info.id, SettingId::StarterKit).await.unwrap();

    assert_eq!(kit, SettingValue::Kit(StarterKit::Basic));
    let settings = f.registry.get_by_id(&info.id).await.unwrap().settings;
    assert_eq!(settings.starter_kit, StarterKit::Basic);
}

#[tokio::test]
async fn test_settings_locked_after_finalize() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;

    let result = f.registry.advance_setting(&id, SettingId::KeepInventory).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::SettingsLocked(_)));
    assert_eq!(err.message_key(), "session.settings.locked");
    assert!(!f.registry.get_by_id(&id).await.unwrap().settings.keep_inventory);
}

#[tokio::test]
async fn test_invalid_setting_value_leaves_settings_untouched() {
    let f = fixture();
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();

    let result = f
        .registry
        .set_setting(&info.id, SettingId::BorderSize, SettingValue::Border(123))
        .await;

    assert!(matches!(result, Err(SessionError::InvalidSetting { .. })));
    assert_eq!(f.registry.get_by_id(&info.id).await.unwrap().settings.border_size, 0);
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn test_join_first_member_starts_timer() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let player = PlayerId::random();

    let outcome = f.registry.join(player, &id, JoinMode::Normal).await.unwrap();

    assert_eq!(outcome.session_id, id);
    assert!(outcome.previous.is_none());
    assert!(outcome.place_at_start);
    assert_eq!(outcome.spawn_world, format!("session_{}", id.simple()));
    let info = f.registry.get_by_player(&player).await.unwrap();
    assert_eq!(info.id, id);
    assert_eq!(info.started_at, Some(f.clock_now()));
}

#[tokio::test]
async fn test_join_second_member_keeps_started_at() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    f.registry.join(PlayerId::random(), &id, JoinMode::Normal).await.unwrap();
    let started = f.registry.get_by_id(&id).await.unwrap().started_at;

    f.clock.advance(TimeDelta::minutes(5));
    f.registry.join(PlayerId::random(), &id, JoinMode::Normal).await.unwrap();

    let info = f.registry.get_by_id(&id).await.unwrap();
    assert_eq!(info.started_at, started);
    assert_eq!(info.members.len(), 2);
}

#[tokio::test]
async fn test_join_restore_mode_does_not_place_at_start() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;

    let outcome = f.registry.join(PlayerId::random(), &id, JoinMode::Restore).await.unwrap();

    assert!(!outcome.place_at_start);
}

#[tokio::test]
async fn test_join_other_session_moves_player() {
    let f = fixture();
    let alpha = f.ready_session("Alpha").await;
    let beta = f.ready_session("Beta").await;
    let player = PlayerId::random();
    f.registry.join(player, &alpha, JoinMode::Normal).await.unwrap();

    let outcome = f.registry.join(player, &beta, JoinMode::Normal).await.unwrap();

    assert_eq!(outcome.previous, Some(alpha));
    assert!(!f.registry.get_by_id(&alpha).await.unwrap().is_member(&player));
    assert!(f.registry.get_by_id(&beta).await.unwrap().is_member(&player));
    assert_eq!(f.registry.get_by_player(&player).await.unwrap().id, beta);
}

#[tokio::test]
async fn test_join_same_session_twice_is_rejected() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let player = PlayerId::random();
    f.registry.join(player, &id, JoinMode::Normal).await.unwrap();

    let result = f.registry.join(player, &id, JoinMode::Normal).await;

    let err = result.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyMember(..)));
    assert_eq!(err.message_key(), "session.join.already_member");
    assert_eq!(f.registry.get_by_id(&id).await.unwrap().members, vec![player]);
}

#[tokio::test]
async fn test_join_unprovisioned_session_is_rejected() {
    let f = fixture();
    let info = f.registry.create("Alpha", PlayerId::random()).await.unwrap();

    let result = f.registry.join(PlayerId::random(), &info.id, JoinMode::Normal).await;

    assert!(matches!(result, Err(SessionError::NotProvisioned(_))));
}

#[tokio::test]
async fn test_join_completed_session_keeps_player_in_current_session() {
    let f = fixture();
    let alpha = f.ready_session("Alpha").await;
    let beta = f.ready_session("Beta").await;
    let player = PlayerId::random();
    f.registry.join(player, &alpha, JoinMode::Normal).await.unwrap();
    f.registry.complete(&beta).await.unwrap();

    let result = f.registry.join(player, &beta, JoinMode::Normal).await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotActive { status: SessionStatus::Completed, .. }
    ));
    assert_eq!(err.message_key(), "session.join.not_active");
    assert_eq!(f.registry.get_by_player(&player).await.unwrap().id, alpha);
    assert!(f.registry.get_by_id(&beta).await.unwrap().members.is_empty());
}

#[tokio::test]
async fn test_join_unknown_session_is_not_found() {
    let f = fixture();

    let result = f.registry.join(PlayerId::random(), &SessionId::random(), JoinMode::Normal).await;

    assert!(matches!(result, Err(SessionError::NotFound(_))));
}

#[tokio::test]
async fn test_leave_removes_both_sides() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let player = PlayerId::random();
    f.registry.join(player, &id, JoinMode::Normal).await.unwrap();

    let left = f.registry.leave(player).await.unwrap();

    assert_eq!(left, id);
    assert!(f.registry.get_by_player(&player).await.is_none());
    let info = f.registry.get_by_id(&id).await.unwrap();
    assert!(info.members.is_empty());
    assert_eq!(info.status, SessionStatus::Active, "emptied session stays");
}

#[tokio::test]
async fn test_leave_without_session_is_rejected() {
    let f = fixture();

    let result = f.registry.leave(PlayerId::random()).await;

    assert!(matches!(result, Err(SessionError::NotInSession(_))));
}

#[tokio::test]
async fn test_concurrent_joins_leave_player_in_exactly_one_session() {
    let f = Arc::new(fixture());
    let a = f.ready_session("A").await;
    let b = f.ready_session("B").await;
    let player = PlayerId::random();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let f = f.clone();
        let target = if i % 2 == 0 { a } else { b };
        tasks.push(tokio::spawn(async move {
            let _ = f.registry.join(player, &target, JoinMode::Normal).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let in_a = f.registry.get_by_id(&a).await.unwrap().is_member(&player);
    let in_b = f.registry.get_by_id(&b).await.unwrap().is_member(&player);
    assert!(in_a ^ in_b, "player must be in exactly one session");
    let mapped = f.registry.get_by_player(&player).await.unwrap().id;
    assert_eq!(mapped, if in_a { a } else { b });
}

// =========================================================================
// Timer and status
// =========================================================================

#[tokio::test]
async fn test_pause_resume_excludes_paused_time() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    f.registry.join(PlayerId::random(), &id, JoinMode::Normal).await.unwrap();

    f.clock.advance(TimeDelta::minutes(10));
    assert!(f.registry.pause(&id).await.unwrap());
    assert!(!f.registry.pause(&id).await.unwrap(), "second pause is a no-op");
    f.clock.advance(TimeDelta::minutes(3));
    assert!(f.registry.get_by_id(&id).await.unwrap().is_paused());
    assert!(f.registry.resume(&id).await.unwrap());
    assert!(!f.registry.resume(&id).await.unwrap());
    f.clock.advance(TimeDelta::minutes(2));

    let info = f.registry.get_by_id(&id).await.unwrap();
    assert_eq!(info.total_paused, TimeDelta::minutes(3));
    assert_eq!(info.elapsed, TimeDelta::minutes(12));
    assert_eq!(info.formatted_duration(), "00:12:00");
}

#[tokio::test]
async fn test_pause_finished_session_is_rejected() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    f.registry.fail(&id).await.unwrap();

    let err = f.registry.pause(&id).await.unwrap_err();

    assert_eq!(err.message_key(), "session.pause.not_active");
}

#[tokio::test]
async fn test_complete_unmaps_members_and_keeps_roster() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let players = [PlayerId::random(), PlayerId::random()];
    for p in players {
        f.registry.join(p, &id, JoinMode::Normal).await.unwrap();
    }
    f.clock.advance(TimeDelta::hours(1));

    let info = f.registry.complete(&id).await.unwrap();

    assert_eq!(info.status, SessionStatus::Completed);
    assert_eq!(info.completed_at, Some(f.clock_now()));
    assert_eq!(info.formatted_duration(), "01:00:00");
    assert_eq!(info.members.len(), 2);
    for p in players {
        assert!(f.registry.get_by_player(&p).await.is_none());
    }
    assert!(f.registry.get_active().await.is_empty());
    assert_eq!(f.registry.get_all().await.len(), 1);
}

#[tokio::test]
async fn test_complete_twice_is_rejected() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    f.registry.complete(&id).await.unwrap();

    let result = f.registry.fail(&id).await;

    assert!(matches!(
        result,
        Err(SessionError::NotActive { status: SessionStatus::Completed, .. })
    ));
}

#[tokio::test]
async fn test_delete_unmaps_members_and_store_rows() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let player = PlayerId::random();
    f.registry.join(player, &id, JoinMode::Normal).await.unwrap();

    f.registry.delete(&id).await.unwrap();

    assert!(f.registry.get_by_player(&player).await.is_none());
    assert_eq!(f.restarted().reload().await.unwrap(), 0);
}

// =========================================================================
// Persistence
// =========================================================================

#[tokio::test]
async fn test_reload_restores_sessions_and_memberships() {
    let f = fixture();
    let active = f.ready_session("Alpha").await;
    let done = f.ready_session("Beta").await;
    let player = PlayerId::random();
    f.registry.join(player, &active, JoinMode::Normal).await.unwrap();
    f.registry.join(PlayerId::random(), &done, JoinMode::Normal).await.unwrap();
    f.registry.pause(&active).await.unwrap();
    f.registry.complete(&done).await.unwrap();
    f.registry.create("Unprovisioned", PlayerId::random()).await.unwrap();
    let before = f.registry.get_by_id(&active).await.unwrap();

    let reloaded = f.restarted();
    assert_eq!(reloaded.reload().await.unwrap(), 2, "unprovisioned sessions are transient");

    assert_eq!(reloaded.get_by_id(&active).await.unwrap(), before);
    assert_eq!(reloaded.get_by_player(&player).await.unwrap().id, active);
    let done_info = reloaded.get_by_id(&done).await.unwrap();
    assert_eq!(done_info.status, SessionStatus::Completed);
    assert_eq!(done_info.members.len(), 1);
}

#[tokio::test]
async fn test_reload_twice_adds_nothing() {
    let f = fixture();
    f.ready_session("Alpha").await;
    let reloaded = f.restarted();
    reloaded.reload().await.unwrap();

    assert_eq!(reloaded.reload().await.unwrap(), 0);
    assert_eq!(reloaded.session_count().await, 1);
}

#[tokio::test]
async fn test_persist_without_autosave_writes_on_demand() {
    let f = fixture();
    let registry = SessionRegistry::new(
        RegistryConfig {
            autosave: false,
            ..Default::default()
        },
        f.pool.clone(),
        f.store.clone(),
        f.clock.clone(),
    );
    let info = registry.create("Alpha", PlayerId::random()).await.unwrap();
    registry.finalize(&info.id).await.unwrap();
    let player = PlayerId::random();
    registry.join(player, &info.id, JoinMode::Normal).await.unwrap();

    let stale = f.restarted();
    stale.reload().await.unwrap();
    assert!(stale.get_by_player(&player).await.is_none(), "join not yet written");

    assert_eq!(registry.persist().await.unwrap(), 1);
    let fresh = f.restarted();
    fresh.reload().await.unwrap();
    assert_eq!(fresh.get_by_player(&player).await.unwrap().id, info.id);
}

#[tokio::test]
async fn test_session_files_round_trip_through_directory() {
    let f = fixture();
    let id = f.ready_session("Alpha").await;
    let player = PlayerId::random();
    f.registry.join(player, &id, JoinMode::Normal).await.unwrap();
    let snapshots = f.dir.path().join("sessions");
    std::fs::create_dir_all(&snapshots).unwrap();
    std::fs::write(snapshots.join("garbage.json"), b"{ not json").unwrap();

    assert_eq!(f.registry.persist_to_dir(&snapshots).await.unwrap(), 1);

    let reloaded = f.restarted();
    assert_eq!(reloaded.reload_from_dir(&snapshots).await.unwrap(), 1);
    assert_eq!(
        reloaded.get_by_id(&id).await.unwrap(),
        f.registry.get_by_id(&id).await.unwrap()
    );
    assert_eq!(reloaded.get_by_player(&player).await.unwrap().id, id);
}

#[tokio::test]
async fn test_reload_player_in_two_active_sessions_keeps_earlier_membership() {
    let f = fixture();
    let alpha = f.ready_session("Alpha").await;
    f.clock.advance(TimeDelta::minutes(1));
    let beta = f.ready_session("Beta").await;
    let player = PlayerId::random();
    f.registry.join(player, &alpha, JoinMode::Normal).await.unwrap();
    f.store
        .execute(
            "INSERT INTO session_members (session_id, player_id, joined_at) VALUES (?1, ?2, ?3)",
            params![beta.to_string(), player.to_string(), f.clock_now()],
        )
        .unwrap();

    let reloaded = f.restarted();
    reloaded.reload().await.unwrap();

    assert_eq!(reloaded.get_by_player(&player).await.unwrap().id, alpha);
    assert!(!reloaded.get_by_id(&beta).await.unwrap().is_member(&player));
    let again = f.restarted();
    again.reload().await.unwrap();
    assert!(!again.get_by_id(&beta).await.unwrap().is_member(&player), "duplicate row cleaned up");

    let moved = reloaded.join(player, &beta, JoinMode::Normal).await.unwrap();

    assert_eq!(moved.previous, Some(alpha));
    assert_eq!(reloaded.get_by_player(&player).await.unwrap().id, beta);
}

#[tokio::test]
async fn test_session_files_nested_dir_created_and_missing_dir_is_io_error() {
    let f = fixture();
    f.ready_session("Alpha").await;
    let nested = f.dir.path().join("exports").join("today");

    assert_eq!(f.registry.persist_to_dir(&nested).await.unwrap(), 1);
    assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 1, "no temp file left behind");

    let result = f.restarted().reload_from_dir(&f.dir.path().join("absent")).await;

    assert!(matches!(result, Err(SessionError::Io { .. })));
}
