//! Integration tests for saving and restoring player snapshots.

use std::sync::Arc;

use trialforge_protocol::SessionId;
use trialforge_snapshot::{
    GameMode, ItemStack, Location, MemoryPlayer, SnapshotError, SnapshotStore, StatusEffect,
    Vitals,
};
use trialforge_store::{Migrator, Store, StoreConfig};

// =========================================================================
// Helpers
// =========================================================================

fn setup() -> (tempfile::TempDir, Arc<Store>, SnapshotStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(StoreConfig::at(dir.path().join("snap.db"))).unwrap());
    Migrator::builtin(&store).run().unwrap();
    let snapshots = SnapshotStore::new(store.clone());
    (dir, store, snapshots)
}

/// Snapshots reference their session, so tests need a session row.
fn session_row(store: &Store) -> SessionId {
    let id = SessionId::random();
    store
        .execute(
            "INSERT INTO sessions (id, name, status, world_name, owner_id, created_at)
             VALUES (?1, 'Alpha', 'active', ?2, 'owner', '2026-01-01T00:00:00Z')",
            [id.to_string(), format!("session_{}", id.simple())],
        )
        .unwrap();
    id
}

/// A player with something in every group.
fn geared_player() -> MemoryPlayer {
    let mut player = MemoryPlayer::new("session_x");
    player.state.inventory.contents = vec![
        Some(ItemStack::new("minecraft:iron_sword", 1)),
        None,
        Some(ItemStack {
            material: "minecraft:bread".into(),
            amount: 12,
            data: Some("{\"name\":\"Loaf\"}".into()),
        }),
    ];
    player.state.inventory.armor = vec![None, None, Some(ItemStack::new("minecraft:iron_chestplate", 1)), None];
    player.state.inventory.offhand = Some(ItemStack::new("minecraft:shield", 1));
    player.state.ender_chest = vec![Some(ItemStack::new("minecraft:diamond", 3))];
    player.state.location = Location {
        world: "session_x_secondaryA".into(),
        x: 12.5,
        y: 70.0,
        z: -3.25,
        yaw: 90.0,
        pitch: -10.0,
    };
    player.state.vitals = Vitals {
        health: 13.5,
        food: 17,
        saturation: 2.5,
        xp_level: 7,
        xp_progress: 0.25,
    };
    player.state.effects = vec![StatusEffect {
        kind: "minecraft:speed".into(),
        amplifier: 1,
        duration_ticks: 600,
        ambient: false,
    }];
    player.state.game_mode = GameMode::Adventure;
    player
}

/// Same player id, blank state, as after a reconnect.
fn reconnected(original: &MemoryPlayer) -> MemoryPlayer {
    let mut player = MemoryPlayer::new("lobby");
    player.id = original.id;
    player
}

// =========================================================================
// Save / restore
// =========================================================================

#[test]
fn test_restore_after_save_applies_every_group() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let original = geared_player();
    snapshots.save(&original, &session).unwrap();

    let mut player = reconnected(&original);
    let restored = snapshots.restore(&mut player, &session).unwrap();

    assert!(restored);
    assert_eq!(player.state, original.state);
}

#[test]
fn test_restore_is_single_use() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let original = geared_player();
    snapshots.save(&original, &session).unwrap();
    let mut player = reconnected(&original);

    assert!(snapshots.restore(&mut player, &session).unwrap());
    assert!(!snapshots.has_data(&original.id, &session).unwrap());
    assert!(!snapshots.restore(&mut player, &session).unwrap());
}

#[test]
fn test_restore_without_snapshot_returns_false_and_leaves_player() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let mut player = MemoryPlayer::new("lobby");
    let before = player.clone();

    assert!(!snapshots.restore(&mut player, &session).unwrap());
    assert_eq!(player, before);
}

#[test]
fn test_save_twice_keeps_latest_state() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let mut original = geared_player();
    snapshots.save(&original, &session).unwrap();
    original.state.vitals.health = 4.0;
    snapshots.save(&original, &session).unwrap();

    let mut player = reconnected(&original);
    snapshots.restore(&mut player, &session).unwrap();

    assert_eq!(player.state.vitals.health, 4.0);
    assert!(!snapshots.has_data(&original.id, &session).unwrap());
}

#[test]
fn test_save_unknown_session_is_store_error() {
    let (_dir, _store, snapshots) = setup();

    let result = snapshots.save(&geared_player(), &SessionId::random());

    assert!(matches!(result, Err(SnapshotError::Store(_))));
}

// =========================================================================
// Corruption
// =========================================================================

#[test]
fn test_restore_corrupt_inventory_applies_nothing_and_keeps_row() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let original = geared_player();
    snapshots.save(&original, &session).unwrap();
    store
        .execute("UPDATE player_snapshots SET inventory = '{broken'", [])
        .unwrap();
    let mut player = reconnected(&original);
    let before = player.clone();

    let result = snapshots.restore(&mut player, &session);

    assert!(
        matches!(result, Err(SnapshotError::Corrupt { group: "inventory", .. })),
        "got {result:?}"
    );
    assert_eq!(player, before, "no group may be applied");
    assert!(snapshots.has_data(&original.id, &session).unwrap());
}

#[test]
fn test_restore_unknown_game_mode_is_corrupt() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let original = geared_player();
    snapshots.save(&original, &session).unwrap();
    store
        .execute("UPDATE player_snapshots SET game_mode = 'hardcore'", [])
        .unwrap();

    let result = snapshots.restore(&mut reconnected(&original), &session);

    assert!(matches!(result, Err(SnapshotError::Corrupt { group: "game_mode", .. })));
}

// =========================================================================
// Clearing and lookup
// =========================================================================

#[test]
fn test_clear_player_removes_all_sessions() {
    let (_dir, store, snapshots) = setup();
    let a = session_row(&store);
    let b = session_row(&store);
    let player = geared_player();
    let other = MemoryPlayer::new("lobby");
    snapshots.save(&player, &a).unwrap();
    snapshots.save(&player, &b).unwrap();
    snapshots.save(&other, &a).unwrap();

    let removed = snapshots.clear_player(&player.id).unwrap();

    assert_eq!(removed, 2);
    assert!(!snapshots.has_data(&player.id, &a).unwrap());
    assert!(snapshots.has_data(&other.id, &a).unwrap());
}

#[test]
fn test_clear_session_removes_all_players() {
    let (_dir, store, snapshots) = setup();
    let a = session_row(&store);
    let b = session_row(&store);
    let p1 = geared_player();
    let p2 = MemoryPlayer::new("lobby");
    snapshots.save(&p1, &a).unwrap();
    snapshots.save(&p2, &a).unwrap();
    snapshots.save(&p1, &b).unwrap();

    assert_eq!(snapshots.clear_session(&a).unwrap(), 2);
    assert!(snapshots.has_data(&p1.id, &b).unwrap());
}

#[test]
fn test_clear_single_snapshot() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let player = geared_player();
    snapshots.save(&player, &session).unwrap();

    snapshots.clear(&player.id, &session).unwrap();

    assert!(!snapshots.has_data(&player.id, &session).unwrap());
    assert!(snapshots.saved_at(&player.id, &session).unwrap().is_none());
}

#[test]
fn test_latest_session_for_picks_most_recent_save() {
    let (_dir, store, snapshots) = setup();
    let older = session_row(&store);
    let newer = session_row(&store);
    let player = geared_player();
    snapshots.save(&player, &older).unwrap();
    snapshots.save(&player, &newer).unwrap();
    store
        .execute(
            "UPDATE player_snapshots SET saved_at = '2000-01-01 00:00:00+00:00' WHERE session_id = ?1",
            [older.to_string()],
        )
        .unwrap();

    assert_eq!(snapshots.latest_session_for(&player.id).unwrap(), Some(newer));
    assert_eq!(snapshots.latest_session_for(&MemoryPlayer::new("x").id).unwrap(), None);
}

#[test]
fn test_session_delete_cascades_to_snapshots() {
    let (_dir, store, snapshots) = setup();
    let session = session_row(&store);
    let player = geared_player();
    snapshots.save(&player, &session).unwrap();

    store
        .execute("DELETE FROM sessions WHERE id = ?1", [session.to_string()])
        .unwrap();

    assert!(!snapshots.has_data(&player.id, &session).unwrap());
}
