use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::checkpoint::Checkpoint;
use crate::clock::CountdownState;
use crate::config::GuardSelfDamage;
use crate::events::{CoreEventKind, GuardEndCause, OpenField};
use crate::ids::ExternalId;
use crate::input::{GamepadButton, GamepadState, KeyCode, KeySchemeId, KeyboardState};
use crate::lobby::{JoinCoordinator, LobbyTick};
use crate::persistence::{MemoryCheckpointStore, PersistenceError};

const DT: f32 = 0.5;

fn test_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.outcome.respawn_delay_seconds = 0.5;
    config.invulnerability.after_respawn_seconds = 0.0;
    config.invulnerability.after_hit_seconds = 0.0;
    config
}

fn checkpoints() -> CheckpointRegistry {
    let mut registry = CheckpointRegistry::new();
    registry
        .register(Checkpoint::starting(
            CheckpointId(0),
            vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)],
        ))
        .expect("starting checkpoint");
    registry
        .register(Checkpoint::new(
            CheckpointId(1),
            vec![Vec2::new(10.0, 0.0), Vec2::new(11.0, 0.0)],
        ))
        .expect("second checkpoint");
    registry
}

/// Store whose write log stays readable after the session takes ownership of it.
#[derive(Clone, Default)]
struct SharedStore {
    writes: Rc<RefCell<Vec<CheckpointId>>>,
}

impl CheckpointStore for SharedStore {
    fn last_checkpoint(&self) -> Result<Option<CheckpointId>, PersistenceError> {
        Ok(self.writes.borrow().last().copied())
    }

    fn persist_checkpoint(&mut self, id: CheckpointId) -> Result<(), PersistenceError> {
        self.writes.borrow_mut().push(id);
        Ok(())
    }
}

struct Rig {
    registry: InputSourceRegistry,
    session: PlaySession,
}

impl Rig {
    fn gamepads(config: CoreConfig, players: u8) -> Self {
        Self::with_store(config, players, MemoryCheckpointStore::default())
    }

    fn with_store(
        config: CoreConfig,
        players: u8,
        store: impl CheckpointStore + 'static,
    ) -> Self {
        let mut registry = InputSourceRegistry::default();
        let roster = (0..players)
            .map(|index| {
                let source = registry.connect_gamepad(index as u32);
                registry.bind(source, SlotId(index)).expect("bind");
                SlotAssignment {
                    slot: SlotId(index),
                    source,
                    archetype: Archetype::Ranged,
                }
            })
            .collect::<Vec<_>>();
        let session =
            PlaySession::start(config, &roster, &registry, checkpoints(), Box::new(store))
                .expect("session starts");
        Self { registry, session }
    }

    fn tick(&mut self) {
        self.session.tick(DT, &self.registry, &OpenField);
        self.registry.finish_frame();
    }

    fn entity(&self, slot: u8) -> EntityId {
        self.session.player(SlotId(slot)).expect("player").id()
    }

    fn collide(&mut self, slot: u8, category: CollisionCategory) {
        let subject = self.entity(slot);
        self.session.push_collision(CollisionFact {
            subject,
            other: ExternalId(900),
            category,
        });
    }

    fn kill(&mut self, slot: u8) {
        self.collide(
            slot,
            CollisionCategory::Hostile {
                contact_damage: 10_000,
            },
        );
        self.tick();
    }

    fn press(&mut self, slot: u8, button: GamepadButton) {
        let state = GamepadState::default().with_pressed(button);
        self.registry.record_gamepad(slot as u32, &state);
        self.tick();
        self.registry.record_gamepad(slot as u32, &GamepadState::default());
    }

    fn last_events_of(&self, kind: CoreEventKind) -> usize {
        self.session
            .last_tick_events()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

#[test]
fn systems_run_in_fixed_order_every_tick() {
    let mut rig = Rig::gamepads(test_config(), 1);
    rig.tick();
    rig.tick();
    assert_eq!(rig.session.last_tick_order(), &SYSTEM_ORDER);
    let text = rig
        .session
        .last_tick_order()
        .iter()
        .map(|system| system.name())
        .collect::<Vec<_>>()
        .join(">");
    assert_eq!(text, SYSTEM_ORDER_TEXT);
    assert_eq!(rig.session.tick_count(), 2);
}

#[test]
fn conflicting_outcome_policy_refuses_to_start() {
    let mut config = test_config();
    config.outcome.shared_death_limit = Some(5);
    config.outcome.per_player_death_limit = Some(3);
    let mut registry = InputSourceRegistry::default();
    let source = registry.connect_gamepad(0);
    registry.bind(source, SlotId(0)).expect("bind");
    let roster = [SlotAssignment {
        slot: SlotId(0),
        source,
        archetype: Archetype::Melee,
    }];
    let result = PlaySession::start(
        config,
        &roster,
        &registry,
        checkpoints(),
        Box::new(MemoryCheckpointStore::default()),
    );
    assert!(matches!(
        result,
        Err(SessionStartError::Config(
            ConfigError::ConflictingOutcomePolicy { .. }
        ))
    ));
}

#[test]
fn start_rejects_empty_or_stale_roster() {
    let registry = InputSourceRegistry::default();
    let empty = PlaySession::start(
        test_config(),
        &[],
        &registry,
        checkpoints(),
        Box::new(MemoryCheckpointStore::default()),
    );
    assert!(matches!(empty, Err(SessionStartError::EmptyRoster)));

    let stale = PlaySession::start(
        test_config(),
        &[SlotAssignment {
            slot: SlotId(0),
            source: SourceId(3),
            archetype: Archetype::Ranged,
        }],
        &registry,
        checkpoints(),
        Box::new(MemoryCheckpointStore::default()),
    );
    assert!(matches!(
        stale,
        Err(SessionStartError::SourceNotBound { .. })
    ));
}

#[test]
fn players_spawn_on_starting_checkpoint_anchors() {
    let rig = Rig::gamepads(test_config(), 3);
    let positions = rig
        .session
        .players()
        .iter()
        .map(PlayerEntity::position)
        .collect::<Vec<_>>();
    assert_eq!(
        positions,
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0)
        ]
    );
    assert_eq!(rig.session.active_checkpoint(), None);
}

#[test]
fn collisions_resolve_on_the_following_tick() {
    let mut rig = Rig::gamepads(test_config(), 1);
    rig.collide(0, CollisionCategory::Hostile { contact_damage: 5 });
    assert_eq!(rig.session.player(SlotId(0)).expect("player").health(), 80);
    rig.tick();
    assert_eq!(rig.session.player(SlotId(0)).expect("player").health(), 75);
    assert_eq!(rig.last_events_of(CoreEventKind::PlayerDamaged), 1);
}

#[test]
fn scenario_a_one_keyboard_two_schemes_start_a_session() {
    let config = test_config();
    let mut registry = InputSourceRegistry::default();
    let sources = registry.connect_keyboard(0, &[KeySchemeId(0), KeySchemeId(1)]);
    let mut lobby = JoinCoordinator::from_config(&config);

    let frame = |registry: &mut InputSourceRegistry,
                 lobby: &mut JoinCoordinator,
                 keys: &[KeyCode]| {
        let mut keyboard = KeyboardState::default();
        for key in keys {
            keyboard.press(*key);
        }
        registry.record_keyboard(0, &keyboard);
        lobby.process_input(registry);
        let tick = lobby.tick(DT, registry);
        registry.finish_frame();
        tick
    };

    frame(&mut registry, &mut lobby, &[KeyCode::F, KeyCode::Period]);
    frame(&mut registry, &mut lobby, &[]);
    frame(&mut registry, &mut lobby, &[KeyCode::F, KeyCode::Period]);
    assert!(lobby.all_ready());

    let mut roster = None;
    for _ in 0..10 {
        if let LobbyTick::Start(started) = frame(&mut registry, &mut lobby, &[]) {
            roster = Some(started);
            break;
        }
    }
    let roster = roster.expect("lobby commits to start");
    assert_eq!(roster.len(), 2);

    let session = PlaySession::start(
        config,
        &roster,
        &registry,
        checkpoints(),
        Box::new(MemoryCheckpointStore::default()),
    )
    .expect("session starts");
    let player_sources = session
        .players()
        .iter()
        .map(PlayerEntity::source)
        .collect::<Vec<_>>();
    assert_eq!(player_sources, sources);
}

#[test]
fn scenario_b_fifth_shared_death_ends_the_session_without_respawn() {
    let mut config = test_config();
    config.outcome.shared_death_limit = Some(5);
    config.outcome.per_player_death_limit = None;
    let mut rig = Rig::gamepads(config, 2);

    for slot in [0, 1, 0, 1] {
        rig.kill(slot);
        assert!(!rig.session.is_game_over());
        rig.tick();
        assert!(rig.session.player(SlotId(slot)).expect("player").is_alive());
    }
    assert_eq!(rig.session.shared_deaths(), 4);

    rig.kill(1);
    assert!(rig.session.is_game_over());
    assert_eq!(rig.session.shared_deaths(), 5);
    assert_eq!(rig.session.outcome().respawn_state(SlotId(1)), None);
    assert_eq!(rig.session.outcome().pending_respawns(), 0);
    assert_eq!(rig.last_events_of(CoreEventKind::GameOver), 1);
    assert_eq!(rig.last_events_of(CoreEventKind::RespawnScheduled), 0);

    for _ in 0..6 {
        rig.tick();
    }
    assert!(!rig.session.player(SlotId(1)).expect("player").is_alive());
    assert!(rig.session.is_game_over());
}

#[test]
fn scenario_c_per_player_cap_triggers_on_the_dying_player_only() {
    let mut config = test_config();
    config.outcome.shared_death_limit = None;
    config.outcome.per_player_death_limit = Some(3);
    let mut rig = Rig::gamepads(config, 2);
    assert_eq!(rig.session.policy(), OutcomePolicy::PerPlayerCap { limit: 3 });

    for _ in 0..2 {
        rig.kill(0);
        rig.tick();
    }
    assert_eq!(rig.session.deaths_of(SlotId(0)), 2);
    assert_eq!(rig.session.deaths_of(SlotId(1)), 0);
    assert!(!rig.session.is_game_over());

    rig.kill(0);
    assert!(rig.session.is_game_over());
    assert_eq!(rig.session.deaths_of(SlotId(1)), 0);
}

#[test]
fn scenario_d_guard_blocks_three_projectiles_then_starts_cooldown() {
    let mut config = test_config();
    config.guard.max_health = 3;
    config.guard.self_damage = GuardSelfDamage::Fixed { amount: 1 };
    config.guard.cooldown_seconds = 4.0;
    let mut rig = Rig::gamepads(config, 1);

    rig.press(0, GamepadButton::West);
    let guard = rig
        .session
        .player(SlotId(0))
        .expect("player")
        .guard()
        .expect("guard active");

    let projectile = CollisionCategory::HostileProjectile { damage: 15 };
    rig.collide(0, projectile);
    rig.tick();
    assert_eq!(rig.session.guards().get(guard).map(|guard| guard.health()), Some(2));
    assert!(rig
        .session
        .player(SlotId(0))
        .expect("player")
        .clock()
        .is_ready(AbilityKind::Guard));

    rig.collide(0, projectile);
    rig.tick();
    assert_eq!(rig.session.guards().get(guard).map(|guard| guard.health()), Some(1));
    let hud = rig.session.hud(SlotId(0)).expect("hud");
    assert_eq!(hud.guard_health, Some(1));
    assert!(hud.cooldowns[1].ready);

    rig.collide(0, projectile);
    rig.tick();
    assert!(rig.session.guards().get(guard).is_none());
    let player = rig.session.player(SlotId(0)).expect("player");
    assert_eq!(player.guard(), None);
    assert_eq!(player.health(), player.max_health());
    assert_eq!(player.clock().remaining_seconds(AbilityKind::Guard), 4.0);
    assert!(rig.session.last_tick_events().iter().any(|event| matches!(
        event,
        CoreEvent::GuardDestroyed {
            cause: GuardEndCause::Depleted,
            ..
        }
    )));
    let despawned = rig
        .session
        .drain_effects()
        .into_iter()
        .filter(|effect| matches!(effect, EffectRequest::DespawnProjectile { .. }))
        .count();
    assert_eq!(despawned, 3);
}

#[test]
fn scenario_e_game_over_cancels_in_flight_respawn() {
    let mut config = test_config();
    config.outcome.shared_death_limit = Some(2);
    config.outcome.per_player_death_limit = None;
    config.outcome.respawn_delay_seconds = 2.0;
    let mut rig = Rig::gamepads(config, 2);

    rig.kill(0);
    assert_eq!(rig.session.outcome().respawn_remaining(SlotId(0)), Some(2.0));
    rig.tick();
    rig.tick();
    assert_eq!(rig.session.outcome().respawn_remaining(SlotId(0)), Some(1.0));

    rig.kill(1);
    assert!(rig.session.is_game_over());
    assert_eq!(
        rig.session.outcome().respawn_state(SlotId(0)),
        Some(CountdownState::Cancelled)
    );
    for _ in 0..8 {
        rig.tick();
        assert_eq!(rig.last_events_of(CoreEventKind::PlayerRespawned), 0);
    }
    assert!(!rig.session.player(SlotId(0)).expect("player").is_alive());
    assert!(rig.session.hud(SlotId(0)).expect("hud").dead);
}

#[test]
fn respawn_uses_active_checkpoint_and_grants_invulnerability() {
    let mut config = test_config();
    config.invulnerability.after_respawn_seconds = 2.0;
    config.outcome.shared_death_limit = None;
    let mut rig = Rig::gamepads(config, 2);

    rig.collide(1, CollisionCategory::CheckpointTrigger(CheckpointId(1)));
    rig.tick();
    assert_eq!(rig.session.active_checkpoint(), Some(CheckpointId(1)));

    rig.kill(1);
    rig.tick();
    let player = rig.session.player(SlotId(1)).expect("player");
    assert!(player.is_alive());
    assert_eq!(player.position(), Vec2::new(11.0, 0.0));
    assert!(player.is_invulnerable());
    assert!(rig
        .session
        .drain_effects()
        .iter()
        .any(|effect| matches!(
            effect,
            EffectRequest::Teleport { position, .. } if *position == Vec2::new(11.0, 0.0)
        )));
}

#[test]
fn dead_players_cannot_activate_checkpoints_and_reactivation_persists_once() {
    let mut config = test_config();
    config.outcome.respawn_delay_seconds = 5.0;
    let mut rig = Rig::gamepads(config, 2);

    rig.kill(0);
    rig.collide(0, CollisionCategory::CheckpointTrigger(CheckpointId(1)));
    rig.tick();
    assert_eq!(rig.session.active_checkpoint(), None);

    rig.collide(1, CollisionCategory::CheckpointTrigger(CheckpointId(1)));
    rig.tick();
    rig.collide(1, CollisionCategory::CheckpointTrigger(CheckpointId(1)));
    rig.tick();
    assert_eq!(rig.session.active_checkpoint(), Some(CheckpointId(1)));
    assert_eq!(rig.last_events_of(CoreEventKind::CheckpointActivated), 0);
}

#[test]
fn reactivating_the_active_checkpoint_persists_only_once() {
    let store = SharedStore::default();
    let mut rig = Rig::with_store(test_config(), 1, store.clone());

    for _ in 0..2 {
        rig.collide(0, CollisionCategory::CheckpointTrigger(CheckpointId(1)));
        rig.tick();
    }
    assert_eq!(*store.writes.borrow(), vec![CheckpointId(1)]);

    rig.collide(0, CollisionCategory::CheckpointTrigger(CheckpointId(0)));
    rig.tick();
    assert_eq!(*store.writes.borrow(), vec![CheckpointId(1), CheckpointId(0)]);
}

#[test]
fn persisted_checkpoint_is_restored_at_start() {
    let rig = Rig::with_store(
        test_config(),
        2,
        MemoryCheckpointStore::with_last(CheckpointId(1)),
    );
    assert_eq!(rig.session.active_checkpoint(), Some(CheckpointId(1)));
    assert_eq!(
        rig.session.player(SlotId(0)).expect("player").position(),
        Vec2::new(10.0, 0.0)
    );

    let unknown = Rig::with_store(
        test_config(),
        1,
        MemoryCheckpointStore::with_last(CheckpointId(42)),
    );
    assert_eq!(unknown.session.active_checkpoint(), None);
    assert_eq!(
        unknown.session.player(SlotId(0)).expect("player").position(),
        Vec2::ZERO
    );
}

#[test]
fn pickup_heals_alive_player_up_to_max() {
    let mut rig = Rig::gamepads(test_config(), 1);
    rig.collide(0, CollisionCategory::Hostile { contact_damage: 30 });
    rig.tick();
    rig.collide(0, CollisionCategory::Pickup { heal: 100 });
    rig.tick();
    let player = rig.session.player(SlotId(0)).expect("player");
    assert_eq!(player.health(), player.max_health());
    assert!(rig.session.last_tick_events().contains(&CoreEvent::PlayerHealed {
        slot: SlotId(0),
        amount: 30,
        health: 80,
    }));
}

#[test]
fn projectile_hitting_the_guard_directly_is_consumed() {
    let mut rig = Rig::gamepads(test_config(), 1);
    rig.press(0, GamepadButton::West);
    let guard = rig
        .session
        .player(SlotId(0))
        .expect("player")
        .guard()
        .expect("guard");
    rig.session.drain_effects();

    rig.session.push_collision(CollisionFact {
        subject: guard,
        other: ExternalId(5),
        category: CollisionCategory::HostileProjectile { damage: 40 },
    });
    rig.tick();
    assert_eq!(rig.session.guards().get(guard).map(|guard| guard.health()), Some(2));
    assert!(rig.session.drain_effects().contains(&EffectRequest::DespawnProjectile {
        projectile: ExternalId(5)
    }));
}

#[test]
fn expired_guard_notifies_owner_like_a_destroyed_one() {
    let mut config = test_config();
    config.guard.lifetime_seconds = 1.0;
    let mut rig = Rig::gamepads(config, 1);
    rig.press(0, GamepadButton::West);
    assert!(rig.session.player(SlotId(0)).expect("player").guard().is_some());

    rig.tick();
    let player = rig.session.player(SlotId(0)).expect("player");
    assert_eq!(player.guard(), None);
    assert!(!player.clock().is_ready(AbilityKind::Guard));
    assert!(rig.session.last_tick_events().iter().any(|event| matches!(
        event,
        CoreEvent::GuardDestroyed {
            cause: GuardEndCause::Expired,
            ..
        }
    )));
}

#[test]
fn disconnected_source_leaves_player_frozen_but_present() {
    let mut rig = Rig::gamepads(test_config(), 2);
    let mut state = GamepadState::default();
    state.left_stick = Vec2::new(1.0, 0.0);
    rig.registry.record_gamepad(1, &state);
    rig.registry.disconnect_gamepad(1);
    rig.tick();

    assert_eq!(rig.session.players().len(), 2);
    assert!(rig.session.is_departed(SlotId(1)));
    assert_eq!(rig.last_events_of(CoreEventKind::PlayerDeparted), 1);
    let player = rig.session.player(SlotId(1)).expect("player");
    assert_eq!(player.velocity(), Vec2::ZERO);
    assert!(player.is_alive());
    assert!(rig.session.hud(SlotId(1)).expect("hud").departed);
}

#[test]
fn departed_player_takes_no_damage_and_cannot_end_the_game() {
    let mut config = test_config();
    config.outcome.shared_death_limit = Some(1);
    let mut rig = Rig::gamepads(config, 2);
    rig.registry.disconnect_gamepad(1);
    rig.tick();

    rig.kill(1);
    let player = rig.session.player(SlotId(1)).expect("player");
    assert!(player.is_alive());
    assert_eq!(player.health(), player.max_health());
    assert_eq!(rig.session.deaths_of(SlotId(1)), 0);
    assert!(!rig.session.is_game_over());

    rig.kill(0);
    assert!(rig.session.is_game_over());
}

#[test]
fn reconnected_device_rejoins_its_departed_slot() {
    let mut rig = Rig::gamepads(test_config(), 2);
    rig.registry.disconnect_gamepad(1);
    rig.tick();
    assert!(rig.session.is_departed(SlotId(1)));

    let source = rig.registry.connect_gamepad(1);
    rig.registry.record_gamepad(
        1,
        &GamepadState::default().with_pressed(GamepadButton::South),
    );
    assert_eq!(rig.session.rejoin_departed(&mut rig.registry), vec![SlotId(1)]);
    rig.tick();

    assert!(!rig.session.is_departed(SlotId(1)));
    assert_eq!(rig.last_events_of(CoreEventKind::PlayerRejoined), 1);
    assert_eq!(rig.session.player(SlotId(1)).expect("player").source(), source);

    let mut state = GamepadState::default();
    state.left_stick = Vec2::new(1.0, 0.0);
    rig.registry.record_gamepad(1, &state);
    rig.tick();
    assert_ne!(
        rig.session.player(SlotId(1)).expect("player").velocity(),
        Vec2::ZERO
    );
}

#[test]
fn rejoin_needs_a_confirm_press_from_a_free_source() {
    let mut rig = Rig::gamepads(test_config(), 2);
    rig.registry.disconnect_gamepad(1);
    rig.tick();

    rig.registry.connect_gamepad(1);
    rig.registry.record_gamepad(1, &GamepadState::default());
    assert!(rig.session.rejoin_departed(&mut rig.registry).is_empty());

    rig.registry.record_gamepad(
        0,
        &GamepadState::default().with_pressed(GamepadButton::South),
    );
    assert!(rig.session.rejoin_departed(&mut rig.registry).is_empty());
    assert!(rig.session.is_departed(SlotId(1)));
}

#[test]
fn contact_collected_on_the_last_dash_step_is_ignored() {
    let mut config = test_config();
    config.dash.duration_seconds = 1.0;
    let mut rig = Rig::gamepads(config, 1);
    rig.press(0, GamepadButton::East);
    assert!(rig.session.player(SlotId(0)).expect("player").state().is_dashing());

    rig.collide(0, CollisionCategory::Hostile { contact_damage: 25 });
    rig.tick();
    let player = rig.session.player(SlotId(0)).expect("player");
    assert!(!player.state().is_dashing());
    assert_eq!(player.health(), player.max_health());

    rig.collide(0, CollisionCategory::Hostile { contact_damage: 25 });
    rig.tick();
    assert_eq!(rig.session.player(SlotId(0)).expect("player").health(), 55);
}
