use std::path::PathBuf;

use coop_core::{
    CheckpointStore, Countdown, CountdownTick, CoreConfig, InputSourceRegistry, JoinCoordinator,
    JsonFileCheckpointStore, LobbyTick, MemoryCheckpointStore, PlaySession, SlotAssignment,
};
use tracing::{debug, error, info, warn};

use super::arena::Arena;
use super::script::DeviceBank;

const GAME_OVER_LINGER_SECONDS: f32 = 2.0;
const HUD_LOG_INTERVAL_TICKS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SceneKey {
    Lobby,
    Play,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SceneCommand {
    None,
    HardResetTo(SceneKey),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunStats {
    pub(crate) sessions_started: u32,
    pub(crate) sessions_refused: u32,
    pub(crate) games_over: u32,
}

/// State shared by both scenes. Source bindings made in the lobby carry over into play.
pub(crate) struct SceneWorld {
    pub(crate) config: CoreConfig,
    pub(crate) registry: InputSourceRegistry,
    pub(crate) devices: DeviceBank,
    pub(crate) arena: Arena,
    pub(crate) save_path: Option<PathBuf>,
    pub(crate) roster: Vec<SlotAssignment>,
    pub(crate) stats: RunStats,
}

impl SceneWorld {
    pub(crate) fn new(config: CoreConfig, arena: Arena, save_path: Option<PathBuf>) -> Self {
        let registry = InputSourceRegistry::new(config.input.navigate_threshold);
        Self {
            config,
            registry,
            devices: DeviceBank::default(),
            arena,
            save_path,
            roster: Vec::new(),
            stats: RunStats::default(),
        }
    }

    fn open_store(&self) -> Box<dyn CheckpointStore> {
        match &self.save_path {
            Some(path) => Box::new(JsonFileCheckpointStore::new(path.clone())),
            None => Box::new(MemoryCheckpointStore::default()),
        }
    }
}

pub(crate) trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand;
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

/// Join/select flow; hands the committed roster to the play scene.
pub(crate) struct LobbyScene {
    coordinator: Option<JoinCoordinator>,
}

impl LobbyScene {
    pub(crate) fn new() -> Self {
        Self { coordinator: None }
    }
}

impl Scene for LobbyScene {
    fn load(&mut self, world: &mut SceneWorld) {
        let mut coordinator = JoinCoordinator::from_config(&world.config);
        // Slots from the previous session are not known to the fresh coordinator. A slot
        // picked up again mid-session may be held by a different source than the roster's.
        for assignment in world.roster.drain(..) {
            if let Some(source) = world.registry.source_for_slot(assignment.slot) {
                world.registry.unbind(source);
            }
        }
        coordinator.reset(&mut world.registry);
        self.coordinator = Some(coordinator);
        info!(scene = "lobby", "scene_loaded");
    }

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
        let Some(coordinator) = self.coordinator.as_mut() else {
            return SceneCommand::None;
        };
        coordinator.process_input(&mut world.registry);
        match coordinator.tick(fixed_dt_seconds, &world.registry) {
            LobbyTick::Start(roster) => {
                world.roster = roster;
                SceneCommand::HardResetTo(SceneKey::Play)
            }
            LobbyTick::Idle | LobbyTick::CountingDown { .. } | LobbyTick::CountdownCancelled => {
                SceneCommand::None
            }
        }
    }

    fn unload(&mut self, _world: &mut SceneWorld) {
        self.coordinator = None;
        info!(scene = "lobby", "scene_unloaded");
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        let coordinator = self.coordinator.as_ref()?;
        Some(format!(
            "Lobby | joined={} | countdown={}",
            coordinator.joined_count(),
            coordinator
                .countdown_remaining()
                .map(|seconds| format!("{seconds:.1}s"))
                .unwrap_or_else(|| "-".to_string())
        ))
    }
}

/// One play session over the arena; returns to the lobby a moment after game over.
pub(crate) struct PlayScene {
    session: Option<PlaySession>,
    linger: Countdown,
}

impl PlayScene {
    pub(crate) fn new() -> Self {
        Self {
            session: None,
            linger: Countdown::new(GAME_OVER_LINGER_SECONDS),
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> Option<&PlaySession> {
        self.session.as_ref()
    }
}

impl Scene for PlayScene {
    fn load(&mut self, world: &mut SceneWorld) {
        world.arena.reset();
        self.linger.reset();
        let checkpoints = match world.arena.checkpoint_registry() {
            Ok(checkpoints) => checkpoints,
            Err(err) => {
                error!(error = %err, "arena_checkpoints_invalid");
                world.stats.sessions_refused += 1;
                return;
            }
        };
        match PlaySession::start(
            world.config.clone(),
            &world.roster,
            &world.registry,
            checkpoints,
            world.open_store(),
        ) {
            Ok(session) => {
                world.stats.sessions_started += 1;
                self.session = Some(session);
            }
            Err(err) => {
                error!(error = %err, "play_session_refused");
                world.stats.sessions_refused += 1;
            }
        }
        info!(scene = "play", "scene_loaded");
    }

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
        let Some(session) = self.session.as_mut() else {
            return SceneCommand::HardResetTo(SceneKey::Lobby);
        };
        for released in world.registry.take_released() {
            warn!(slot = %released.slot, source = %released.source, "source_lost_mid_session");
        }
        for slot in session.rejoin_departed(&mut world.registry) {
            info!(slot = %slot, "departed_slot_reclaimed");
        }

        let was_over = session.is_game_over();
        session.tick(fixed_dt_seconds, &world.registry, &world.arena);
        let effects = session.drain_effects();
        world.arena.apply_effects(&effects);
        world.arena.step_projectiles(fixed_dt_seconds);
        for fact in world.arena.collisions(session.players()) {
            session.push_collision(fact);
        }

        if session.tick_count() % HUD_LOG_INTERVAL_TICKS == 0 {
            for hud in session.hud_all() {
                debug!(
                    slot = %hud.slot,
                    health = hud.health,
                    max_health = hud.max_health,
                    dead = hud.dead,
                    deaths = hud.deaths,
                    guard_health = ?hud.guard_health,
                    "player_hud"
                );
            }
        }

        if !session.is_game_over() {
            return SceneCommand::None;
        }
        if !was_over {
            world.stats.games_over += 1;
            self.linger.start();
        }
        match self.linger.tick(fixed_dt_seconds) {
            CountdownTick::Fired => SceneCommand::HardResetTo(SceneKey::Lobby),
            CountdownTick::Pending | CountdownTick::Inactive => SceneCommand::None,
        }
    }

    fn unload(&mut self, _world: &mut SceneWorld) {
        if let Some(session) = self.session.take() {
            info!(
                ticks = session.tick_count(),
                shared_deaths = session.shared_deaths(),
                game_over = session.is_game_over(),
                "play_session_ended"
            );
        }
        info!(scene = "play", "scene_unloaded");
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        let session = self.session.as_ref()?;
        Some(format!(
            "Play | tick={} | deaths={} | checkpoint={}",
            session.tick_count(),
            session.shared_deaths(),
            session
                .active_checkpoint()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        ))
    }
}

struct SceneRuntime {
    scene: Box<dyn Scene>,
    is_loaded: bool,
}

pub(crate) struct SceneMachine {
    lobby: SceneRuntime,
    play: SceneRuntime,
    active_scene: SceneKey,
    world: SceneWorld,
}

impl SceneMachine {
    pub(crate) fn new(
        lobby: Box<dyn Scene>,
        play: Box<dyn Scene>,
        active_scene: SceneKey,
        world: SceneWorld,
    ) -> Self {
        Self {
            lobby: SceneRuntime {
                scene: lobby,
                is_loaded: false,
            },
            play: SceneRuntime {
                scene: play,
                is_loaded: false,
            },
            active_scene,
            world,
        }
    }

    pub(crate) fn active_scene(&self) -> SceneKey {
        self.active_scene
    }

    pub(crate) fn world(&self) -> &SceneWorld {
        &self.world
    }

    pub(crate) fn world_mut(&mut self) -> &mut SceneWorld {
        &mut self.world
    }

    pub(crate) fn load_active(&mut self) {
        self.load_scene_if_needed(self.active_scene);
    }

    pub(crate) fn update_active(&mut self, fixed_dt_seconds: f32) -> SceneCommand {
        let (runtime, world) = match self.active_scene {
            SceneKey::Lobby => (&mut self.lobby, &mut self.world),
            SceneKey::Play => (&mut self.play, &mut self.world),
        };
        runtime.scene.update(fixed_dt_seconds, world)
    }

    pub(crate) fn debug_title_active(&self) -> Option<String> {
        self.runtime_ref(self.active_scene)
            .scene
            .debug_title(&self.world)
    }

    /// Returns true when the active scene changed.
    pub(crate) fn apply(&mut self, command: SceneCommand) -> bool {
        match command {
            SceneCommand::None => false,
            SceneCommand::HardResetTo(next) => self.hard_reset_to(next),
        }
    }

    /// Unloads the outgoing scene and reloads the target from scratch.
    pub(crate) fn hard_reset_to(&mut self, next_scene: SceneKey) -> bool {
        let previous = self.active_scene;
        if previous != next_scene {
            self.unload_scene(previous);
        }
        self.unload_scene(next_scene);
        self.load_scene_if_needed(next_scene);
        self.active_scene = next_scene;
        previous != next_scene
    }

    pub(crate) fn shutdown_all(&mut self) {
        self.unload_scene(SceneKey::Lobby);
        self.unload_scene(SceneKey::Play);
    }

    fn load_scene_if_needed(&mut self, key: SceneKey) {
        let (runtime, world) = self.split_mut(key);
        if runtime.is_loaded {
            return;
        }
        runtime.scene.load(world);
        runtime.is_loaded = true;
    }

    fn unload_scene(&mut self, key: SceneKey) {
        let (runtime, world) = self.split_mut(key);
        if !runtime.is_loaded {
            return;
        }
        runtime.scene.unload(world);
        runtime.is_loaded = false;
    }

    fn split_mut(&mut self, key: SceneKey) -> (&mut SceneRuntime, &mut SceneWorld) {
        match key {
            SceneKey::Lobby => (&mut self.lobby, &mut self.world),
            SceneKey::Play => (&mut self.play, &mut self.world),
        }
    }

    fn runtime_ref(&self, key: SceneKey) -> &SceneRuntime {
        match key {
            SceneKey::Lobby => &self.lobby,
            SceneKey::Play => &self.play,
        }
    }
}
