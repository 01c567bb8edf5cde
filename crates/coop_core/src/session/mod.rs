use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ability::{AbilityContext, GuardRoster, HitOutcome, IncomingHit, PlayerEntity};
use crate::checkpoint::{Activation, CheckpointRegistry};
use crate::clock::AbilityKind;
use crate::config::{ConfigError, CoreConfig, OutcomePolicy};
use crate::events::{
    CollisionCategory, CollisionFact, CoreEvent, CoreEventBus, EffectQueue, EffectRequest,
    PhysicsQuery,
};
use crate::ids::{CheckpointId, EntityId, EntityIdAllocator, SlotId, SourceId};
use crate::input::{InputAction, InputSourceRegistry, SourceFrame};
use crate::lobby::{Archetype, SlotAssignment};
use crate::math::Vec2;
use crate::outcome::{DeathVerdict, SessionOutcome};
use crate::persistence::CheckpointStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemId {
    InputSampling,
    Abilities,
    DamageResolution,
    Outcome,
    Respawn,
    Cleanup,
}

impl SystemId {
    pub fn name(self) -> &'static str {
        match self {
            Self::InputSampling => "InputSampling",
            Self::Abilities => "Abilities",
            Self::DamageResolution => "DamageResolution",
            Self::Outcome => "Outcome",
            Self::Respawn => "Respawn",
            Self::Cleanup => "Cleanup",
        }
    }
}

pub const SYSTEM_ORDER: [SystemId; 6] = [
    SystemId::InputSampling,
    SystemId::Abilities,
    SystemId::DamageResolution,
    SystemId::Outcome,
    SystemId::Respawn,
    SystemId::Cleanup,
];

pub const SYSTEM_ORDER_TEXT: &str =
    "InputSampling>Abilities>DamageResolution>Outcome>Respawn>Cleanup";

#[derive(Debug, Error)]
pub enum SessionStartError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot start a session with no players")]
    EmptyRoster,
    #[error("{0} appears more than once in the roster")]
    DuplicateSlot(SlotId),
    #[error("{slot} was assigned {source_id}, which no longer holds that slot")]
    SourceNotBound { slot: SlotId, source_id: SourceId },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownView {
    pub ability: AbilityKind,
    pub remaining_seconds: f32,
    pub fraction_remaining: f32,
    pub ready: bool,
}

/// Read-only per-slot snapshot for the HUD.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHud {
    pub slot: SlotId,
    pub archetype: Archetype,
    pub health: u32,
    pub max_health: u32,
    pub invulnerable: bool,
    pub dead: bool,
    pub departed: bool,
    pub dashing: bool,
    pub deaths: u32,
    pub cooldowns: [CooldownView; 3],
    pub guard_health: Option<u32>,
    pub respawn_remaining_seconds: Option<f32>,
}

/// Mutable tables shared by every player's ability update within a tick.
#[derive(Debug, Default)]
struct SessionWorld {
    guards: GuardRoster,
    entity_ids: EntityIdAllocator,
    events: CoreEventBus,
    effects: EffectQueue,
}

impl SessionWorld {
    fn ability_ctx<'a>(
        &'a mut self,
        config: &'a CoreConfig,
        physics: &'a dyn PhysicsQuery,
        dt_seconds: f32,
    ) -> AbilityContext<'a> {
        AbilityContext {
            dt_seconds,
            config,
            physics,
            guards: &mut self.guards,
            entity_ids: &mut self.entity_ids,
            events: &mut self.events,
            effects: &mut self.effects,
        }
    }
}

/// One started play session. Constructed from the lobby roster and torn down on
/// return to the menu; only the persisted checkpoint id outlives it.
pub struct PlaySession {
    config: CoreConfig,
    players: Vec<PlayerEntity>,
    world: SessionWorld,
    checkpoints: CheckpointRegistry,
    outcome: SessionOutcome,
    store: Box<dyn CheckpointStore>,
    frames: BTreeMap<SlotId, SourceFrame>,
    departed: BTreeSet<SlotId>,
    pending_collisions: Vec<CollisionFact>,
    deaths_this_tick: Vec<SlotId>,
    respawns_this_tick: Vec<SlotId>,
    last_tick_order: Vec<SystemId>,
    tick_count: u64,
}

impl PlaySession {
    pub fn start(
        config: CoreConfig,
        roster: &[SlotAssignment],
        registry: &InputSourceRegistry,
        mut checkpoints: CheckpointRegistry,
        store: Box<dyn CheckpointStore>,
    ) -> Result<Self, SessionStartError> {
        let policy = config.validate()?;
        if roster.is_empty() {
            return Err(SessionStartError::EmptyRoster);
        }
        let mut seen = Vec::with_capacity(roster.len());
        for assignment in roster {
            if seen.contains(&assignment.slot) {
                return Err(SessionStartError::DuplicateSlot(assignment.slot));
            }
            seen.push(assignment.slot);
            if registry.owner_of(assignment.source) != Some(assignment.slot) {
                return Err(SessionStartError::SourceNotBound {
                    slot: assignment.slot,
                    source_id: assignment.source,
                });
            }
        }

        restore_checkpoint(&mut checkpoints, store.as_ref());

        let mut world = SessionWorld::default();
        let mut players = roster
            .iter()
            .map(|assignment| {
                let position = checkpoints.spawn_position(assignment.slot);
                PlayerEntity::spawn(world.entity_ids.allocate(), *assignment, &config, position)
            })
            .collect::<Vec<_>>();
        players.sort_by_key(PlayerEntity::slot);

        let outcome = SessionOutcome::new(policy, config.outcome.respawn_delay_seconds);
        info!(
            players = players.len(),
            policy = ?policy,
            checkpoint = ?checkpoints.active_id().map(|id| id.0),
            "play_session_started"
        );

        Ok(Self {
            config,
            players,
            world,
            checkpoints,
            outcome,
            store,
            frames: BTreeMap::new(),
            departed: BTreeSet::new(),
            pending_collisions: Vec::new(),
            deaths_this_tick: Vec::new(),
            respawns_this_tick: Vec::new(),
            last_tick_order: Vec::new(),
            tick_count: 0,
        })
    }

    /// Collision facts are resolved during the next tick's damage pass.
    pub fn push_collision(&mut self, fact: CollisionFact) {
        self.pending_collisions.push(fact);
    }

    pub fn sync_position(&mut self, entity: EntityId, position: Vec2) {
        if let Some(player) = self.players.iter_mut().find(|player| player.id() == entity) {
            player.sync_position(position);
        }
    }

    /// Advances the simulation by one fixed step. Reads this tick's input edges from
    /// `registry`; the caller rolls the registry frame over afterwards.
    pub fn tick(
        &mut self,
        dt_seconds: f32,
        registry: &InputSourceRegistry,
        physics: &dyn PhysicsQuery,
    ) {
        self.last_tick_order.clear();
        for system in SYSTEM_ORDER {
            self.last_tick_order.push(system);
            match system {
                SystemId::InputSampling => self.sample_input(registry, physics),
                SystemId::Abilities => self.run_abilities(dt_seconds, physics),
                SystemId::DamageResolution => self.resolve_collisions(physics),
                SystemId::Outcome => self.run_outcome(dt_seconds),
                SystemId::Respawn => self.run_respawns(physics),
                SystemId::Cleanup => self.cleanup(),
            }
        }
    }

    /// Binds free sources pressing Confirm to departed slots, lowest slot first. The
    /// player picks the new source up on the next tick's input sampling.
    pub fn rejoin_departed(&self, registry: &mut InputSourceRegistry) -> Vec<SlotId> {
        let mut open = self
            .departed
            .iter()
            .copied()
            .filter(|slot| registry.source_for_slot(*slot).is_none())
            .collect::<Vec<_>>()
            .into_iter();
        let mut rebound = Vec::new();
        for source in registry.free_sources() {
            let confirming = registry
                .frame(source)
                .is_some_and(|frame| frame.pressed(InputAction::Confirm));
            if !confirming {
                continue;
            }
            let Some(slot) = open.next() else {
                break;
            };
            match registry.bind(source, slot) {
                Ok(()) => rebound.push(slot),
                Err(error) => warn!(slot = %slot, error = %error, "rejoin_bind_failed"),
            }
        }
        rebound
    }

    /// A player whose source no longer holds its slot has left: it is frozen in place,
    /// ignored by damage resolution and the outcome rules. A source bound to the slot
    /// later brings the player back.
    fn sample_input(&mut self, registry: &InputSourceRegistry, physics: &dyn PhysicsQuery) {
        self.frames.clear();
        for player in &mut self.players {
            let slot = player.slot();
            let holds_slot = registry.owner_of(player.source()) == Some(slot);
            if self.departed.contains(&slot) {
                let Some(source) = registry.source_for_slot(slot) else {
                    continue;
                };
                player.rebind_source(source);
                self.departed.remove(&slot);
                self.world.events.emit(CoreEvent::PlayerRejoined { slot });
                info!(slot = %slot, source = %source, "player_rejoined");
            } else if !holds_slot {
                let mut ctx = self.world.ability_ctx(&self.config, physics, 0.0);
                player.depart(&mut ctx);
                self.departed.insert(slot);
                self.world.events.emit(CoreEvent::PlayerDeparted { slot });
                info!(slot = %slot, source = %player.source(), "player_departed");
                continue;
            }
            let frame = registry.frame(player.source()).unwrap_or_default();
            self.frames.insert(slot, frame);
        }
    }

    fn run_abilities(&mut self, dt_seconds: f32, physics: &dyn PhysicsQuery) {
        for player in &mut self.players {
            player.advance_timers(dt_seconds);
            if self.departed.contains(&player.slot()) {
                continue;
            }
            let frame = self.frames.get(&player.slot()).copied().unwrap_or_default();
            let mut ctx = self.world.ability_ctx(&self.config, physics, dt_seconds);
            player.step(&frame, &mut ctx);
        }

        for ended in self.world.guards.tick(dt_seconds) {
            if let Some(owner) = self.players.iter_mut().find(|player| player.id() == ended.owner) {
                let mut ctx = self.world.ability_ctx(&self.config, physics, dt_seconds);
                owner.finish_guard(ended, &mut ctx);
            }
        }
    }

    fn resolve_collisions(&mut self, physics: &dyn PhysicsQuery) {
        let facts = std::mem::take(&mut self.pending_collisions);
        for fact in facts {
            if self.world.guards.contains(fact.subject) {
                self.resolve_guard_collision(fact, physics);
                continue;
            }
            let Some(index) = self
                .players
                .iter()
                .position(|player| player.id() == fact.subject)
            else {
                debug!(subject = %fact.subject, "collision_subject_unknown");
                continue;
            };
            if self.departed.contains(&self.players[index].slot()) {
                continue;
            }
            match fact.category {
                CollisionCategory::Hostile { contact_damage } => {
                    let hit = IncomingHit::Contact {
                        amount: contact_damage,
                    };
                    self.hit_player(index, hit, physics);
                }
                CollisionCategory::HostileProjectile { damage } => {
                    let hit = IncomingHit::Projectile {
                        projectile: fact.other,
                        amount: damage,
                    };
                    self.hit_player(index, hit, physics);
                }
                CollisionCategory::CheckpointTrigger(checkpoint) => {
                    self.reach_checkpoint(index, checkpoint);
                }
                CollisionCategory::Pickup { heal } => {
                    let player = &mut self.players[index];
                    if !player.is_alive() {
                        continue;
                    }
                    let restored = player.heal(heal);
                    self.world
                        .effects
                        .enqueue(EffectRequest::ConsumePickup { pickup: fact.other });
                    self.world.events.emit(CoreEvent::PlayerHealed {
                        slot: player.slot(),
                        amount: restored,
                        health: player.health(),
                    });
                }
            }
        }
    }

    fn hit_player(&mut self, index: usize, hit: IncomingHit, physics: &dyn PhysicsQuery) {
        let player = &mut self.players[index];
        let mut ctx = self.world.ability_ctx(&self.config, physics, 0.0);
        if player.apply_hit(hit, &mut ctx) == HitOutcome::Killed {
            self.deaths_this_tick.push(player.slot());
        }
    }

    /// A hostile or projectile overlapping the guard itself.
    fn resolve_guard_collision(&mut self, fact: CollisionFact, physics: &dyn PhysicsQuery) {
        let (amount, projectile) = match fact.category {
            CollisionCategory::Hostile { contact_damage } => (contact_damage, None),
            CollisionCategory::HostileProjectile { damage } => (damage, Some(fact.other)),
            CollisionCategory::CheckpointTrigger(_) | CollisionCategory::Pickup { .. } => return,
        };
        let Some((block, ended)) = self.world.guards.absorb(fact.subject, amount) else {
            return;
        };
        if let Some(projectile) = projectile {
            self.world
                .effects
                .enqueue(EffectRequest::DespawnProjectile { projectile });
        }
        self.world.events.emit(CoreEvent::GuardBlocked {
            slot: block.owner_slot,
            guard: block.guard,
            self_damage: block.self_damage,
            remaining_health: block.remaining_health,
        });
        if let Some(ended) = ended {
            if let Some(owner) = self.players.iter_mut().find(|player| player.id() == ended.owner) {
                let mut ctx = self.world.ability_ctx(&self.config, physics, 0.0);
                owner.finish_guard(ended, &mut ctx);
            }
        }
    }

    fn reach_checkpoint(&mut self, index: usize, checkpoint: CheckpointId) {
        let player = &self.players[index];
        if !player.is_alive() {
            return;
        }
        let slot = player.slot();
        match self.checkpoints.activate(checkpoint) {
            Ok(Activation::Activated { .. }) => {
                if let Err(error) = self.store.persist_checkpoint(checkpoint) {
                    warn!(checkpoint = %checkpoint, error = %error, "checkpoint_persist_failed");
                }
                self.world.events.emit(CoreEvent::CheckpointActivated {
                    checkpoint,
                    by: slot,
                });
            }
            Ok(Activation::AlreadyActive) => {}
            Err(error) => {
                warn!(slot = %slot, error = %error, "checkpoint_trigger_unregistered");
            }
        }
    }

    fn run_outcome(&mut self, dt_seconds: f32) {
        let mut completed = self.outcome.tick(dt_seconds);
        for slot in std::mem::take(&mut self.deaths_this_tick) {
            let verdict = self.outcome.record_death(slot);
            self.world.events.emit(CoreEvent::PlayerDied {
                slot,
                deaths: self.outcome.deaths_of(slot),
            });
            match verdict {
                DeathVerdict::RespawnScheduled { delay_seconds } => {
                    self.world.events.emit(CoreEvent::RespawnScheduled {
                        slot,
                        delay_seconds,
                    });
                }
                DeathVerdict::GameOver => {
                    self.world.events.emit(CoreEvent::GameOver {
                        shared_deaths: self.outcome.shared_deaths(),
                    });
                }
                DeathVerdict::AfterGameOver => {}
            }
        }
        if self.outcome.is_game_over() {
            completed.clear();
        }
        self.respawns_this_tick = completed;
    }

    fn run_respawns(&mut self, physics: &dyn PhysicsQuery) {
        let invulnerable_seconds = self.config.invulnerability.after_respawn_seconds;
        for slot in std::mem::take(&mut self.respawns_this_tick) {
            let Some(player) = self.players.iter_mut().find(|player| player.slot() == slot) else {
                continue;
            };
            let position = self.checkpoints.spawn_position(slot);
            if !physics.is_walkable(position) {
                warn!(slot = %slot, x = position.x, y = position.y, "spawn_position_not_walkable");
            }
            player.respawn(position, invulnerable_seconds);
            self.world.effects.enqueue(EffectRequest::Teleport {
                entity: player.id(),
                position,
            });
            self.world
                .events
                .emit(CoreEvent::PlayerRespawned { slot, position });
            info!(slot = %slot, x = position.x, y = position.y, "player_respawned");
        }
    }

    fn cleanup(&mut self) {
        self.world.events.finish_tick_rollover();
        self.tick_count = self.tick_count.saturating_add(1);
    }

    pub fn drain_effects(&mut self) -> Vec<EffectRequest> {
        self.world.effects.drain_current_tick()
    }

    pub fn last_tick_events(&self) -> &[CoreEvent] {
        self.world.events.last_tick_events()
    }

    pub fn events(&self) -> &CoreEventBus {
        &self.world.events
    }

    pub fn last_tick_order(&self) -> &[SystemId] {
        &self.last_tick_order
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn policy(&self) -> OutcomePolicy {
        self.outcome.policy()
    }

    pub fn players(&self) -> &[PlayerEntity] {
        &self.players
    }

    pub fn player(&self, slot: SlotId) -> Option<&PlayerEntity> {
        self.players.iter().find(|player| player.slot() == slot)
    }

    pub fn guards(&self) -> &GuardRoster {
        &self.world.guards
    }

    pub fn outcome(&self) -> &SessionOutcome {
        &self.outcome
    }

    pub fn checkpoints(&self) -> &CheckpointRegistry {
        &self.checkpoints
    }

    pub fn active_checkpoint(&self) -> Option<CheckpointId> {
        self.checkpoints.active_id()
    }

    pub fn is_departed(&self, slot: SlotId) -> bool {
        self.departed.contains(&slot)
    }

    pub fn departed_slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.departed.iter().copied()
    }

    pub fn is_game_over(&self) -> bool {
        self.outcome.is_game_over()
    }

    pub fn deaths_of(&self, slot: SlotId) -> u32 {
        self.outcome.deaths_of(slot)
    }

    pub fn shared_deaths(&self) -> u32 {
        self.outcome.shared_deaths()
    }

    pub fn hud(&self, slot: SlotId) -> Option<PlayerHud> {
        let player = self.player(slot)?;
        let clock = player.clock();
        let cooldowns = AbilityKind::ALL.map(|ability| {
            let cooldown = clock.cooldown(ability);
            CooldownView {
                ability,
                remaining_seconds: cooldown.remaining_seconds(),
                fraction_remaining: cooldown.fraction_remaining(),
                ready: cooldown.is_ready(),
            }
        });
        Some(PlayerHud {
            slot,
            archetype: player.archetype(),
            health: player.health(),
            max_health: player.max_health(),
            invulnerable: player.is_invulnerable(),
            dead: !player.is_alive(),
            departed: self.departed.contains(&slot),
            dashing: player.state().is_dashing(),
            deaths: self.outcome.deaths_of(slot),
            cooldowns,
            guard_health: player
                .guard()
                .and_then(|guard| self.world.guards.get(guard))
                .map(|guard| guard.health()),
            respawn_remaining_seconds: self.outcome.respawn_remaining(slot),
        })
    }

    pub fn hud_all(&self) -> Vec<PlayerHud> {
        self.players
            .iter()
            .filter_map(|player| self.hud(player.slot()))
            .collect()
    }
}

fn restore_checkpoint(checkpoints: &mut CheckpointRegistry, store: &dyn CheckpointStore) {
    match store.last_checkpoint() {
        Ok(Some(id)) => match checkpoints.activate(id) {
            Ok(_) => info!(checkpoint = %id, "checkpoint_restored"),
            Err(error) => warn!(error = %error, "restored_checkpoint_unknown"),
        },
        Ok(None) => {}
        Err(error) => warn!(error = %error, "checkpoint_restore_failed"),
    }
}

#[cfg(test)]
mod tests;
