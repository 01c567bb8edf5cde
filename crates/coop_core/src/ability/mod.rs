mod dash;
mod guard;

pub use dash::DashState;
pub use guard::{GuardBlock, GuardEnded, GuardEntity, GuardRoster};

use tracing::debug;

use crate::clock::{AbilityClock, AbilityKind, Countdown};
use crate::config::{ArchetypeTuning, CoreConfig};
use crate::events::{CoreEvent, CoreEventBus, EffectQueue, EffectRequest, PhysicsQuery};
use crate::ids::{EntityId, EntityIdAllocator, ExternalId, SlotId, SourceId};
use crate::input::{InputAction, SourceFrame};
use crate::lobby::{Archetype, SlotAssignment};
use crate::math::Vec2;

#[derive(Debug, Clone, PartialEq)]
pub enum AbilityState {
    Locomotion { grounded: bool },
    Dashing(DashState),
}

impl AbilityState {
    pub fn is_dashing(&self) -> bool {
        matches!(self, AbilityState::Dashing(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingHit {
    Contact { amount: u32 },
    Projectile { projectile: ExternalId, amount: u32 },
}

impl IncomingHit {
    pub fn amount(self) -> u32 {
        match self {
            IncomingHit::Contact { amount } | IncomingHit::Projectile { amount, .. } => amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Invulnerable,
    Dashing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitOutcome {
    IgnoredDead,
    Discarded(DiscardReason),
    Blocked(GuardBlock),
    Damaged { remaining_health: u32 },
    Killed,
}

/// Everything a player's per-tick ability update may touch besides the player itself.
pub struct AbilityContext<'a> {
    pub dt_seconds: f32,
    pub config: &'a CoreConfig,
    pub physics: &'a dyn PhysicsQuery,
    pub guards: &'a mut GuardRoster,
    pub entity_ids: &'a mut EntityIdAllocator,
    pub events: &'a mut CoreEventBus,
    pub effects: &'a mut EffectQueue,
}

/// Aim falls back to movement, then to the default facing, when inside the dead-zone.
pub fn resolve_aim(aim: Vec2, movement: Vec2, deadzone: f32) -> Vec2 {
    aim.try_normalized(deadzone)
        .or_else(|| movement.try_normalized(deadzone))
        .unwrap_or(Vec2::RIGHT)
}

/// In-simulation actor for a started slot. Reads input from exactly one source, chosen
/// when the slot was promoted.
#[derive(Debug, Clone)]
pub struct PlayerEntity {
    id: EntityId,
    slot: SlotId,
    source: SourceId,
    archetype: Archetype,
    tuning: ArchetypeTuning,
    position: Vec2,
    facing: Vec2,
    velocity: Vec2,
    health: u32,
    invulnerability: Countdown,
    state: AbilityState,
    clock: AbilityClock,
    guard: Option<EntityId>,
    life: LifeState,
    /// Set while the current step ran in `Dashing`, so contacts resolved later in the
    /// same tick still see the dash even if it ended during that step.
    dashed_this_step: bool,
}

impl PlayerEntity {
    pub fn spawn(
        id: EntityId,
        assignment: SlotAssignment,
        config: &CoreConfig,
        position: Vec2,
    ) -> Self {
        let tuning = *config.archetypes.for_archetype(assignment.archetype);
        Self {
            id,
            slot: assignment.slot,
            source: assignment.source,
            archetype: assignment.archetype,
            tuning,
            position,
            facing: Vec2::RIGHT,
            velocity: Vec2::ZERO,
            health: tuning.max_health,
            invulnerability: Countdown::new(0.0),
            state: AbilityState::Locomotion { grounded: true },
            clock: AbilityClock::new(
                tuning.primary_cooldown_seconds,
                config.guard.cooldown_seconds,
                config.dash.cooldown_seconds,
            ),
            guard: None,
            life: LifeState::Alive,
            dashed_this_step: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Position correction from the physics collaborator.
    pub fn sync_position(&mut self, position: Vec2) {
        if position.is_finite() {
            self.position = position;
        }
    }

    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.tuning.max_health
    }

    pub fn state(&self) -> &AbilityState {
        &self.state
    }

    pub fn clock(&self) -> &AbilityClock {
        &self.clock
    }

    pub fn guard(&self) -> Option<EntityId> {
        self.guard
    }

    pub fn is_alive(&self) -> bool {
        self.life == LifeState::Alive
    }

    pub fn life(&self) -> LifeState {
        self.life
    }

    pub fn is_invulnerable(&self) -> bool {
        self.invulnerability.is_running() && self.invulnerability.remaining_seconds() > 0.0
    }

    pub fn invulnerable_remaining(&self) -> f32 {
        if self.is_invulnerable() {
            self.invulnerability.remaining_seconds()
        } else {
            0.0
        }
    }

    /// Contact damage is ignored for the whole dash, including the step it ends on.
    pub fn is_contact_immune(&self) -> bool {
        self.state.is_dashing() || self.dashed_this_step
    }

    pub fn grant_invulnerability(&mut self, seconds: f32) {
        self.invulnerability = Countdown::started(seconds);
    }

    /// Timers keep running while dead; input does not.
    pub fn advance_timers(&mut self, dt_seconds: f32) {
        self.dashed_this_step = false;
        self.clock.tick(dt_seconds);
        self.invulnerability.tick(dt_seconds);
    }

    /// One simulation step of input-driven behavior. Dead players are frozen.
    pub fn step(&mut self, frame: &SourceFrame, ctx: &mut AbilityContext<'_>) {
        if !self.is_alive() {
            return;
        }
        self.facing = resolve_aim(frame.aim, frame.movement, ctx.config.input.aim_deadzone);

        if frame.pressed(InputAction::Dash)
            && !self.state.is_dashing()
            && self.clock.is_ready(AbilityKind::Dash)
        {
            self.state = AbilityState::Dashing(DashState::new(
                self.facing,
                ctx.config.dash.duration_seconds,
            ));
            self.clock.start(AbilityKind::Dash);
            ctx.events.emit(CoreEvent::AbilityUsed {
                slot: self.slot,
                ability: AbilityKind::Dash,
            });
        }

        if !self.state.is_dashing() {
            if frame.pressed(InputAction::Primary) && self.clock.is_ready(AbilityKind::Primary) {
                self.primary_attack(ctx);
            }
            if frame.pressed(InputAction::Guard) {
                self.try_spawn_guard(ctx);
            }
        }

        self.move_and_sample(frame, ctx);

        if let Some(guard) = self.guard {
            if let Some(position) = ctx.guards.follow(guard, self.position) {
                ctx.effects
                    .enqueue(EffectRequest::MoveGuard { guard, position });
            }
        }
    }

    fn primary_attack(&mut self, ctx: &mut AbilityContext<'_>) {
        let request = match self.archetype {
            Archetype::Ranged => EffectRequest::SpawnProjectile {
                owner: self.id,
                origin: self.position,
                direction: self.facing,
                speed: self.tuning.projectile_speed,
                damage: self.tuning.primary_damage,
            },
            Archetype::Melee => EffectRequest::MeleeStrike {
                owner: self.id,
                origin: self.position,
                direction: self.facing,
                reach: self.tuning.melee_reach,
                damage: self.tuning.primary_damage,
            },
        };
        ctx.effects.enqueue(request);
        self.clock.start(AbilityKind::Primary);
        ctx.events.emit(CoreEvent::AbilityUsed {
            slot: self.slot,
            ability: AbilityKind::Primary,
        });
    }

    fn try_spawn_guard(&mut self, ctx: &mut AbilityContext<'_>) {
        if self.guard.is_some()
            || !self.clock.is_ready(AbilityKind::Guard)
            || ctx.guards.owned_by(self.id).is_some()
        {
            return;
        }
        let guard_id = ctx.entity_ids.allocate();
        let position = ctx
            .guards
            .spawn(guard_id, self.id, self.slot, self.position, &ctx.config.guard)
            .position;
        self.guard = Some(guard_id);
        ctx.effects.enqueue(EffectRequest::SpawnGuard {
            owner: self.id,
            guard: guard_id,
            position,
        });
        ctx.events.emit(CoreEvent::AbilityUsed {
            slot: self.slot,
            ability: AbilityKind::Guard,
        });
        ctx.events.emit(CoreEvent::GuardSpawned {
            slot: self.slot,
            guard: guard_id,
        });
    }

    fn move_and_sample(&mut self, frame: &SourceFrame, ctx: &mut AbilityContext<'_>) {
        let dt = ctx.dt_seconds;
        let mut finished_dash = false;
        match &mut self.state {
            AbilityState::Dashing(dash) => {
                self.dashed_this_step = true;
                self.velocity = dash.direction() * ctx.config.dash.speed;
                let candidate = self.position + self.velocity * dt;
                if ctx.physics.is_walkable(candidate) {
                    self.position = candidate;
                }
                let overlapping = ctx
                    .physics
                    .hostiles_within(self.position, ctx.config.dash.hit_radius);
                for target in dash.register_hits(&overlapping) {
                    ctx.effects.enqueue(EffectRequest::DamageHostile {
                        target,
                        amount: ctx.config.dash.damage,
                        attacker: self.id,
                    });
                    ctx.events.emit(CoreEvent::DashHit {
                        slot: self.slot,
                        target,
                    });
                }
                finished_dash = dash.advance(dt);
            }
            AbilityState::Locomotion { grounded } => {
                self.velocity = frame.movement * self.tuning.move_speed;
                *grounded = ctx.physics.is_grounded(self.id);
                let candidate = self.position + self.velocity * dt;
                if ctx.physics.is_walkable(candidate) {
                    self.position = candidate;
                }
            }
        }
        if finished_dash {
            self.state = AbilityState::Locomotion {
                grounded: ctx.physics.is_grounded(self.id),
            };
        }
        ctx.effects.enqueue(EffectRequest::SetVelocity {
            entity: self.id,
            velocity: self.velocity,
        });
    }

    /// Damage from an external collision aimed at this player.
    pub fn apply_hit(&mut self, hit: IncomingHit, ctx: &mut AbilityContext<'_>) -> HitOutcome {
        if !self.is_alive() {
            return HitOutcome::IgnoredDead;
        }
        if self.is_invulnerable() {
            return HitOutcome::Discarded(DiscardReason::Invulnerable);
        }
        if matches!(hit, IncomingHit::Contact { .. }) && self.is_contact_immune() {
            return HitOutcome::Discarded(DiscardReason::Dashing);
        }

        if let Some(guard) = self.guard {
            if let Some((block, ended)) = ctx.guards.absorb(guard, hit.amount()) {
                if let IncomingHit::Projectile { projectile, .. } = hit {
                    ctx.effects
                        .enqueue(EffectRequest::DespawnProjectile { projectile });
                }
                ctx.events.emit(CoreEvent::GuardBlocked {
                    slot: self.slot,
                    guard,
                    self_damage: block.self_damage,
                    remaining_health: block.remaining_health,
                });
                if let Some(ended) = ended {
                    self.finish_guard(ended, ctx);
                }
                return HitOutcome::Blocked(block);
            }
        }

        let amount = hit.amount();
        self.health = self.health.saturating_sub(amount);
        ctx.effects.enqueue(EffectRequest::SpawnHitEffect {
            position: self.position,
        });
        if let IncomingHit::Projectile { projectile, .. } = hit {
            ctx.effects
                .enqueue(EffectRequest::DespawnProjectile { projectile });
        }
        ctx.events.emit(CoreEvent::PlayerDamaged {
            slot: self.slot,
            amount,
            remaining_health: self.health,
        });

        if self.health == 0 {
            self.die(ctx);
            return HitOutcome::Killed;
        }
        self.grant_invulnerability(ctx.config.invulnerability.after_hit_seconds);
        HitOutcome::Damaged {
            remaining_health: self.health,
        }
    }

    fn die(&mut self, ctx: &mut AbilityContext<'_>) {
        self.life = LifeState::Dead;
        self.velocity = Vec2::ZERO;
        self.state = AbilityState::Locomotion { grounded: true };
        self.invulnerability.reset();
        ctx.effects.enqueue(EffectRequest::SetVelocity {
            entity: self.id,
            velocity: Vec2::ZERO,
        });
        if let Some(ended) = ctx.guards.remove_owned_by(self.id) {
            self.finish_guard(ended, ctx);
        }
        debug!(slot = %self.slot, entity = %self.id, "player_frozen");
    }

    /// Stops the player where it stands and drops its guard. Health and life state are
    /// kept so the slot can be picked up again.
    pub fn depart(&mut self, ctx: &mut AbilityContext<'_>) {
        self.velocity = Vec2::ZERO;
        self.state = AbilityState::Locomotion { grounded: true };
        self.dashed_this_step = false;
        ctx.effects.enqueue(EffectRequest::SetVelocity {
            entity: self.id,
            velocity: Vec2::ZERO,
        });
        if let Some(ended) = ctx.guards.remove_owned_by(self.id) {
            self.finish_guard(ended, ctx);
        }
    }

    pub fn rebind_source(&mut self, source: SourceId) {
        self.source = source;
    }

    /// Owner side of guard removal: the guard cooldown starts here and nowhere else.
    pub fn finish_guard(&mut self, ended: GuardEnded, ctx: &mut AbilityContext<'_>) {
        if self.guard != Some(ended.guard) {
            return;
        }
        self.guard = None;
        self.clock.start(AbilityKind::Guard);
        ctx.effects
            .enqueue(EffectRequest::DespawnGuard { guard: ended.guard });
        ctx.events.emit(CoreEvent::GuardDestroyed {
            slot: self.slot,
            guard: ended.guard,
            cause: ended.cause,
        });
    }

    /// Heals up to max health; returns the amount actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.is_alive() {
            return 0;
        }
        let before = self.health;
        self.health = self
            .health
            .saturating_add(amount)
            .min(self.tuning.max_health);
        self.health - before
    }

    pub fn respawn(&mut self, position: Vec2, invulnerable_seconds: f32) {
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.health = self.tuning.max_health;
        self.state = AbilityState::Locomotion { grounded: true };
        self.dashed_this_step = false;
        self.life = LifeState::Alive;
        self.grant_invulnerability(invulnerable_seconds);
    }
}
