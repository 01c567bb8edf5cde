use crate::clock::AbilityKind;
use crate::ids::{CheckpointId, EntityId, ExternalId, SlotId};
use crate::math::Vec2;

/// Outbound notifications for the presentation side. Drained once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoreEvent {
    AbilityUsed {
        slot: SlotId,
        ability: AbilityKind,
    },
    GuardSpawned {
        slot: SlotId,
        guard: EntityId,
    },
    GuardBlocked {
        slot: SlotId,
        guard: EntityId,
        self_damage: u32,
        remaining_health: u32,
    },
    GuardDestroyed {
        slot: SlotId,
        guard: EntityId,
        cause: GuardEndCause,
    },
    DashHit {
        slot: SlotId,
        target: ExternalId,
    },
    PlayerDamaged {
        slot: SlotId,
        amount: u32,
        remaining_health: u32,
    },
    PlayerHealed {
        slot: SlotId,
        amount: u32,
        health: u32,
    },
    PlayerDied {
        slot: SlotId,
        deaths: u32,
    },
    RespawnScheduled {
        slot: SlotId,
        delay_seconds: f32,
    },
    PlayerRespawned {
        slot: SlotId,
        position: Vec2,
    },
    CheckpointActivated {
        checkpoint: CheckpointId,
        by: SlotId,
    },
    GameOver {
        shared_deaths: u32,
    },
    PlayerDeparted {
        slot: SlotId,
    },
    PlayerRejoined {
        slot: SlotId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEndCause {
    Depleted,
    Expired,
    OwnerRemoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreEventKind {
    AbilityUsed,
    GuardSpawned,
    GuardBlocked,
    GuardDestroyed,
    DashHit,
    PlayerDamaged,
    PlayerHealed,
    PlayerDied,
    RespawnScheduled,
    PlayerRespawned,
    CheckpointActivated,
    GameOver,
    PlayerDeparted,
    PlayerRejoined,
}

const EVENT_KIND_COUNT: usize = 14;

impl CoreEventKind {
    const fn index(self) -> usize {
        match self {
            Self::AbilityUsed => 0,
            Self::GuardSpawned => 1,
            Self::GuardBlocked => 2,
            Self::GuardDestroyed => 3,
            Self::DashHit => 4,
            Self::PlayerDamaged => 5,
            Self::PlayerHealed => 6,
            Self::PlayerDied => 7,
            Self::RespawnScheduled => 8,
            Self::PlayerRespawned => 9,
            Self::CheckpointActivated => 10,
            Self::GameOver => 11,
            Self::PlayerDeparted => 12,
            Self::PlayerRejoined => 13,
        }
    }
}

impl CoreEvent {
    pub fn kind(&self) -> CoreEventKind {
        match self {
            Self::AbilityUsed { .. } => CoreEventKind::AbilityUsed,
            Self::GuardSpawned { .. } => CoreEventKind::GuardSpawned,
            Self::GuardBlocked { .. } => CoreEventKind::GuardBlocked,
            Self::GuardDestroyed { .. } => CoreEventKind::GuardDestroyed,
            Self::DashHit { .. } => CoreEventKind::DashHit,
            Self::PlayerDamaged { .. } => CoreEventKind::PlayerDamaged,
            Self::PlayerHealed { .. } => CoreEventKind::PlayerHealed,
            Self::PlayerDied { .. } => CoreEventKind::PlayerDied,
            Self::RespawnScheduled { .. } => CoreEventKind::RespawnScheduled,
            Self::PlayerRespawned { .. } => CoreEventKind::PlayerRespawned,
            Self::CheckpointActivated { .. } => CoreEventKind::CheckpointActivated,
            Self::GameOver { .. } => CoreEventKind::GameOver,
            Self::PlayerDeparted { .. } => CoreEventKind::PlayerDeparted,
            Self::PlayerRejoined { .. } => CoreEventKind::PlayerRejoined,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreEventCounts {
    total: u32,
    by_kind: [u32; EVENT_KIND_COUNT],
}

impl CoreEventCounts {
    fn record(&mut self, kind: CoreEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = &mut self.by_kind[kind.index()];
        *slot = slot.saturating_add(1);
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn count(&self, kind: CoreEventKind) -> u32 {
        self.by_kind[kind.index()]
    }
}

#[derive(Debug, Default)]
pub struct CoreEventBus {
    current_tick_events: Vec<CoreEvent>,
    last_tick_events: Vec<CoreEvent>,
    last_tick_counts: CoreEventCounts,
}

impl CoreEventBus {
    pub fn emit(&mut self, event: CoreEvent) {
        self.current_tick_events.push(event);
    }

    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &CoreEvent> {
        self.current_tick_events.iter()
    }

    /// Moves this tick's events into the readable "last tick" buffer.
    pub fn finish_tick_rollover(&mut self) {
        let mut counts = CoreEventCounts::default();
        for event in &self.current_tick_events {
            counts.record(event.kind());
        }
        self.last_tick_counts = counts;
        self.last_tick_events = std::mem::take(&mut self.current_tick_events);
    }

    pub fn last_tick_events(&self) -> &[CoreEvent] {
        &self.last_tick_events
    }

    pub fn last_tick_counts(&self) -> CoreEventCounts {
        self.last_tick_counts
    }
}

/// Requests pushed out to the physics/animation collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectRequest {
    SetVelocity {
        entity: EntityId,
        velocity: Vec2,
    },
    SpawnProjectile {
        owner: EntityId,
        origin: Vec2,
        direction: Vec2,
        speed: f32,
        damage: u32,
    },
    MeleeStrike {
        owner: EntityId,
        origin: Vec2,
        direction: Vec2,
        reach: f32,
        damage: u32,
    },
    SpawnGuard {
        owner: EntityId,
        guard: EntityId,
        position: Vec2,
    },
    MoveGuard {
        guard: EntityId,
        position: Vec2,
    },
    DespawnGuard {
        guard: EntityId,
    },
    DespawnProjectile {
        projectile: ExternalId,
    },
    DamageHostile {
        target: ExternalId,
        amount: u32,
        attacker: EntityId,
    },
    SpawnHitEffect {
        position: Vec2,
    },
    Teleport {
        entity: EntityId,
        position: Vec2,
    },
    ConsumePickup {
        pickup: ExternalId,
    },
}

#[derive(Debug, Default)]
pub struct EffectQueue {
    requests: Vec<EffectRequest>,
}

impl EffectQueue {
    pub fn enqueue(&mut self, request: EffectRequest) {
        self.requests.push(request);
    }

    pub fn pending(&self) -> &[EffectRequest] {
        &self.requests
    }

    pub fn drain_current_tick(&mut self) -> Vec<EffectRequest> {
        std::mem::take(&mut self.requests)
    }
}

/// What an external collision reported against a core entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionCategory {
    Hostile { contact_damage: u32 },
    HostileProjectile { damage: u32 },
    CheckpointTrigger(CheckpointId),
    Pickup { heal: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFact {
    pub subject: EntityId,
    pub other: ExternalId,
    pub category: CollisionCategory,
}

/// Read-only world queries answered by the physics collaborator.
pub trait PhysicsQuery {
    fn is_walkable(&self, position: Vec2) -> bool;
    fn is_grounded(&self, entity: EntityId) -> bool;
    fn hostiles_within(&self, center: Vec2, radius: f32) -> Vec<ExternalId>;
}

/// Flat, always-walkable world with no hostiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenField;

impl PhysicsQuery for OpenField {
    fn is_walkable(&self, _position: Vec2) -> bool {
        true
    }

    fn is_grounded(&self, _entity: EntityId) -> bool {
        true
    }

    fn hostiles_within(&self, _center: Vec2, _radius: f32) -> Vec<ExternalId> {
        Vec::new()
    }
}
