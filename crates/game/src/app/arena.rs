use std::collections::BTreeMap;

use coop_core::{
    Checkpoint, CheckpointError, CheckpointId, CheckpointRegistry, CollisionCategory,
    CollisionFact, EffectRequest, EntityId, ExternalId, PhysicsQuery, PlayerEntity, Vec2,
};
use serde::Deserialize;
use tracing::{debug, info};

const PLAYER_BODY_RADIUS: f32 = 0.45;
const PROJECTILE_RADIUS: f32 = 0.15;
const FIRST_PROJECTILE_ID: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct HostileDef {
    pub(crate) id: u64,
    pub(crate) position: Vec2,
    pub(crate) health: u32,
    pub(crate) contact_damage: u32,
    #[serde(default = "default_body_radius")]
    pub(crate) radius: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct CheckpointDef {
    pub(crate) id: u32,
    pub(crate) position: Vec2,
    #[serde(default = "default_trigger_radius")]
    pub(crate) radius: f32,
    pub(crate) anchors: Vec<Vec2>,
    #[serde(default)]
    pub(crate) starting: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct PickupDef {
    pub(crate) id: u64,
    pub(crate) position: Vec2,
    pub(crate) heal: u32,
    #[serde(default = "default_body_radius")]
    pub(crate) radius: f32,
}

fn default_body_radius() -> f32 {
    0.5
}

fn default_trigger_radius() -> f32 {
    1.5
}

/// Static description of the stand-in world: a walkable rectangle with hostile
/// dummies, checkpoint triggers and pickups.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct ArenaLayout {
    pub(crate) bounds_min: Vec2,
    pub(crate) bounds_max: Vec2,
    pub(crate) hostiles: Vec<HostileDef>,
    pub(crate) checkpoints: Vec<CheckpointDef>,
    pub(crate) pickups: Vec<PickupDef>,
}

impl Default for ArenaLayout {
    fn default() -> Self {
        Self {
            bounds_min: Vec2::new(-20.0, -12.0),
            bounds_max: Vec2::new(20.0, 12.0),
            hostiles: vec![
                HostileDef {
                    id: 100,
                    position: Vec2::new(6.0, 0.0),
                    health: 60,
                    contact_damage: 10,
                    radius: 0.6,
                },
                HostileDef {
                    id: 101,
                    position: Vec2::new(8.0, 3.0),
                    health: 40,
                    contact_damage: 15,
                    radius: 0.5,
                },
            ],
            checkpoints: vec![
                CheckpointDef {
                    id: 0,
                    position: Vec2::ZERO,
                    radius: 1.5,
                    anchors: vec![
                        Vec2::new(-2.0, 0.0),
                        Vec2::new(2.0, 0.0),
                        Vec2::new(-2.0, 2.0),
                        Vec2::new(2.0, 2.0),
                    ],
                    starting: true,
                },
                CheckpointDef {
                    id: 1,
                    position: Vec2::new(12.0, 0.0),
                    radius: 1.5,
                    anchors: vec![Vec2::new(11.0, -1.0), Vec2::new(11.0, 1.0)],
                    starting: false,
                },
            ],
            pickups: vec![PickupDef {
                id: 200,
                position: Vec2::new(4.0, -3.0),
                heal: 20,
                radius: 0.5,
            }],
        }
    }
}

#[derive(Debug, Clone)]
struct Hostile {
    position: Vec2,
    health: u32,
    contact_damage: u32,
    radius: f32,
}

#[derive(Debug, Clone)]
struct Projectile {
    owner: EntityId,
    position: Vec2,
    velocity: Vec2,
    damage: u32,
}

/// Runtime state of the stand-in physics collaborator. Answers the core's queries,
/// carries out its effect requests and reports overlaps back as collision facts.
#[derive(Debug)]
pub(crate) struct Arena {
    layout: ArenaLayout,
    hostiles: BTreeMap<ExternalId, Hostile>,
    pickups: BTreeMap<ExternalId, PickupDef>,
    projectiles: BTreeMap<ExternalId, Projectile>,
    guards: BTreeMap<EntityId, Vec2>,
    next_projectile_id: u64,
    defeated: u32,
}

impl Arena {
    pub(crate) fn new(layout: ArenaLayout) -> Self {
        let mut arena = Self {
            layout,
            hostiles: BTreeMap::new(),
            pickups: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            guards: BTreeMap::new(),
            next_projectile_id: FIRST_PROJECTILE_ID,
            defeated: 0,
        };
        arena.reset();
        arena
    }

    /// Restores every hostile and pickup from the layout.
    pub(crate) fn reset(&mut self) {
        self.hostiles = self
            .layout
            .hostiles
            .iter()
            .map(|def| {
                (
                    ExternalId(def.id),
                    Hostile {
                        position: def.position,
                        health: def.health,
                        contact_damage: def.contact_damage,
                        radius: def.radius,
                    },
                )
            })
            .collect();
        self.pickups = self
            .layout
            .pickups
            .iter()
            .map(|def| (ExternalId(def.id), def.clone()))
            .collect();
        self.projectiles.clear();
        self.guards.clear();
        self.defeated = 0;
    }

    pub(crate) fn checkpoint_registry(&self) -> Result<CheckpointRegistry, CheckpointError> {
        let mut registry = CheckpointRegistry::new();
        for def in &self.layout.checkpoints {
            let id = CheckpointId(def.id);
            let checkpoint = if def.starting {
                Checkpoint::starting(id, def.anchors.clone())
            } else {
                Checkpoint::new(id, def.anchors.clone())
            };
            registry.register(checkpoint)?;
        }
        Ok(registry)
    }

    pub(crate) fn hostile_health(&self, id: ExternalId) -> Option<u32> {
        self.hostiles.get(&id).map(|hostile| hostile.health)
    }

    pub(crate) fn hostiles_remaining(&self) -> usize {
        self.hostiles.len()
    }

    pub(crate) fn defeated(&self) -> u32 {
        self.defeated
    }

    pub(crate) fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub(crate) fn guard_position(&self, guard: EntityId) -> Option<Vec2> {
        self.guards.get(&guard).copied()
    }

    pub(crate) fn apply_effects(&mut self, effects: &[EffectRequest]) {
        for effect in effects {
            match *effect {
                EffectRequest::SpawnProjectile {
                    owner,
                    origin,
                    direction,
                    speed,
                    damage,
                } => {
                    let id = ExternalId(self.next_projectile_id);
                    self.next_projectile_id = self.next_projectile_id.saturating_add(1);
                    self.projectiles.insert(
                        id,
                        Projectile {
                            owner,
                            position: origin,
                            velocity: direction * speed,
                            damage,
                        },
                    );
                }
                EffectRequest::MeleeStrike {
                    owner,
                    origin,
                    direction,
                    reach,
                    damage,
                } => {
                    let center = origin + direction * (reach * 0.5);
                    for target in self.hostiles_within(center, reach * 0.5) {
                        self.damage_hostile(target, damage, owner);
                    }
                }
                EffectRequest::DamageHostile {
                    target,
                    amount,
                    attacker,
                } => self.damage_hostile(target, amount, attacker),
                EffectRequest::SpawnGuard {
                    guard, position, ..
                }
                | EffectRequest::MoveGuard { guard, position } => {
                    self.guards.insert(guard, position);
                }
                EffectRequest::DespawnGuard { guard } => {
                    self.guards.remove(&guard);
                }
                EffectRequest::DespawnProjectile { projectile } => {
                    self.projectiles.remove(&projectile);
                }
                EffectRequest::ConsumePickup { pickup } => {
                    self.pickups.remove(&pickup);
                }
                EffectRequest::SetVelocity { .. }
                | EffectRequest::SpawnHitEffect { .. }
                | EffectRequest::Teleport { .. } => {}
            }
        }
    }

    /// Moves player projectiles and resolves their hits against hostiles.
    pub(crate) fn step_projectiles(&mut self, dt_seconds: f32) {
        let mut hits = Vec::new();
        let mut spent = Vec::new();
        for (id, projectile) in &mut self.projectiles {
            projectile.position += projectile.velocity * dt_seconds;
            if !layout_contains(&self.layout, projectile.position) {
                spent.push(*id);
                continue;
            }
            let target = self.hostiles.iter().find(|(_, hostile)| {
                hostile.position.distance_squared(projectile.position)
                    <= (hostile.radius + PROJECTILE_RADIUS).powi(2)
            });
            if let Some((target, _)) = target {
                hits.push((*target, projectile.damage, projectile.owner));
                spent.push(*id);
            }
        }
        for id in spent {
            self.projectiles.remove(&id);
        }
        for (target, damage, owner) in hits {
            self.damage_hostile(target, damage, owner);
        }
    }

    /// Overlaps of alive players with hostiles, checkpoint triggers and pickups.
    pub(crate) fn collisions(&self, players: &[PlayerEntity]) -> Vec<CollisionFact> {
        let mut facts = Vec::new();
        for player in players.iter().filter(|player| player.is_alive()) {
            let position = player.position();
            let touches = |center: Vec2, radius: f32| {
                center.distance_squared(position) <= (radius + PLAYER_BODY_RADIUS).powi(2)
            };
            for (id, hostile) in &self.hostiles {
                if touches(hostile.position, hostile.radius) {
                    facts.push(CollisionFact {
                        subject: player.id(),
                        other: *id,
                        category: CollisionCategory::Hostile {
                            contact_damage: hostile.contact_damage,
                        },
                    });
                }
            }
            for def in &self.layout.checkpoints {
                if touches(def.position, def.radius) {
                    facts.push(CollisionFact {
                        subject: player.id(),
                        other: ExternalId(u64::from(def.id)),
                        category: CollisionCategory::CheckpointTrigger(CheckpointId(def.id)),
                    });
                }
            }
            for (id, pickup) in &self.pickups {
                if touches(pickup.position, pickup.radius) {
                    facts.push(CollisionFact {
                        subject: player.id(),
                        other: *id,
                        category: CollisionCategory::Pickup { heal: pickup.heal },
                    });
                }
            }
        }
        facts
    }

    fn damage_hostile(&mut self, target: ExternalId, amount: u32, attacker: EntityId) {
        let Some(hostile) = self.hostiles.get_mut(&target) else {
            return;
        };
        hostile.health = hostile.health.saturating_sub(amount);
        debug!(
            target = %target,
            amount,
            attacker = %attacker,
            remaining = hostile.health,
            "hostile_damaged"
        );
        if hostile.health == 0 {
            self.hostiles.remove(&target);
            self.defeated += 1;
            info!(target = %target, attacker = %attacker, "hostile_defeated");
        }
    }
}

fn layout_contains(layout: &ArenaLayout, position: Vec2) -> bool {
    position.is_finite()
        && position.x >= layout.bounds_min.x
        && position.x <= layout.bounds_max.x
        && position.y >= layout.bounds_min.y
        && position.y <= layout.bounds_max.y
}

impl PhysicsQuery for Arena {
    fn is_walkable(&self, position: Vec2) -> bool {
        layout_contains(&self.layout, position)
    }

    fn is_grounded(&self, _entity: EntityId) -> bool {
        true
    }

    fn hostiles_within(&self, center: Vec2, radius: f32) -> Vec<ExternalId> {
        self.hostiles
            .iter()
            .filter(|(_, hostile)| {
                hostile.position.distance_squared(center) <= (radius + hostile.radius).powi(2)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}
