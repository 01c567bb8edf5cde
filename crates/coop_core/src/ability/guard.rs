use std::collections::BTreeMap;

use tracing::debug;

use crate::clock::{Countdown, CountdownTick};
use crate::config::{GuardSelfDamage, GuardTuning};
use crate::events::GuardEndCause;
use crate::ids::{EntityId, SlotId};
use crate::math::Vec2;

/// Player-owned blocking entity with its own small health pool and a fixed lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardEntity {
    pub id: EntityId,
    pub owner: EntityId,
    pub owner_slot: SlotId,
    pub position: Vec2,
    health: u32,
    max_health: u32,
    follow_offset: Vec2,
    self_damage: GuardSelfDamage,
    lifetime: Countdown,
}

impl GuardEntity {
    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    pub fn lifetime_remaining(&self) -> f32 {
        self.lifetime.remaining_seconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardBlock {
    pub guard: EntityId,
    pub owner_slot: SlotId,
    pub self_damage: u32,
    pub remaining_health: u32,
}

/// A guard that left the simulation. The owner must be told so its cooldown starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardEnded {
    pub guard: EntityId,
    pub owner: EntityId,
    pub owner_slot: SlotId,
    pub cause: GuardEndCause,
}

#[derive(Debug, Default)]
pub struct GuardRoster {
    guards: BTreeMap<EntityId, GuardEntity>,
}

impl GuardRoster {
    pub fn spawn(
        &mut self,
        id: EntityId,
        owner: EntityId,
        owner_slot: SlotId,
        owner_position: Vec2,
        tuning: &GuardTuning,
    ) -> &GuardEntity {
        let guard = GuardEntity {
            id,
            owner,
            owner_slot,
            position: owner_position + tuning.follow_offset,
            health: tuning.max_health.max(1),
            max_health: tuning.max_health.max(1),
            follow_offset: tuning.follow_offset,
            self_damage: tuning.self_damage,
            lifetime: Countdown::started(tuning.lifetime_seconds),
        };
        debug!(guard = %id, owner = %owner, "guard_spawned");
        self.guards.entry(id).or_insert(guard)
    }

    pub fn get(&self, id: EntityId) -> Option<&GuardEntity> {
        self.guards.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.guards.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GuardEntity> {
        self.guards.values()
    }

    pub fn owned_by(&self, owner: EntityId) -> Option<&GuardEntity> {
        self.guards.values().find(|guard| guard.owner == owner)
    }

    /// Keeps the guard at its offset from the owner; returns the new position.
    pub fn follow(&mut self, guard: EntityId, owner_position: Vec2) -> Option<Vec2> {
        let guard = self.guards.get_mut(&guard)?;
        guard.position = owner_position + guard.follow_offset;
        Some(guard.position)
    }

    /// The guard takes its own reduced damage for an intercepted hit. The guard is
    /// removed when its health runs out; the caller notifies the owner.
    pub fn absorb(
        &mut self,
        guard: EntityId,
        incoming: u32,
    ) -> Option<(GuardBlock, Option<GuardEnded>)> {
        let entry = self.guards.get_mut(&guard)?;
        let self_damage = entry.self_damage.self_damage_for(incoming);
        entry.health = entry.health.saturating_sub(self_damage);
        let block = GuardBlock {
            guard,
            owner_slot: entry.owner_slot,
            self_damage,
            remaining_health: entry.health,
        };
        if entry.health > 0 {
            return Some((block, None));
        }
        let ended = self.remove(guard, GuardEndCause::Depleted);
        Some((block, ended))
    }

    /// Advances lifetimes; expired guards are removed and reported.
    pub fn tick(&mut self, dt_seconds: f32) -> Vec<GuardEnded> {
        let expired = self
            .guards
            .values_mut()
            .filter_map(|guard| {
                (guard.lifetime.tick(dt_seconds) == CountdownTick::Fired).then_some(guard.id)
            })
            .collect::<Vec<_>>();
        expired
            .into_iter()
            .filter_map(|guard| self.remove(guard, GuardEndCause::Expired))
            .collect()
    }

    pub fn remove_owned_by(&mut self, owner: EntityId) -> Option<GuardEnded> {
        let guard = self.owned_by(owner)?.id;
        self.remove(guard, GuardEndCause::OwnerRemoved)
    }

    fn remove(&mut self, guard: EntityId, cause: GuardEndCause) -> Option<GuardEnded> {
        let removed = self.guards.remove(&guard)?;
        debug!(guard = %guard, cause = ?cause, "guard_removed");
        Some(GuardEnded {
            guard,
            owner: removed.owner,
            owner_slot: removed.owner_slot,
            cause,
        })
    }
}
