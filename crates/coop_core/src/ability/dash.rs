use std::collections::BTreeSet;

use crate::clock::{Countdown, CountdownTick};
use crate::ids::ExternalId;
use crate::math::Vec2;

/// An in-flight dash: fixed direction, fixed duration, and the targets it already hit.
#[derive(Debug, Clone, PartialEq)]
pub struct DashState {
    direction: Vec2,
    remaining: Countdown,
    hit_targets: BTreeSet<ExternalId>,
}

impl DashState {
    pub fn new(direction: Vec2, duration_seconds: f32) -> Self {
        Self {
            direction,
            remaining: Countdown::started(duration_seconds),
            hit_targets: BTreeSet::new(),
        }
    }

    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn remaining_seconds(&self) -> f32 {
        self.remaining.remaining_seconds()
    }

    pub fn hit_count(&self) -> usize {
        self.hit_targets.len()
    }

    pub fn has_hit(&self, target: ExternalId) -> bool {
        self.hit_targets.contains(&target)
    }

    /// Targets from `overlapping` not yet hit by this dash, now marked as hit.
    pub fn register_hits(&mut self, overlapping: &[ExternalId]) -> Vec<ExternalId> {
        overlapping
            .iter()
            .copied()
            .filter(|target| self.hit_targets.insert(*target))
            .collect()
    }

    /// True once the duration has elapsed.
    pub fn advance(&mut self, dt_seconds: f32) -> bool {
        matches!(
            self.remaining.tick(dt_seconds),
            CountdownTick::Fired | CountdownTick::Inactive
        )
    }
}
