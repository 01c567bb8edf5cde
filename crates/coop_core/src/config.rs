use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lobby::Archetype;
use crate::math::Vec2;

pub const MAX_SLOT_COUNT: u8 = 8;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub session: SessionTuning,
    pub input: InputTuning,
    pub archetypes: ArchetypeTable,
    pub guard: GuardTuning,
    pub dash: DashTuning,
    pub invulnerability: InvulnerabilityTuning,
    pub outcome: OutcomeTuning,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    pub slot_count: u8,
    pub join_countdown_seconds: f32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            slot_count: 4,
            join_countdown_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputTuning {
    pub aim_deadzone: f32,
    pub navigate_threshold: f32,
}

impl Default for InputTuning {
    fn default() -> Self {
        Self {
            aim_deadzone: 0.2,
            navigate_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeTuning {
    pub max_health: u32,
    pub move_speed: f32,
    pub primary_cooldown_seconds: f32,
    pub primary_damage: u32,
    pub projectile_speed: f32,
    pub melee_reach: f32,
}

impl Default for ArchetypeTuning {
    fn default() -> Self {
        Self {
            max_health: 100,
            move_speed: 5.0,
            primary_cooldown_seconds: 0.4,
            primary_damage: 10,
            projectile_speed: 12.0,
            melee_reach: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeTable {
    pub ranged: ArchetypeTuning,
    pub melee: ArchetypeTuning,
}

impl Default for ArchetypeTable {
    fn default() -> Self {
        Self {
            ranged: ArchetypeTuning {
                max_health: 80,
                move_speed: 5.5,
                primary_cooldown_seconds: 0.35,
                primary_damage: 8,
                ..ArchetypeTuning::default()
            },
            melee: ArchetypeTuning {
                max_health: 120,
                move_speed: 4.5,
                primary_cooldown_seconds: 0.5,
                primary_damage: 15,
                ..ArchetypeTuning::default()
            },
        }
    }
}

impl ArchetypeTable {
    pub fn for_archetype(&self, archetype: Archetype) -> &ArchetypeTuning {
        match archetype {
            Archetype::Ranged => &self.ranged,
            Archetype::Melee => &self.melee,
        }
    }
}

/// How much of an intercepted hit a guard takes on itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GuardSelfDamage {
    Fixed { amount: u32 },
    Scaled { factor: f32 },
}

impl GuardSelfDamage {
    pub fn self_damage_for(self, incoming: u32) -> u32 {
        match self {
            Self::Fixed { amount } => amount.max(1),
            Self::Scaled { factor } => {
                let scaled = (incoming as f32 * factor).ceil();
                if scaled.is_finite() && scaled >= 1.0 {
                    scaled as u32
                } else {
                    1
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardTuning {
    pub cooldown_seconds: f32,
    pub max_health: u32,
    pub lifetime_seconds: f32,
    pub follow_offset: Vec2,
    pub self_damage: GuardSelfDamage,
}

impl Default for GuardTuning {
    fn default() -> Self {
        Self {
            cooldown_seconds: 4.0,
            max_health: 3,
            lifetime_seconds: 6.0,
            follow_offset: Vec2::new(0.75, 0.0),
            self_damage: GuardSelfDamage::Fixed { amount: 1 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashTuning {
    pub cooldown_seconds: f32,
    pub duration_seconds: f32,
    pub speed: f32,
    pub hit_radius: f32,
    pub damage: u32,
}

impl Default for DashTuning {
    fn default() -> Self {
        Self {
            cooldown_seconds: 1.5,
            duration_seconds: 0.25,
            speed: 14.0,
            hit_radius: 0.9,
            damage: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvulnerabilityTuning {
    pub after_hit_seconds: f32,
    pub after_respawn_seconds: f32,
}

impl Default for InvulnerabilityTuning {
    fn default() -> Self {
        Self {
            after_hit_seconds: 0.75,
            after_respawn_seconds: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeTuning {
    pub shared_death_limit: Option<u32>,
    pub per_player_death_limit: Option<u32>,
    pub respawn_delay_seconds: f32,
}

impl Default for OutcomeTuning {
    fn default() -> Self {
        Self {
            shared_death_limit: Some(5),
            per_player_death_limit: None,
            respawn_delay_seconds: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomePolicy {
    Unlimited,
    SharedPool { limit: u32 },
    PerPlayerCap { limit: u32 },
}

impl OutcomeTuning {
    pub fn resolve_policy(&self) -> Result<OutcomePolicy, ConfigError> {
        match (self.shared_death_limit, self.per_player_death_limit) {
            (Some(shared_limit), Some(per_player_limit)) => {
                Err(ConfigError::ConflictingOutcomePolicy {
                    shared_limit,
                    per_player_limit,
                })
            }
            (Some(0), None) => Err(ConfigError::ZeroDeathLimit {
                field: "outcome.shared_death_limit",
            }),
            (None, Some(0)) => Err(ConfigError::ZeroDeathLimit {
                field: "outcome.per_player_death_limit",
            }),
            (Some(limit), None) => Ok(OutcomePolicy::SharedPool { limit }),
            (None, Some(limit)) => Ok(OutcomePolicy::PerPlayerCap { limit }),
            (None, None) => Ok(OutcomePolicy::Unlimited),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be finite and non-negative, got {value}")]
    InvalidSeconds { field: String, value: f32 },
    #[error("{field} must be finite and positive, got {value}")]
    InvalidMagnitude { field: String, value: f32 },
    #[error("{field} must be at least 1")]
    ZeroAmount { field: String },
    #[error("session.slot_count must be between 1 and {max}, got {value}")]
    SlotCount { value: u8, max: u8 },
    #[error("{field} must be at least 1 when set")]
    ZeroDeathLimit { field: &'static str },
    #[error(
        "outcome policy is ambiguous: shared_death_limit={shared_limit} and \
per_player_death_limit={per_player_limit} are both set; configure exactly one"
    )]
    ConflictingOutcomePolicy {
        shared_limit: u32,
        per_player_limit: u32,
    },
}

impl CoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, CoreConfig>(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            ConfigError::Parse {
                path,
                source: error.into_inner(),
            }
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks every tunable and resolves the death-limit policy.
    pub fn validate(&self) -> Result<OutcomePolicy, ConfigError> {
        if self.session.slot_count == 0 || self.session.slot_count > MAX_SLOT_COUNT {
            return Err(ConfigError::SlotCount {
                value: self.session.slot_count,
                max: MAX_SLOT_COUNT,
            });
        }
        check_seconds(
            "session.join_countdown_seconds",
            self.session.join_countdown_seconds,
        )?;
        check_seconds("input.aim_deadzone", self.input.aim_deadzone)?;
        check_magnitude("input.navigate_threshold", self.input.navigate_threshold)?;

        for (prefix, tuning) in [
            ("archetypes.ranged", &self.archetypes.ranged),
            ("archetypes.melee", &self.archetypes.melee),
        ] {
            validate_archetype(prefix, tuning)?;
        }

        check_seconds("guard.cooldown_seconds", self.guard.cooldown_seconds)?;
        check_magnitude("guard.lifetime_seconds", self.guard.lifetime_seconds)?;
        if self.guard.max_health == 0 {
            return Err(ConfigError::ZeroAmount {
                field: "guard.max_health".to_string(),
            });
        }
        if !self.guard.follow_offset.is_finite() {
            return Err(ConfigError::InvalidMagnitude {
                field: "guard.follow_offset".to_string(),
                value: f32::NAN,
            });
        }
        match self.guard.self_damage {
            GuardSelfDamage::Fixed { amount: 0 } => {
                return Err(ConfigError::ZeroAmount {
                    field: "guard.self_damage.amount".to_string(),
                })
            }
            GuardSelfDamage::Scaled { factor } => {
                check_magnitude("guard.self_damage.factor", factor)?
            }
            GuardSelfDamage::Fixed { .. } => {}
        }

        check_seconds("dash.cooldown_seconds", self.dash.cooldown_seconds)?;
        check_magnitude("dash.duration_seconds", self.dash.duration_seconds)?;
        check_seconds("dash.speed", self.dash.speed)?;
        check_seconds("dash.hit_radius", self.dash.hit_radius)?;

        check_seconds(
            "invulnerability.after_hit_seconds",
            self.invulnerability.after_hit_seconds,
        )?;
        check_seconds(
            "invulnerability.after_respawn_seconds",
            self.invulnerability.after_respawn_seconds,
        )?;
        check_seconds(
            "outcome.respawn_delay_seconds",
            self.outcome.respawn_delay_seconds,
        )?;

        self.outcome.resolve_policy()
    }
}

fn validate_archetype(prefix: &str, tuning: &ArchetypeTuning) -> Result<(), ConfigError> {
    if tuning.max_health == 0 {
        return Err(ConfigError::ZeroAmount {
            field: format!("{prefix}.max_health"),
        });
    }
    check_seconds(&format!("{prefix}.move_speed"), tuning.move_speed)?;
    check_seconds(
        &format!("{prefix}.primary_cooldown_seconds"),
        tuning.primary_cooldown_seconds,
    )?;
    check_seconds(&format!("{prefix}.projectile_speed"), tuning.projectile_speed)?;
    check_seconds(&format!("{prefix}.melee_reach"), tuning.melee_reach)?;
    Ok(())
}

fn check_seconds(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSeconds {
            field: field.to_string(),
            value,
        })
    }
}

fn check_magnitude(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMagnitude {
            field: field.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_to_shared_pool() {
        let policy = CoreConfig::default().validate().expect("valid");
        assert_eq!(policy, OutcomePolicy::SharedPool { limit: 5 });
    }

    #[test]
    fn both_death_limits_is_a_configuration_error() {
        let mut config = CoreConfig::default();
        config.outcome.shared_death_limit = Some(5);
        config.outcome.per_player_death_limit = Some(3);
        let error = config.validate().expect_err("conflict");
        assert!(matches!(
            error,
            ConfigError::ConflictingOutcomePolicy {
                shared_limit: 5,
                per_player_limit: 3
            }
        ));
    }

    #[test]
    fn no_death_limit_means_unlimited() {
        let mut config = CoreConfig::default();
        config.outcome.shared_death_limit = None;
        assert_eq!(config.validate().expect("valid"), OutcomePolicy::Unlimited);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_sections() {
        let raw = r#"{
            "outcome": { "shared_death_limit": null, "per_player_death_limit": 3 },
            "guard": { "self_damage": { "mode": "scaled", "factor": 0.1 } }
        }"#;
        let config = CoreConfig::from_json_str(raw).expect("parse");
        assert_eq!(config.session, SessionTuning::default());
        assert_eq!(
            config.validate().expect("valid"),
            OutcomePolicy::PerPlayerCap { limit: 3 }
        );
        assert_eq!(config.guard.self_damage.self_damage_for(15), 2);
    }

    #[test]
    fn parse_error_reports_json_path() {
        let raw = r#"{ "dash": { "damage": "lots" } }"#;
        let error = CoreConfig::from_json_str(raw).expect_err("type error");
        match error {
            ConfigError::Parse { path, .. } => assert_eq!(path, "dash.damage"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_negative_durations() {
        let mut config = CoreConfig::default();
        config.dash.cooldown_seconds = -1.0;
        match config.validate() {
            Err(ConfigError::InvalidSeconds { field, .. }) => {
                assert_eq!(field, "dash.cooldown_seconds")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn guard_self_damage_never_drops_below_one() {
        assert_eq!(GuardSelfDamage::Fixed { amount: 1 }.self_damage_for(15), 1);
        assert_eq!(GuardSelfDamage::Scaled { factor: 0.01 }.self_damage_for(15), 1);
        assert_eq!(GuardSelfDamage::Scaled { factor: 0.5 }.self_damage_for(15), 8);
    }
}
