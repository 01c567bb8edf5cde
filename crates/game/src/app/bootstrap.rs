use std::path::{Path, PathBuf};

use coop_core::{ConfigError, CoreConfig};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::arena::{Arena, ArenaLayout};
use super::loop_runner::LoopConfig;
use super::scene::{LobbyScene, PlayScene, SceneKey, SceneMachine, SceneWorld};
use super::script::{DeviceScript, ScriptError};

const CONFIG_ENV_VAR: &str = "COOP_CONFIG";
const SCRIPT_ENV_VAR: &str = "COOP_SCRIPT";
const SAVE_ENV_VAR: &str = "COOP_SAVE";
const REALTIME_ENV_VAR: &str = "COOP_REALTIME";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) machine: SceneMachine,
    pub(crate) script: DeviceScript,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Co-op Session Startup ===");

    let config = load_core_config(env_path(CONFIG_ENV_VAR).as_deref())?;
    let mut script = match env_path(SCRIPT_ENV_VAR) {
        Some(path) => {
            info!(path = %path.display(), "device_script_loaded");
            DeviceScript::from_path(&path)?
        }
        None => {
            info!("device_script_demo");
            DeviceScript::demo()
        }
    };
    let arena = Arena::new(script.take_arena().unwrap_or_default());
    let world = SceneWorld::new(config, arena, env_path(SAVE_ENV_VAR));
    let machine = SceneMachine::new(
        Box::new(LobbyScene::new()),
        Box::new(PlayScene::new()),
        SceneKey::Lobby,
        world,
    );

    Ok(AppWiring {
        config: LoopConfig {
            realtime: parse_flag(std::env::var(REALTIME_ENV_VAR).ok().as_deref()),
            ..LoopConfig::default()
        },
        machine,
        script,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Defaults when no path is given. The policy is validated here so a conflicting
/// outcome setup is reported at startup rather than when the first session starts.
fn load_core_config(path: Option<&Path>) -> Result<CoreConfig, ConfigError> {
    let config = match path {
        Some(path) => CoreConfig::from_path(path)?,
        None => {
            info!("core_config_defaults");
            CoreConfig::default()
        }
    };
    match config.validate() {
        Ok(policy) => info!(policy = ?policy, "core_config_loaded"),
        Err(err @ ConfigError::ConflictingOutcomePolicy { .. }) => return Err(err),
        Err(err) => warn!(error = %err, "core_config_invalid"),
    }
    Ok(config)
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(str::trim),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}
