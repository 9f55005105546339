use std::env;

use crawl_engine::{
    compile_def_database, resolve_app_paths, ContentCompileError, ContentRequest, LoopConfig,
    StartupError,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::scenario::{self, ScenarioError, ScenarioRun};

const ENABLED_MODS_ENV_VAR: &str = "CRAWL_ENABLED_MODS";
const SCENARIO_ENV_VAR: &str = "CRAWL_SCENARIO";
const REALTIME_ENV_VAR: &str = "CRAWL_REALTIME";
const DEFAULT_SCENARIO: &str = "crypt";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to compile content definitions: {0}")]
    Content(#[from] ContentCompileError),
    #[error("scenario '{name}' could not be loaded: {source}")]
    Scenario {
        name: String,
        #[source]
        source: ScenarioError,
    },
}

pub(crate) struct AppWiring {
    pub(crate) scenario_name: String,
    pub(crate) config: LoopConfig,
    pub(crate) run: ScenarioRun,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    info!("=== Crawl Startup ===");
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        base_content_dir = %app_paths.base_content_dir.display(),
        mods_dir = %app_paths.mods_dir.display(),
        scenarios_dir = %app_paths.scenarios_dir.display(),
        "startup"
    );

    let request = env::var(ENABLED_MODS_ENV_VAR)
        .map(|raw| ContentRequest::from_mod_list(&raw))
        .unwrap_or_default();
    let defs = compile_def_database(&app_paths, &request)?;
    info!(
        spell_defs = defs.spell_defs().len(),
        creature_defs = defs.creature_defs().len(),
        enabled_mods = request.enabled_mods.len(),
        "content_compiled"
    );

    let scenario_name = env::var(SCENARIO_ENV_VAR)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let scenario_path = app_paths.scenario_path(&scenario_name)?;
    let run = scenario::load_scenario_file(&scenario_path)
        .and_then(|file| scenario::build_run(file, defs))
        .map_err(|source| BootstrapError::Scenario {
            name: scenario_name.clone(),
            source,
        })?;

    let config = LoopConfig {
        realtime: realtime_from_env(),
        max_ticks: Some(run.run_ticks),
        ..LoopConfig::default()
    };

    Ok(AppWiring {
        scenario_name,
        config,
        run,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn realtime_from_env() -> bool {
    let Ok(raw) = env::var(REALTIME_ENV_VAR) else {
        return false;
    };
    parse_flag(&raw).unwrap_or_else(|| {
        warn!(
            env_var = REALTIME_ENV_VAR,
            value = raw.as_str(),
            "invalid flag value; running headless"
        );
        false
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("sometimes"), None);
    }
}
