use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const ROOT_ENV_VAR: &str = "CRAWL_ROOT";
pub const SCENARIO_EXTENSION: &str = "json";

/// On-disk layout the crawl binary reads from. Everything hangs off a root
/// that holds `assets/base`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub base_content_dir: PathBuf,
    pub mods_dir: PathBuf,
    pub scenarios_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} points at {path}, which has no assets/base directory")]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "no crawl root with assets/base found above {}; set {var} to the project directory",
        join_dirs(.searched_from)
    )]
    RootNotFound {
        searched_from: Vec<PathBuf>,
        var: &'static str,
    },
    #[error("scenario name '{name}' must be a bare file stem")]
    InvalidScenarioName { name: String },
    #[error("scenario '{name}' not found in {dir} (available: {})", list_or_none(.available))]
    ScenarioNotFound {
        name: String,
        dir: PathBuf,
        available: Vec<String>,
    },
    #[error("failed to list scenarios in {dir}: {source}")]
    ListScenarios {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn join_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

impl AppPaths {
    pub fn from_root(root: PathBuf) -> Self {
        let assets = root.join("assets");
        Self {
            base_content_dir: assets.join("base"),
            scenarios_dir: assets.join("scenarios"),
            mods_dir: root.join("mods"),
            root,
        }
    }

    /// Path of the named scenario file, checked to exist.
    pub fn scenario_path(&self, name: &str) -> Result<PathBuf, StartupError> {
        let is_bare_stem = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && Path::new(name).components().count() == 1;
        if !is_bare_stem {
            return Err(StartupError::InvalidScenarioName {
                name: name.to_string(),
            });
        }
        let path = self
            .scenarios_dir
            .join(format!("{name}.{SCENARIO_EXTENSION}"));
        if path.is_file() {
            return Ok(path);
        }
        Err(StartupError::ScenarioNotFound {
            name: name.to_string(),
            dir: self.scenarios_dir.clone(),
            available: self.scenario_names()?,
        })
    }

    /// Sorted stems of every scenario file. A missing directory lists nothing.
    pub fn scenario_names(&self) -> Result<Vec<String>, StartupError> {
        let entries = match fs::read_dir(&self.scenarios_dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StartupError::ListScenarios {
                    dir: self.scenarios_dir.clone(),
                    source,
                })
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StartupError::ListScenarios {
                    dir: self.scenarios_dir.clone(),
                    source,
                })?
                .path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(SCENARIO_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// `CRAWL_ROOT` when set, otherwise the nearest directory holding
/// `assets/base` above the executable or the working directory.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let root = canonical_or_raw(Path::new(&value));
            if holds_content(&root) {
                Ok(AppPaths::from_root(root))
            } else {
                Err(StartupError::InvalidEnvRoot {
                    var: ROOT_ENV_VAR,
                    path: root,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let starts = search_starts();
            find_content_root(&starts)
                .map(AppPaths::from_root)
                .ok_or(StartupError::RootNotFound {
                    searched_from: starts,
                    var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn search_starts() -> Vec<PathBuf> {
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let mut starts = Vec::new();
    for dir in exe_dir.into_iter().chain(env::current_dir().ok()) {
        let dir = canonical_or_raw(&dir);
        if !starts.contains(&dir) {
            starts.push(dir);
        }
    }
    starts
}

fn find_content_root(starts: &[PathBuf]) -> Option<PathBuf> {
    starts
        .iter()
        .flat_map(|start| start.ancestors())
        .find(|candidate| holds_content(candidate))
        .map(Path::to_path_buf)
}

fn holds_content(path: &Path) -> bool {
    path.join("assets").join("base").is_dir()
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_root() -> tempfile::TempDir {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::create_dir_all(temp.path().join("assets").join("base")).expect("create base");
        temp
    }

    #[test]
    fn content_root_is_found_from_a_nested_directory() {
        let temp = content_root();
        let nested = temp.path().join("target").join("debug");
        fs::create_dir_all(&nested).expect("create nested");

        let found = find_content_root(&[nested]).expect("root");
        assert_eq!(found, temp.path());
        assert!(find_content_root(&[temp.path().join("assets")]).is_some());
    }

    #[test]
    fn directory_without_base_content_is_not_a_root() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        fs::create_dir_all(temp.path().join("crates")).expect("create crates");
        assert!(!holds_content(temp.path()));
    }

    #[test]
    fn scenario_lookup_resolves_existing_files_only() {
        let temp = content_root();
        let paths = AppPaths::from_root(temp.path().to_path_buf());
        fs::create_dir_all(&paths.scenarios_dir).expect("create scenarios");
        fs::write(paths.scenarios_dir.join("crypt.json"), "{}").expect("write crypt");
        fs::write(paths.scenarios_dir.join("barrow.json"), "{}").expect("write barrow");
        fs::write(paths.scenarios_dir.join("notes.txt"), "").expect("write notes");

        assert_eq!(
            paths.scenario_path("crypt").expect("crypt"),
            paths.scenarios_dir.join("crypt.json")
        );
        match paths.scenario_path("sewer") {
            Err(StartupError::ScenarioNotFound { available, .. }) => {
                assert_eq!(available, vec!["barrow".to_string(), "crypt".to_string()]);
            }
            other => panic!("expected ScenarioNotFound, got {other:?}"),
        }
    }

    #[test]
    fn scenario_names_must_stay_inside_the_scenarios_dir() {
        let temp = content_root();
        let paths = AppPaths::from_root(temp.path().to_path_buf());
        for name in ["", "../crypt", "maps/crypt", ".hidden"] {
            assert!(
                matches!(
                    paths.scenario_path(name),
                    Err(StartupError::InvalidScenarioName { .. })
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn missing_scenarios_dir_lists_nothing() {
        let temp = content_root();
        let paths = AppPaths::from_root(temp.path().to_path_buf());
        assert!(paths.scenario_names().expect("names").is_empty());
    }
}
