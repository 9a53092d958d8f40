use crate::app::cli::Cli;
use crate::app::models::{GeneralSettings, ProjectConfig};
use crate::app::rules::RuleSet;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "minfileserver";
const SETTINGS_FILES: [&str; 2] = ["settings.json", "settings.toml"];
const PROJECTS_DIR: &str = "config";
const STATIC_DIR: &str = "static";
const DEFAULT_PORT: u16 = 8080;

/// Everything the server needs, fixed before the first connection is accepted.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub registry: Registry,
    pub listen: SocketAddr,
    pub static_dir: PathBuf,
}

/// General settings plus every registered project, keyed by identifier.
#[derive(Debug, Default)]
pub struct Registry {
    pub settings: GeneralSettings,
    projects: BTreeMap<String, ProjectConfig>,
}

impl Registry {
    pub fn new(settings: GeneralSettings, projects: BTreeMap<String, ProjectConfig>) -> Self {
        Self { settings, projects }
    }

    /// Reads the settings file and every project file in `projects_dir`.
    pub fn load(settings_path: &Path, projects_dir: &Path) -> Result<Self> {
        let settings = read_config_file(settings_path)?;
        let projects = load_projects(projects_dir)?;
        Ok(Self::new(settings, projects))
    }

    pub fn project(&self, id: &str) -> Option<&ProjectConfig> {
        if id.is_empty() {
            return None;
        }
        self.projects.get(id)
    }

    /// Projects ordered by identifier.
    pub fn projects(&self) -> impl Iterator<Item = (&str, &ProjectConfig)> {
        self.projects.iter().map(|(id, project)| (id.as_str(), project))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

/// Project values win when set; empty ones fall back to the general defaults.
pub fn resolve_rules<'a>(project: &'a ProjectConfig, general: &'a GeneralSettings) -> RuleSet<'a> {
    RuleSet {
        inclusive_extensions: if project.inclusive_extensions.is_empty() {
            &general.inclusive_extensions
        } else {
            &project.inclusive_extensions
        },
        exclusive_extensions: if project.exclusive_extensions.is_empty() {
            &general.exclusive_extensions
        } else {
            &project.exclusive_extensions
        },
        exclusive_folders: if project.exclusive_folders.is_empty() {
            &general.exclusive_folders
        } else {
            &project.exclusive_folders
        },
        exclusive_files: if project.exclusive_files.is_empty() {
            &general.exclusive_files
        } else {
            &project.exclusive_files
        },
    }
}

/// Layers command line flags over the files found on disk.
pub fn resolve_config(cli: Cli) -> Result<RuntimeConfig> {
    let settings_path = locate_settings(cli.settings.as_deref())?;
    let base_dir = settings_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let projects_dir = cli.config_dir.unwrap_or_else(|| base_dir.join(PROJECTS_DIR));
    let static_dir = cli.static_dir.unwrap_or_else(|| base_dir.join(STATIC_DIR));

    log::info!("Loading settings from {}", settings_path.display());
    let registry = Registry::load(&settings_path, &projects_dir)?;

    let port = cli
        .port
        .or(registry.settings.server_port)
        .unwrap_or(DEFAULT_PORT);

    Ok(RuntimeConfig {
        registry,
        listen: SocketAddr::new(cli.bind, port),
        static_dir,
    })
}

/// Explicit path first, then the working directory, then the user config dir.
fn locate_settings(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let cwd = env::current_dir().context("Failed to get current directory")?;
    let mut candidates: Vec<PathBuf> = SETTINGS_FILES.iter().map(|name| cwd.join(name)).collect();
    if let Some(user_dir) = dirs::config_dir() {
        candidates.extend(SETTINGS_FILES.iter().map(|name| user_dir.join(APP_DIR).join(name)));
    }

    candidates.into_iter().find(|path| path.is_file()).with_context(|| {
        format!(
            "No settings file found in {} or the user config directory",
            cwd.display()
        )
    })
}

fn load_projects(dir: &Path) -> Result<BTreeMap<String, ProjectConfig>> {
    let mut projects = BTreeMap::new();

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read project directory {:?}", dir))?;

    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read project directory {:?}", dir))?
            .path();
        if !path.is_file() || config_format(&path).is_none() {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            log::warn!("Skipping project file with a non UTF-8 name: {:?}", path);
            continue;
        };

        let mut project: ProjectConfig = read_config_file(&path)?;
        if project.project_name.is_empty() {
            log::warn!("Skipping {:?}: project_name is empty", path);
            continue;
        }
        if project.root_path.is_relative() {
            project.root_path = dir.join(&project.root_path);
        }

        log::debug!("Registered project {} at {}", id, project.root_path.display());
        projects.insert(id.to_string(), project);
    }

    Ok(projects)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

fn config_format(path: &Path) -> Option<ConfigFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some(ConfigFormat::Json),
        Some("toml") => Some(ConfigFormat::Toml),
        _ => None,
    }
}

fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let Some(format) = config_format(path) else {
        bail!("Unsupported config format for {:?} (expected .json or .toml)", path);
    };

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config at {:?}", path))?;

    let parsed: T = match format {
        ConfigFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?,
        ConfigFormat::Toml => {
            toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?
        }
    };

    Ok(parsed)
}
