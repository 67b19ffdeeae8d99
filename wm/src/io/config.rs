//! Three-tier configuration loading: built-in, user, project.
//!
//! Built-in tiers are embedded YAML. User and project tiers are optional files;
//! a tier that cannot be read or parsed is skipped whole with a warning.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::core::modes::{ModeConfig, ModeLookupError, ModesConfig, ModesFile};
use crate::core::settings::{WmConfig, WmConfigLayer};
use crate::io::paths::WmPaths;

const DEFAULT_WM_YAML: &str = include_str!("../../defaults/wm.yaml");
const DEFAULT_MODES_YAML: &str = include_str!("../../defaults/modes.yaml");

pub const WM_CONFIG_FILE: &str = "wm.yaml";
pub const MODES_CONFIG_FILE: &str = "modes.yaml";

/// Built-in workflow settings.
pub fn default_workflow_config() -> WmConfig {
    parse_built_in(WM_CONFIG_FILE, DEFAULT_WM_YAML)
}

/// Built-in mode definitions.
pub fn default_modes_file() -> ModesFile {
    parse_built_in(MODES_CONFIG_FILE, DEFAULT_MODES_YAML)
}

/// Parse an embedded tier. A broken built-in is a packaging bug, so this panics.
fn parse_built_in<T: DeserializeOwned>(name: &str, yaml: &str) -> T {
    match serde_yaml::from_str(yaml) {
        Ok(value) => value,
        Err(err) => panic!("built-in {name} should be valid: {err}"),
    }
}

/// Directory of the user tier: `$WM_CONFIG_HOME`, else `<config_dir>/wm`.
pub fn user_config_dir(config_home: Option<&Path>) -> Option<PathBuf> {
    match config_home {
        Some(dir) => Some(dir.to_path_buf()),
        None => dirs::config_dir().map(|dir| dir.join("wm")),
    }
}

/// Locations of the user and project tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigSources {
    pub user_dir: Option<PathBuf>,
    pub project_dir: PathBuf,
}

impl ConfigSources {
    pub fn new(paths: &WmPaths, config_home: Option<&Path>) -> Self {
        Self {
            user_dir: user_config_dir(config_home),
            project_dir: paths.wm_dir.clone(),
        }
    }

    /// Tier files for `file_name`, lowest precedence first.
    fn tier_files(&self, file_name: &str) -> Vec<PathBuf> {
        self.user_dir
            .iter()
            .chain(std::iter::once(&self.project_dir))
            .map(|dir| dir.join(file_name))
            .collect()
    }
}

/// Memoized resolution results keyed by the tier file paths.
#[derive(Debug, Default)]
pub struct ConfigCache {
    workflow: Mutex<HashMap<Vec<PathBuf>, WmConfig>>,
    modes: Mutex<HashMap<Vec<PathBuf>, ModesConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.workflow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Resolves effective configuration for one project.
#[derive(Debug)]
pub struct ConfigResolver {
    sources: ConfigSources,
    cache: ConfigCache,
}

impl ConfigResolver {
    pub fn new(sources: ConfigSources, cache: ConfigCache) -> Self {
        Self { sources, cache }
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Effective `wm.yaml` (project > user > built-in).
    #[instrument(skip_all)]
    pub fn load_workflow_config(&self) -> WmConfig {
        let files = self.sources.tier_files(WM_CONFIG_FILE);
        let mut cache = self
            .cache
            .workflow
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&files) {
            return hit.clone();
        }
        let layers: Vec<WmConfigLayer> = files.iter().filter_map(|f| read_tier(f)).collect();
        debug!(tiers = layers.len(), "resolved workflow config");
        let config = default_workflow_config().merged(&layers);
        cache.insert(files, config.clone());
        config
    }

    /// Effective `modes.yaml` (project > user > built-in).
    #[instrument(skip_all)]
    pub fn load_mode_config(&self) -> ModesConfig {
        let files = self.sources.tier_files(MODES_CONFIG_FILE);
        let mut cache = self
            .cache
            .modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = cache.get(&files) {
            return hit.clone();
        }
        let layers: Vec<ModesFile> = files.iter().filter_map(|f| read_tier(f)).collect();
        debug!(tiers = layers.len(), "resolved mode config");
        let modes = ModesConfig::from_tiers(&default_modes_file(), &layers);
        cache.insert(files, modes.clone());
        modes
    }
}

/// Resolve a mode name or alias, warning when it is deprecated.
pub fn resolve_mode<'a>(
    modes: &'a ModesConfig,
    name: &str,
) -> Result<&'a ModeConfig, ModeLookupError> {
    let mode = modes.resolve(name)?;
    if mode.deprecated {
        warn!(mode = %mode.name, "mode is deprecated");
    }
    Ok(mode)
}

/// Read one optional tier. Missing → `None`; empty → default layer.
fn read_tier<T: DeserializeOwned + Default>(path: &Path) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable config tier, skipping");
            return None;
        }
    };
    if contents.trim().is_empty() {
        return Some(T::default());
    }
    match serde_yaml::from_str(&contents) {
        Ok(layer) => Some(layer),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "malformed config tier, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(user: &Path, project: &Path) -> ConfigResolver {
        ConfigResolver::new(
            ConfigSources {
                user_dir: Some(user.to_path_buf()),
                project_dir: project.to_path_buf(),
            },
            ConfigCache::new(),
        )
    }

    #[test]
    fn built_in_tiers_parse() {
        let cfg = default_workflow_config();
        assert_eq!(cfg.spec_path, "planning/specs");
        assert_eq!(cfg.research_path, "planning/research");
        assert_eq!(cfg.session_retention_days, 7);
        assert_eq!(cfg.project.diff_base, "main");
        assert!(cfg.project.test_file_pattern.is_empty());
        assert!(!cfg.verification_configured());

        let modes = ModesConfig::from_tiers(&default_modes_file(), &[]);
        for name in ["default", "task", "planning", "research", "implementation", "freeform", "qa"] {
            assert!(modes.get(name).is_some(), "missing built-in mode {name}");
        }
        assert!(modes.get("implementation").is_some_and(ModeConfig::is_implementation));
    }

    #[test]
    #[should_panic(expected = "built-in wm.yaml should be valid")]
    fn malformed_built_in_tier_panics() {
        let _: WmConfig = parse_built_in(WM_CONFIG_FILE, "spec_path: [unterminated\n");
    }

    #[test]
    fn malformed_user_tier_is_skipped_whole() {
        let user = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        fs::write(user.path().join(WM_CONFIG_FILE), "spec_path: [unterminated\n").expect("write");
        fs::write(
            project.path().join(WM_CONFIG_FILE),
            "reviews:\n  code_reviewer: codex\n",
        )
        .expect("write");
        let cfg = resolver(user.path(), project.path()).load_workflow_config();
        assert_eq!(cfg.spec_path, "planning/specs");
        assert_eq!(cfg.reviews.code_reviewer.as_deref(), Some("codex"));
    }

    #[test]
    fn empty_tier_is_an_empty_layer() {
        let user = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        fs::write(project.path().join(WM_CONFIG_FILE), "\n").expect("write");
        let cfg = resolver(user.path(), project.path()).load_workflow_config();
        assert_eq!(cfg, default_workflow_config());
    }

    #[test]
    fn cache_serves_until_cleared() {
        let user = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        let resolver = resolver(user.path(), project.path());
        assert_eq!(resolver.load_workflow_config().session_retention_days, 7);

        fs::write(
            project.path().join(WM_CONFIG_FILE),
            "session_retention_days: 30\n",
        )
        .expect("write");
        assert_eq!(resolver.load_workflow_config().session_retention_days, 7);

        resolver.cache().clear();
        assert_eq!(resolver.load_workflow_config().session_retention_days, 30);
    }

    #[test]
    fn project_modes_add_and_override() {
        let user = tempfile::tempdir().expect("tempdir");
        let project = tempfile::tempdir().expect("tempdir");
        fs::write(
            project.path().join(MODES_CONFIG_FILE),
            "modes:\n  review:\n    description: Review a PR\n    aliases: [rv]\n  implementation:\n    require_new_tests: true\n",
        )
        .expect("write");
        let modes = resolver(user.path(), project.path()).load_mode_config();
        assert_eq!(resolve_mode(&modes, "rv").expect("alias").name, "review");
        let implementation = modes.get("implementation").expect("implementation");
        assert!(implementation.require_new_tests);
        assert!(implementation.is_implementation());
    }
}
