use std::path::{Path, PathBuf};

use serde::Deserialize;

/// What happens when a module is registered twice at the same position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The later registration replaces the earlier one.
    #[default]
    Overwrite,
    /// The later registration is an error.
    Reject,
}

/// What happens when module dependencies form a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Installation fails and names the modules involved.
    #[default]
    Reject,
    /// The cycle is broken at the first revisited module and a warning is
    /// logged.
    Tolerate,
}

/// Configuration for bootstrapping sites.
///
/// Read from `zoom.toml` at the root of a project. Every field has a
/// default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Versions")]
pub struct Config {
    /// Sites to boot, in order.
    ///
    /// If this is empty, every discovered site is booted.
    pub sites: Vec<String>,

    /// Directory holding one sub-directory per site, each with a
    /// `site.toml`.
    pub sites_dir: PathBuf,

    /// Directory of shared module manifests.
    pub modules_dir: PathBuf,

    /// Behaviour on duplicate module registration.
    pub duplicate_modules: DuplicatePolicy,

    /// Behaviour on dependency cycles.
    pub dependency_cycles: CyclePolicy,

    /// Whether a failed boot degrades to the minimal fallback router rather
    /// than returning the error.
    pub fallback_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            sites_dir: default_sites_dir(),
            modules_dir: default_modules_dir(),
            duplicate_modules: DuplicatePolicy::default(),
            dependency_cycles: CyclePolicy::default(),
            fallback_on_error: true,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Loads `zoom.toml` from `root`, falling back to the defaults when the
    /// file is missing or invalid.
    #[must_use]
    pub fn load_or_default(root: &Path) -> Self {
        let path = root.join("zoom.toml");
        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Failed to load config: {e}");
            Self::default()
        })
    }
}

fn default_sites_dir() -> PathBuf {
    PathBuf::from("sites")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("modules")
}

const fn default_true() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        sites: Vec<String>,

        #[serde(default = "default_sites_dir")]
        sites_dir: PathBuf,

        #[serde(default = "default_modules_dir")]
        modules_dir: PathBuf,

        #[serde(default)]
        duplicate_modules: DuplicatePolicy,

        #[serde(default)]
        dependency_cycles: CyclePolicy,

        #[serde(default = "default_true")]
        fallback_on_error: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                sites,
                sites_dir,
                modules_dir,
                duplicate_modules,
                dependency_cycles,
                fallback_on_error,
            } => Self {
                sites,
                sites_dir,
                modules_dir,
                duplicate_modules,
                dependency_cycles,
                fallback_on_error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\nsites = [\"zoomy\", \"partners\"]\nsites_dir = \"tenants\"\nduplicate_modules = \"reject\"\ndependency_cycles = \"tolerate\"\nfallback_on_error = false\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.sites, ["zoomy".to_string(), "partners".to_string()]);
        assert_eq!(config.sites_dir, PathBuf::from("tenants"));
        assert_eq!(config.modules_dir, PathBuf::from("modules"));
        assert_eq!(config.duplicate_modules, DuplicatePolicy::Reject);
        assert_eq!(config.dependency_cycles, CyclePolicy::Tolerate);
        assert!(!config.fallback_on_error);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nduplicate_modules = \"sometimes\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_or_default(tmp.path()), Config::default());
    }
}
