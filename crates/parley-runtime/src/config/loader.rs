//! Layered configuration loading with figment.
//!
//! Sources, lowest to highest priority:
//!
//! 1. [`ParleyConfig::default`]
//! 2. Values passed to [`ConfigLoader::merge`]
//! 3. The profile file next to the config file, e.g. `parley.production.toml`
//! 4. The config file itself: the one given with [`ConfigLoader::file`], or
//!    the first `parley.*` / `config.*` found in the search directories
//! 5. `PARLEY_*` environment variables, `__` separating nested keys:
//!    `PARLEY_LOGGING__LEVEL=debug`, `PARLEY_DISPATCH__FAULT_POLICY=isolate`,
//!    `PARLEY_SETTINGS__GREETING=hi`
//!
//! TOML files need the `toml-config` feature *(default)*, YAML files
//! (`.yaml`, `.yml`) the `yaml-config` feature.
//!
//! ```rust,ignore
//! use parley_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/parley.toml")
//!     .load()?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::ParleyConfig;

/// Environment variable selecting the profile.
pub const PROFILE_ENV: &str = "PARLEY_PROFILE";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "PARLEY_";

/// File stems looked for in each search directory, in order.
const FILE_STEMS: [&str; 2] = ["parley", "config"];

// =============================================================================
// Profile
// =============================================================================

/// Names the profile file merged below the config file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Profile(Cow<'static, str>);

impl Profile {
    pub const DEVELOPMENT: Self = Self(Cow::Borrowed("development"));
    pub const PRODUCTION: Self = Self(Cow::Borrowed("production"));

    /// Normalizes a profile name. `dev` and `prod` are short forms.
    pub fn parse(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "dev" | "development" => Self::DEVELOPMENT,
            "prod" | "production" => Self::PRODUCTION,
            _ => Self(Cow::Owned(name)),
        }
    }

    /// Reads `PARLEY_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `parley.toml` becomes `parley.<profile>.toml`.
    fn sibling_of(&self, path: &Path) -> Option<PathBuf> {
        let stem = path.file_stem()?.to_str()?;
        let ext = path.extension()?.to_str()?;
        Some(path.with_file_name(format!("{stem}.{self}.{ext}")))
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::DEVELOPMENT
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// File formats
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    #[cfg(feature = "toml-config")]
    Toml,
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl FileFormat {
    /// Formats enabled at compile time, in search order.
    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_mut)
    )]
    fn enabled() -> Vec<Self> {
        let mut formats = Vec::new();
        #[cfg(feature = "toml-config")]
        formats.push(Self::Toml);
        #[cfg(feature = "yaml-config")]
        formats.push(Self::Yaml);
        formats
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => &["toml"],
            #[cfg(feature = "yaml-config")]
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::enabled()
            .into_iter()
            .find(|format| format.extensions().contains(&ext))
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_variables)
    )]
    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
        }
    }
}

// =============================================================================
// ConfigLoader
// =============================================================================

/// Builds a [`ParleyConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_dirs: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_dirs: Vec::new(),
            config_file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for config files. Without any, the
    /// current directory and `<user config dir>/parley` are searched.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        self.search_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("parley")),
            None => self,
        }
    }

    /// Loads this file instead of searching. It must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges values below every file and the environment.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<ParleyConfig> {
        let profile = self.profile.clone();
        let config: ParleyConfig = self.into_figment()?.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            bots = config.bots.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn into_figment(self) -> ConfigResult<Figment> {
        let file = match &self.config_file {
            Some(path) => Some(Self::explicit_file(path)?),
            None => Self::discover(&self.search_dirs()),
        };

        let mut figment =
            Figment::from(Serialized::defaults(ParleyConfig::default())).merge(self.overrides);

        if let Some((path, format)) = file {
            if let Some(profiled) = self.profile.sibling_of(&path).filter(|p| p.is_file()) {
                debug!(path = %profiled.display(), profile = %self.profile, "Loading profile configuration");
                figment = format.merge(figment, &profiled);
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = format.merge(figment, &path);
        }

        if self.load_env {
            let env = Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__");
            figment = figment.merge(env);
        }
        Ok(figment)
    }

    fn explicit_file(path: &Path) -> ConfigResult<(PathBuf, FileFormat)> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let format = FileFormat::of(path).ok_or_else(|| {
            ConfigError::Parse(format!(
                "Unsupported or disabled configuration file format: {}",
                path.display()
            ))
        })?;
        Ok((path.to_path_buf(), format))
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_dirs.is_empty() {
            return self.search_dirs.clone();
        }
        std::env::current_dir()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("parley")))
            .collect()
    }

    /// The first existing `<stem>.<ext>` across `dirs`.
    fn discover(dirs: &[PathBuf]) -> Option<(PathBuf, FileFormat)> {
        for dir in dirs {
            for stem in FILE_STEMS {
                for format in FileFormat::enabled() {
                    for ext in format.extensions() {
                        let path = dir.join(format!("{stem}.{ext}"));
                        if path.is_file() {
                            return Some((path, format));
                        }
                    }
                }
            }
        }
        warn!(dirs = ?dirs, "No configuration file found, using defaults");
        None
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<ParleyConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use parley_core::FaultPolicy;

    use super::*;
    use crate::config::schema::{LogFormat, LogLevel};

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Info);
            assert!(config.bots.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::parse(" PROD "), Profile::PRODUCTION);
        assert_eq!(Profile::parse("dev"), Profile::DEVELOPMENT);
        assert_eq!(Profile::parse("Staging").as_str(), "staging");
        assert_eq!(
            Profile::PRODUCTION.sibling_of(Path::new("conf/parley.toml")),
            Some(PathBuf::from("conf/parley.production.toml"))
        );
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(PROFILE_ENV, "production");
            assert_eq!(Profile::from_env(), Profile::PRODUCTION);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/parley.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parley.toml",
                r#"
                settings = { greeting = "hello" }

                [dispatch]
                fault_policy = "isolate"

                [[bots]]
                name = "greeter"
                threads = ["100", "200"]

                [[bots]]
                name = "main"
                "#,
            )?;
            jail.set_env("PARLEY_LOGGING__LEVEL", "debug");
            jail.set_env("PARLEY_DISPATCH__MAX_DEPTH", "4");
            jail.set_env(PROFILE_ENV, "production");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.settings["greeting"], "hello");
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.dispatch.max_depth, 4);
            assert_eq!(config.dispatch.fault_policy, FaultPolicy::Isolate);
            assert_eq!(config.bots.len(), 2);
            assert_eq!(config.bots[0].threads, vec!["100", "200"]);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_config_stem_is_searched_after_parley() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[logging]\nlevel = \"trace\"")?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Trace);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_base_file_overrides_profile_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parley.production.toml",
                "[logging]\nlevel = \"warn\"\nformat = \"full\"",
            )?;
            jail.create_file("parley.toml", "[logging]\nlevel = \"error\"")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .file(jail.directory().join("parley.toml"))
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Error);
            assert_eq!(config.logging.format, LogFormat::Full);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_merged_values_sit_below_discovered_file() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.toml", "[logging]\nlevel = \"error\"")?;

            let mut defaults = ParleyConfig::default();
            defaults.logging.level = LogLevel::Warn;
            defaults.logging.format = LogFormat::Pretty;

            let config = ConfigLoader::new()
                .merge(defaults)
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Error);
            assert_eq!(config.logging.format, LogFormat::Pretty);
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("parley.ini", "level = debug")?;
            let err = ConfigLoader::new()
                .file(jail.directory().join("parley.ini"))
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)));
            Ok(())
        });
    }
}
