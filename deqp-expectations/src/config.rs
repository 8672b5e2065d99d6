// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for deqp-expect.
//!
//! Settings come from an embedded default config, overlaid with
//! `.config/deqp-expect.toml` in the current directory (or an explicitly
//! passed file).

use crate::{errors::ConfigError, merge::FlakyPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use serde::Deserialize;
use std::{collections::BTreeSet, io};
use tracing::{debug, warn};

/// The path of the config file, relative to the current directory.
pub const CONFIG_FILE_PATH: &str = ".config/deqp-expect.toml";

/// Specifies where to load configuration from.
#[derive(Clone, Copy, Debug)]
pub enum ConfigLocation<'a> {
    /// Use [`CONFIG_FILE_PATH`] if it exists, the built-in defaults otherwise.
    Default,

    /// Load configuration from this file. Returns an error if it does not
    /// exist.
    Explicit(&'a Utf8Path),
}

/// Resolved configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeqpExpectConfig {
    expectations_dir: Utf8PathBuf,
    flaky_detection: FlakyPolicy,
    require_complete: bool,
}

impl DeqpExpectConfig {
    const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Loads configuration. Relative paths are resolved against `cwd`.
    pub fn load(location: ConfigLocation<'_>, cwd: &Utf8Path) -> Result<Self, ConfigError> {
        Self::load_with_warnings(location, cwd, &mut DefaultConfigWarnings)
    }

    fn load_with_warnings(
        location: ConfigLocation<'_>,
        cwd: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigError> {
        let user = match location {
            ConfigLocation::Default => {
                DeserializedConfig::from_path(&cwd.join(CONFIG_FILE_PATH), warnings)?
            }
            ConfigLocation::Explicit(path) => {
                let path = cwd.join(path);
                match DeserializedConfig::from_path(&path, warnings)? {
                    Some(config) => Some(config),
                    None => return Err(ConfigError::FileNotFound { path }),
                }
            }
        };
        Ok(Self::from_embedded().overlay(user.unwrap_or_default(), cwd))
    }

    /// Returns the built-in defaults, with relative paths left unresolved.
    ///
    /// Panics if the embedded config is invalid.
    pub fn from_embedded() -> Self {
        let deserializer = toml::Deserializer::parse(Self::DEFAULT_CONFIG)
            .expect("embedded default config should parse");
        let mut unknown = BTreeSet::new();
        let config: DefaultConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("embedded default config should be valid");

        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        Self {
            expectations_dir: config.expectations_dir,
            flaky_detection: config.flaky_detection,
            require_complete: config.require_complete,
        }
    }

    fn overlay(self, user: DeserializedConfig, cwd: &Utf8Path) -> Self {
        let expectations_dir = user.expectations_dir.unwrap_or(self.expectations_dir);
        Self {
            expectations_dir: cwd.join(expectations_dir),
            flaky_detection: user.flaky_detection.unwrap_or(self.flaky_detection),
            require_complete: user.require_complete.unwrap_or(self.require_complete),
        }
    }

    /// Returns the root directory of the expectation store.
    pub fn expectations_dir(&self) -> &Utf8Path {
        &self.expectations_dir
    }

    /// Returns the flaky detection policy.
    pub fn flaky_detection(&self) -> FlakyPolicy {
        self.flaky_detection
    }

    /// Returns true if incomplete autotest logs must not be merged.
    pub fn require_complete(&self) -> bool {
        self.require_complete
    }

    /// Overrides the expectations directory, as the command line does.
    pub fn set_expectations_dir(&mut self, dir: Utf8PathBuf) {
        self.expectations_dir = dir;
    }

    /// Overrides the flaky detection policy.
    pub fn set_flaky_detection(&mut self, policy: FlakyPolicy) {
        self.flaky_detection = policy;
    }
}

trait ConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if let Ok(key) = unknown.iter().exactly_one() {
            unknown_str.push_str("key: ");
            unknown_str.push_str(key);
        } else {
            unknown_str.push_str("keys:\n");
            for key in unknown {
                unknown_str.push_str("\n  - ");
                unknown_str.push_str(key);
            }
        }
        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultConfig {
    expectations_dir: Utf8PathBuf,
    flaky_detection: FlakyPolicy,
    require_complete: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedConfig {
    #[serde(default)]
    expectations_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    flaky_detection: Option<FlakyPolicy>,
    #[serde(default)]
    require_complete: Option<bool>,
}

impl DeserializedConfig {
    /// Returns `Ok(None)` if the file does not exist.
    fn from_path(
        path: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("config: no file at {path}");
                return Ok(None);
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            Self::deserialize_toml(&contents).map_err(|error| ConfigError::Parse {
                path: path.to_owned(),
                error,
            })?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }
        debug!("config: loaded {path}");
        Ok(Some(config))
    }

    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use maplit::btreeset;

    #[derive(Default)]
    struct TestConfigWarnings {
        unknown_keys: Option<(Utf8PathBuf, BTreeSet<String>)>,
    }

    impl ConfigWarnings for TestConfigWarnings {
        fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown_keys = Some((config_file.to_owned(), unknown.clone()));
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = DeqpExpectConfig::from_embedded();
        assert_eq!(config.expectations_dir(), "expectations");
        assert_eq!(config.flaky_detection(), FlakyPolicy::AnyOutcome);
        assert!(!config.require_complete());
    }

    #[test]
    fn no_config_file() {
        let dir = tempdir().unwrap();
        let mut warnings = TestConfigWarnings::default();
        let config =
            DeqpExpectConfig::load_with_warnings(ConfigLocation::Default, dir.path(), &mut warnings)
                .unwrap();
        assert_eq!(config.expectations_dir(), dir.path().join("expectations"));
        assert!(warnings.unknown_keys.is_none());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".config")).unwrap();
        let config_path = dir.path().join(CONFIG_FILE_PATH);
        std::fs::write(
            &config_path,
            indoc! {r#"
                expectations-dir = "out/expectations"
                flaky-detection = "healthy-vs-unhealthy"
                ignored1 = true

                [extra]
                ignored2 = 1
            "#},
        )
        .unwrap();

        let mut warnings = TestConfigWarnings::default();
        let config =
            DeqpExpectConfig::load_with_warnings(ConfigLocation::Default, dir.path(), &mut warnings)
                .unwrap();
        assert_eq!(
            config.expectations_dir(),
            dir.path().join("out/expectations")
        );
        assert_eq!(config.flaky_detection(), FlakyPolicy::HealthyVsUnhealthy);
        assert!(!config.require_complete());

        let (path, unknown) = warnings.unknown_keys.expect("unknown keys reported");
        assert_eq!(path, config_path);
        assert_eq!(
            unknown,
            btreeset! {"extra".to_owned(), "ignored1".to_owned()}
        );
    }

    #[test]
    fn explicit_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ci.toml");

        let error = DeqpExpectConfig::load(ConfigLocation::Explicit(&config_path), dir.path())
            .unwrap_err();
        assert!(matches!(error, ConfigError::FileNotFound { .. }), "{error:?}");

        std::fs::write(&config_path, "require-complete = true\n").unwrap();
        let config =
            DeqpExpectConfig::load(ConfigLocation::Explicit(&config_path), dir.path()).unwrap();
        assert!(config.require_complete());
    }

    #[test]
    fn invalid_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ci.toml");
        std::fs::write(&config_path, "flaky-detection = \"sometimes\"\n").unwrap();
        let error = DeqpExpectConfig::load(ConfigLocation::Explicit(&config_path), dir.path())
            .unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }), "{error:?}");
    }
}
