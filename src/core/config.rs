//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archiver::shape::ShapeSelection;
use crate::core::errors::{HarnessError, Result};
use crate::corpus::collate::CollatePolicy;

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub archiver: ArchiverConfig,
    pub runner: RunnerConfig,
    pub collate: CollateConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// How to reach the archiving library under test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiverConfig {
    /// argv of the library binding process (program first).
    pub command: Vec<String>,
    /// Working directory for the binding process; inherits ours when unset.
    pub working_dir: Option<PathBuf>,
    /// `auto` to probe the library, or an explicit `<constructor>/<compute>` pair.
    pub shape: String,
}

/// Verify-run behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Stop after the first spec file that recorded a failure.
    pub fail_fast: bool,
    /// List-ID used for every message instead of the normalized header.
    pub list_id: Option<String>,
    /// Directory scanned by `run-all` when no spec files are named.
    pub spec_dir: PathBuf,
}

/// Collator policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CollateConfig {
    pub missing_id: CollatePolicy,
}

/// Event-log and diagnostic settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append-only JSONL event log; disabled when unset.
    pub jsonl_path: Option<PathBuf>,
    /// Default tracing filter when neither `-v`/`-q` nor `MAH_LOG` is given.
    pub level: String,
}

/// Filesystem paths used by the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: None,
            shape: "auto".to_string(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            list_id: None,
            spec_dir: PathBuf::from("specs"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            jsonl_path: None,
            level: "warn".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[MAH-CONFIG] WARNING: HOME not set, falling back to /tmp for config path"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("mah").join("config.toml"),
        }
    }
}

impl ArchiverConfig {
    /// Parsed shape selection. Valid after [`Config::load`] succeeded.
    pub fn shape_selection(&self) -> Result<ShapeSelection> {
        self.shape.parse()
    }

    /// The binding command, or an error naming the knobs that set it.
    pub fn require_command(&self) -> Result<&[String]> {
        if self.command.is_empty() {
            return Err(HarnessError::InvalidConfig {
                details: "archiver.command is empty; set it in the config file, \
                          MAH_ARCHIVER_COMMAND, or --archiver"
                    .to_string(),
            });
        }
        Ok(&self.command)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| HarnessError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(HarnessError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MAH_ARCHIVER_COMMAND") {
            self.archiver.command = parse_env_command("MAH_ARCHIVER_COMMAND", &raw)?;
        }
        if let Some(raw) = lookup("MAH_ARCHIVER_SHAPE") {
            self.archiver.shape = raw.trim().to_string();
        }
        if let Some(raw) = lookup("MAH_RUNNER_FAIL_FAST") {
            self.runner.fail_fast = parse_env_bool("MAH_RUNNER_FAIL_FAST", &raw)?;
        }
        if let Some(raw) = lookup("MAH_RUNNER_LIST_ID") {
            let trimmed = raw.trim();
            self.runner.list_id = (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        if let Some(raw) = lookup("MAH_COLLATE_MISSING_ID") {
            self.collate.missing_id = raw.parse()?;
        }
        if let Some(raw) = lookup("MAH_LOG_JSONL") {
            self.logging.jsonl_path = (!raw.trim().is_empty()).then(|| PathBuf::from(raw.trim()));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.archiver.shape_selection()?;

        if self.archiver.command.iter().any(|arg| arg.is_empty()) {
            return Err(HarnessError::InvalidConfig {
                details: "archiver.command must not contain empty arguments".to_string(),
            });
        }

        if let Some(lid) = &self.runner.list_id
            && lid.trim().is_empty()
        {
            return Err(HarnessError::InvalidConfig {
                details: "runner.list_id must not be blank when set".to_string(),
            });
        }

        Ok(())
    }
}

/// A JSON array of strings is taken as argv verbatim; anything else is split
/// on whitespace.
fn parse_env_command(key: &str, raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| HarnessError::InvalidConfig {
            details: format!("{key} must be a JSON array of strings: {e}"),
        });
    }
    Ok(trimmed.split_whitespace().map(str::to_string).collect())
}

fn parse_env_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(HarnessError::InvalidConfig {
            details: format!("{key} must be a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.archiver.shape, "auto");
        assert_eq!(cfg.collate.missing_id, CollatePolicy::FallbackKey);
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [archiver]
            command = ["python3", "shim.py", "--rootdir", "/srv/ponymail"]
            shape = "oldest/legacy"

            [runner]
            fail_fast = true
            list_id = "<dev.example.org>"

            [collate]
            missing_id = "drop"

            [logging]
            jsonl_path = "/tmp/mah.jsonl"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.archiver.command.len(), 4);
        assert!(cfg.runner.fail_fast);
        assert_eq!(cfg.collate.missing_id, CollatePolicy::DropMissingId);
        assert_eq!(
            cfg.logging.jsonl_path.as_deref(),
            Some(Path::new("/tmp/mah.jsonl"))
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_shape() {
        let mut cfg = Config::default();
        cfg.archiver.shape = "ancient/telepathy".to_string();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "MAH-1101");
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(lookup_from(&[
            ("MAH_ARCHIVER_COMMAND", "python3  shim.py"),
            ("MAH_RUNNER_FAIL_FAST", "yes"),
            ("MAH_RUNNER_LIST_ID", "  "),
            ("MAH_COLLATE_MISSING_ID", "drop"),
        ]))
        .unwrap();
        assert_eq!(cfg.archiver.command, vec!["python3", "shim.py"]);
        assert!(cfg.runner.fail_fast);
        assert_eq!(cfg.runner.list_id, None);
        assert_eq!(cfg.collate.missing_id, CollatePolicy::DropMissingId);
    }

    #[test]
    fn env_command_accepts_json_argv_with_spaces() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(lookup_from(&[(
            "MAH_ARCHIVER_COMMAND",
            r#" ["/opt/pony mail/shim", "--root", "/srv/a b"] "#,
        )]))
        .unwrap();
        assert_eq!(
            cfg.archiver.command,
            vec!["/opt/pony mail/shim", "--root", "/srv/a b"]
        );

        let err = cfg
            .apply_env_overrides_from(lookup_from(&[("MAH_ARCHIVER_COMMAND", "[\"unterminated")]))
            .unwrap_err();
        assert_eq!(err.code(), "MAH-1001");
    }

    #[test]
    fn env_bool_rejects_garbage() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(lookup_from(&[("MAH_RUNNER_FAIL_FAST", "maybe")]))
            .unwrap_err();
        assert_eq!(err.code(), "MAH-1001");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.code(), "MAH-1002");
    }

    #[test]
    fn require_command_names_the_knobs() {
        let cfg = Config::default();
        let err = cfg.archiver.require_command().unwrap_err();
        assert!(err.to_string().contains("MAH_ARCHIVER_COMMAND"));
    }
}
