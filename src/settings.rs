//! Project configuration: constants plus the `ember.toml` project manifest.
//!
//! The teacher's own `settings.rs` carries exactly this shape of struct
//! (`project_name`, `version`, `author`, `license`, a build-target enum) but
//! reads it by parsing `.bst` source rather than a data file, leaving
//! `serde`/`toml` declared in `Cargo.toml` and unused. This is where those
//! two crates get a real job: deserializing the project manifest and the
//! lockfile C8/C9 produce.

use crate::errors::{EmberError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const EMBER_FILE_EXTENSION: &str = "ember";
pub const MANIFEST_FILE_NAME: &str = "ember.toml";
pub const LOCK_FILE_NAME: &str = "ember.lock";
pub const IMPLICIT_START_FUNC_NAME: &str = "main";

/// Rough heuristics for preallocating the token/node vectors, the same way
/// the teacher's `settings.rs` documents its own ratios as "a guess, should
/// be recalculated later".
pub const SRC_TO_TOKEN_RATIO: usize = 5;
pub const TOKEN_TO_NODE_RATIO: usize = 8;

/// Default per-test wall-clock timeout (§4.7).
pub const DEFAULT_TEST_TIMEOUT_SECS: u64 = 10 * 60;

/// Default TTL for cached package-index responses (§4.9).
pub const DEFAULT_INDEX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub project_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_license")]
    pub license: String,
    /// name -> requirement string, e.g. `"A" = ">=1,<2"`.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_license() -> String {
    "MIT".to_string()
}

impl ProjectManifest {
    pub fn load(project_dir: &Path) -> crate::errors::Result<Self> {
        let manifest_path = project_dir.join(MANIFEST_FILE_NAME);
        let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
            EmberError::new(
                ErrorKind::Config,
                format!("cannot read {}: {e}", manifest_path.display()),
            )
        })?;
        toml::from_str(&text)
            .map_err(|e| EmberError::new(ErrorKind::Config, format!("invalid manifest: {e}")))
    }

    pub fn write(&self, project_dir: &Path) -> crate::errors::Result<()> {
        let manifest_path = project_dir.join(MANIFEST_FILE_NAME);
        let text = toml::to_string_pretty(self)
            .map_err(|e| EmberError::new(ErrorKind::Config, e.to_string()))?;
        std::fs::write(&manifest_path, text)
            .map_err(|e| EmberError::new(ErrorKind::Io, e.to_string()))
    }
}

/// The build configuration threaded through the compiler, generalizing the
/// teacher's `Config` struct.
#[derive(Debug, Clone)]
pub struct Config {
    pub entry_dir: PathBuf,
    pub src: PathBuf,
    pub release_folder: PathBuf,
    pub target_triple: String,
    pub optimize: bool,
    pub force_rebuild: bool,
    pub emit_debug_sidecar: bool,
}

impl Config {
    pub fn new(entry_dir: PathBuf) -> Self {
        Config {
            src: entry_dir.clone(),
            entry_dir,
            release_folder: PathBuf::from("release"),
            target_triple: host_target_triple(),
            optimize: false,
            force_rebuild: false,
            emit_debug_sidecar: false,
        }
    }
}

/// Best-effort host triple, used as the default `--target`.
pub fn host_target_triple() -> String {
    format!(
        "{}-{}-{}",
        std::env::consts::ARCH,
        std::env::consts::FAMILY,
        std::env::consts::OS
    )
}

/// `{home}/.ember` per §6's on-disk layout.
pub fn ember_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ember")
}

pub fn cache_root() -> PathBuf {
    ember_home().join("cache")
}

pub fn install_root() -> PathBuf {
    ember_home().join("site-packages")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Force,
    Debug,
    HideWarnings,
}
