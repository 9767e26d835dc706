//! Lowering configuration
//!
//! Options are read from the `[lowering]` table of a `tessel.toml` file:
//!
//! ```toml
//! [lowering]
//! ieee_rounding = true
//! allow_tf32 = false
//! signed_aware_reductions = true
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name
pub const CONFIG_FILE: &str = "tessel.toml";

/// Flags that change which IR a lowering call emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoweringOptions {
    /// Emit IEEE-rounded `fdiv` for true division
    pub ieee_rounding: bool,
    /// Default for `dot` when the call does not specify it
    pub allow_tf32: bool,
    /// Unsigned min/max reductions use `umin`/`umax`
    pub signed_aware_reductions: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            ieee_rounding: false,
            allow_tf32: true,
            signed_aware_reductions: false,
        }
    }
}

/// Top-level layout of `tessel.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lowering: LoweringOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded {}: {:?}", path.display(), config.lowering);
        Ok(config)
    }

    /// Load `path` if given, else `tessel.toml` in `dir` when present, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            log::trace!("no {CONFIG_FILE} in {}, using defaults", dir.display());
            Ok(Self::default())
        }
    }
}
