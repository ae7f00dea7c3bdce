//! Plugin manifest parsing
//!
//! Every plugin folder carries a `manifest.json` describing the plugin.
//! Parse failures are per-plugin: the loader reports them and skips only
//! the offending plugin.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShadeError};

/// contents of a plugin's `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// plugin name
    pub name: String,

    /// semantic version string
    pub version_number: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub website_url: String,

    /// guids of plugins that must load before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Manifest {
    /// parse a manifest from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ShadeError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|e| ShadeError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// synthetic manifest for host-owned modules (e.g. the fallback module)
    pub fn host(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version_number: "0.0.0".to_string(),
            description: String::new(),
            website_url: String::new(),
            dependencies: Vec::new(),
        }
    }
}
