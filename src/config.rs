//! Runtime configuration
//!
//! Plain data consumed by the hook layer and the plugin runtime. Parsing a
//! config file (or command line) into this struct is the embedder's job.

use serde::{Deserialize, Serialize};

/// strategy for resolving a hook target that is reached through a thunk
///
/// some nominal target addresses are only an intermediate relative call/jump
/// (or a RIP-indirect jump slot) pointing at the real entry point. the
/// resolver follows at most `max_depth` such indirections, one decoded
/// instruction per step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThunkResolution {
    /// maximum number of indirections to follow
    #[serde(default = "default_thunk_depth")]
    pub max_depth: usize,

    /// also dereference RIP-indirect jump slots (`jmp [rip+disp]`)
    #[serde(default = "default_true")]
    pub follow_indirect: bool,
}

fn default_thunk_depth() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for ThunkResolution {
    fn default() -> Self {
        Self {
            max_depth: 4,
            follow_indirect: true,
        }
    }
}

/// configuration for the plugin runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// name of the hosting project; used as the root folder name
    pub project_name: String,

    /// optional top-level namespace the shared `mods` table is nested under
    /// in script scopes. `None` exposes a flat `mods` table.
    pub api_namespace: Option<String>,

    /// guid of the module that identity resolution falls back to when a
    /// context carries no binding
    pub fallback_guid: String,

    /// thunk-following strategy applied by hooks that opt into it
    pub thunks: ThunkResolution,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            project_name: "shade".to_string(),
            api_namespace: None,
            fallback_guid: "shade-core".to_string(),
            thunks: ThunkResolution::default(),
        }
    }
}
