//! Plugin-module runtime
//!
//! Isolated script modules with guid identity, per-purpose storage folders,
//! tracked allocations, and a process-wide directory for controlled
//! cross-module lookup.
//!
//! The loading sequence is serial: a module is constructed (namespace
//! injected), its script runs to completion, and only then is its namespace
//! registered and visible to modules loaded after it.

pub mod arena;
pub mod directory;
pub mod manifest;
pub mod module;
pub mod paths;
pub mod runtime;

pub use arena::ModuleArena;
pub use directory::ModuleDirectory;
pub use manifest::Manifest;
pub use module::{LoadResult, ModuleHandle, ModuleInfo, PluginModule};
pub use paths::ModuleFolders;
pub use runtime::ScriptRuntime;
