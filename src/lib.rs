#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)] // we document safety in SAFETY comments

//! shade-rs: In-process function interception and a plugin-module runtime
//!
//! This library provides two tightly coupled layers:
//!
//! - **Hooks**: detour hooks that redirect a target function into a
//!   replacement, with an owned trampoline preserving the original behavior.
//!   Hooks are move-only objects: exactly one owner holds the installed patch,
//!   and dropping the owner restores the target.
//! - **Plugins**: dynamically loaded script modules, each with its own guid,
//!   storage folders, isolated namespace, and tracked allocations, registered
//!   in a process-wide module directory for controlled cross-plugin lookup.
//!
//! The hook machinery is x86/x86_64 only; the plugin runtime is portable.

pub mod config;
pub mod error;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod hook;
pub mod plugin;
pub mod util;

// re-exports for convenience
pub use config::{RuntimeConfig, ThunkResolution};
pub use error::{Result, ShadeError};
pub use plugin::{LoadResult, ModuleDirectory, PluginModule, ScriptRuntime};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use hook::{DetourHook, HookRegistry};

/// library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
