//! Caller-owned hook registry
//!
//! Tracks a set of live hooks with unique ownership per target address.
//! The registry is not a process singleton: whoever drives a group of hooks
//! (the host, a plugin) owns its own registry, and dropping the registry
//! drops every hook in it, uninstalling them all.

use std::collections::HashMap;

use crate::error::{Result, ShadeError};
use crate::hook::DetourHook;

/// a set of live hooks keyed by target address
#[derive(Default)]
pub struct HookRegistry {
    by_target: HashMap<usize, DetourHook>,
}

impl HookRegistry {
    /// create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// take ownership of an installed hook
    ///
    /// fails when the hook has no bound target, or when another hook in
    /// this registry already owns the target. duplicate installation
    /// against one target is undefined.
    pub fn register(&mut self, hook: DetourHook) -> Result<()> {
        let target = hook.target();
        if target == 0 {
            return Err(ShadeError::NullTarget {
                name: hook.name().to_string(),
            });
        }
        if self.by_target.contains_key(&target) {
            return Err(ShadeError::TargetAlreadyHooked { target });
        }

        self.by_target.insert(target, hook);
        Ok(())
    }

    /// get a hook by target address
    pub fn get(&self, target: usize) -> Option<&DetourHook> {
        self.by_target.get(&target)
    }

    /// get a hook by target address (mutable)
    pub fn get_mut(&mut self, target: usize) -> Option<&mut DetourHook> {
        self.by_target.get_mut(&target)
    }

    /// find a hook by its diagnostic name
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut DetourHook> {
        self.by_target.values_mut().find(|h| h.name() == name)
    }

    /// release a hook back to the caller without uninstalling it
    pub fn remove(&mut self, target: usize) -> Option<DetourHook> {
        self.by_target.remove(&target)
    }

    /// check if an address is owned by this registry
    pub fn is_hooked(&self, target: usize) -> bool {
        self.by_target.contains_key(&target)
    }

    /// number of owned hooks
    pub fn count(&self) -> usize {
        self.by_target.len()
    }

    /// enable every owned hook; stops at the first failure
    pub fn enable_all(&mut self) -> Result<()> {
        for hook in self.by_target.values_mut() {
            hook.enable()?;
        }
        Ok(())
    }

    /// disable every owned hook; stops at the first failure
    pub fn disable_all(&mut self) -> Result<()> {
        for hook in self.by_target.values_mut() {
            hook.disable()?;
        }
        Ok(())
    }

    /// iterate over owned hooks
    pub fn iter(&self) -> impl Iterator<Item = &DetourHook> {
        self.by_target.values()
    }
}
