//! Detour hooking
//!
//! A [`DetourHook`] owns one interception: the patch bytes at the target,
//! the trampoline preserving the original behavior, and the enabled state.
//! Hooks are move-only; exactly one live object owns an installation, and
//! dropping it restores the target. Copying is deliberately not provided:
//! two owners of the same patch would double-restore.
//!
//! ```ignore
//! let mut hook = DetourHook::with_detour("CreateFileW", my_detour as usize);
//! hook.bind_target(target_addr)?;
//! hook.enable()?;
//!
//! // inside the detour, chain to the pre-hook behavior:
//! let original: Option<CreateFileWFn> = unsafe { hook.original() };
//! ```

pub mod arch;
pub mod asm;
pub mod registry;
pub mod trampoline;

pub use arch::{Architecture, NativeArch, X64, X86};
pub use registry::HookRegistry;
pub use trampoline::{ExecutableMemory, TrampolineBuilder};

use tracing::debug;

use crate::config::ThunkResolution;
use crate::error::{Result, ShadeError};
use crate::util::memory::{flush_icache, ProtectionGuard};

/// a named, move-only detour hook
///
/// lifecycle: constructed (unbound or fully specified) -> installed via
/// [`bind_target`](Self::bind_target) (trampoline carved, original
/// populated) -> enabled/disabled any number of times -> uninstalled on
/// drop.
pub struct DetourHook {
    /// diagnostic name
    name: String,
    /// address of the function being intercepted
    target: usize,
    /// address of the replacement function
    detour: usize,
    /// trampoline region; owning it is owning the installation
    memory: Option<ExecutableMemory>,
    /// trampoline entry preserving pre-hook behavior
    original: usize,
    /// patch bytes written at the target while enabled
    stub: Vec<u8>,
    /// original prologue bytes restored while disabled
    prologue: Vec<u8>,
    /// whether the redirection is currently patched in
    enabled: bool,
    /// thunk-following strategy; None disables indirection following
    thunks: Option<ThunkResolution>,
}

impl DetourHook {
    /// create an unbound hook shell; a target and detour must be bound
    /// before installation
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: 0,
            detour: 0,
            memory: None,
            original: 0,
            stub: Vec::new(),
            prologue: Vec::new(),
            enabled: false,
            thunks: None,
        }
    }

    /// create a hook with the detour bound and the target deferred
    pub fn with_detour(name: impl Into<String>, detour: usize) -> Self {
        let mut hook = Self::new(name);
        hook.detour = detour;
        hook
    }

    /// create a fully specified hook; installation is still explicit
    pub fn with_target(name: impl Into<String>, target: usize, detour: usize) -> Self {
        let mut hook = Self::with_detour(name, detour);
        hook.target = target;
        hook
    }

    /// opt into (or out of) following thunks when resolving the target
    pub fn set_follow_thunks(&mut self, strategy: Option<ThunkResolution>) {
        self.thunks = strategy;
    }

    /// re-resolve the target through intermediate call/jump indirection
    ///
    /// no-op unless a thunk strategy is configured and the hook is not yet
    /// installed.
    pub fn fix_hook_address(&mut self) {
        if self.target == 0 || self.memory.is_some() {
            return;
        }

        if let Some(strategy) = self.thunks {
            let resolved = asm::resolve_entry(self.target, &strategy);
            if resolved != self.target {
                debug!(
                    "hook '{}': followed thunk {:#x} -> {:#x}",
                    self.name, self.target, resolved
                );
                self.target = resolved;
            }
        }
    }

    /// set/replace the target and install the hook
    ///
    /// carves the trampoline and prepares the patch bytes; the hook is left
    /// disabled and must be enabled explicitly. rebinding an installed hook
    /// to a different target uninstalls the old patch first; rebinding to
    /// the same target is an error.
    pub fn bind_target(&mut self, target: usize) -> Result<()> {
        if self.memory.is_some() {
            if self.target == target {
                return Err(ShadeError::AlreadyInstalled {
                    name: self.name.clone(),
                    target,
                });
            }
            self.uninstall();
        }

        self.target = target;
        self.fix_hook_address();
        self.install()
    }

    /// install against the currently bound target
    pub fn install(&mut self) -> Result<()> {
        if self.target == 0 || self.detour == 0 {
            return Err(ShadeError::NullTarget {
                name: self.name.clone(),
            });
        }
        if self.memory.is_some() {
            return Err(ShadeError::AlreadyInstalled {
                name: self.name.clone(),
                target: self.target,
            });
        }

        let hook_size = NativeArch::preferred_hook_size(self.target, self.detour);

        let mut builder = TrampolineBuilder::<NativeArch>::new(self.target);
        builder.analyze(hook_size)?;
        builder.allocate()?;
        let original = builder.build()?;

        let prologue = builder.prologue_bytes().to_vec();
        let prologue_size = builder.prologue_size();

        // detour stub: near jump when it reaches, absolute otherwise,
        // NOP-padded so no partial instruction survives at the target
        let mut stub = NativeArch::encode_jmp_rel(self.target, self.detour)
            .unwrap_or_else(|| NativeArch::encode_jmp_abs(self.detour));
        if stub.len() < prologue_size {
            stub.extend_from_slice(&NativeArch::encode_nop_sled(prologue_size - stub.len()));
        }

        self.memory = builder.take_memory();
        self.original = original;
        self.stub = stub;
        self.prologue = prologue;
        self.enabled = false;

        debug!(
            "hook '{}' installed at {:#x}, trampoline {:#x}",
            self.name, self.target, self.original
        );

        Ok(())
    }

    /// patch the redirection in; no-op when already enabled
    ///
    /// the patch is one contiguous write; callers are responsible for
    /// quiescing threads that may be executing inside the prologue.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            return Ok(());
        }
        if self.memory.is_none() {
            return Err(ShadeError::NotInstalled {
                name: self.name.clone(),
            });
        }

        self.patch(&self.stub)?;
        self.enabled = true;
        Ok(())
    }

    /// restore the original prologue; no-op when already disabled
    ///
    /// the trampoline stays valid, so the hook can be re-enabled.
    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.patch(&self.prologue)?;
        self.enabled = false;
        Ok(())
    }

    /// the trampoline address, valid while installed
    pub fn trampoline(&self) -> Option<usize> {
        if self.memory.is_some() {
            Some(self.original)
        } else {
            None
        }
    }

    /// the trampoline reinterpreted as a caller-specified callable
    ///
    /// # Safety
    /// `F` must be a function pointer matching the original function's
    /// signature and calling convention; a mismatch is undefined behavior.
    pub unsafe fn original<F: Copy>(&self) -> Option<F> {
        debug_assert_eq!(core::mem::size_of::<F>(), core::mem::size_of::<usize>());

        if self.memory.is_some() {
            // SAFETY: caller guarantees F is a matching fn pointer type
            Some(unsafe { core::mem::transmute_copy(&self.original) })
        } else {
            None
        }
    }

    /// diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// bound target address (zero when unbound)
    pub fn target(&self) -> usize {
        self.target
    }

    /// detour address
    pub fn detour(&self) -> usize {
        self.detour
    }

    /// whether the redirection is currently patched in
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// whether the trampoline exists and `original` is valid
    pub fn is_installed(&self) -> bool {
        self.memory.is_some()
    }

    /// write `bytes` over the target prologue as one contiguous write
    fn patch(&self, bytes: &[u8]) -> Result<()> {
        let _guard = ProtectionGuard::new(self.target, bytes.len())?;

        // SAFETY: protection changed, length matches the analyzed prologue
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.target as *mut u8, bytes.len());
        }

        flush_icache(self.target, bytes.len())
    }

    /// restore the target and release the trampoline
    fn uninstall(&mut self) {
        if self.enabled {
            // ignore errors: restoring a dying hook must not panic the host
            let _ = self.disable();
        }

        self.memory = None;
        self.original = 0;
        self.stub.clear();
        self.prologue.clear();
    }
}

impl Drop for DetourHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

// SAFETY: the hook owns its trampoline region and patch bytes; the target
// address is process-global state either way
unsafe impl Send for DetourHook {}
