//! Memory read/protect primitives
//!
//! Thin wrappers over the OS virtual-memory APIs. Windows keeps the raw
//! kernel32 FFI; Unix goes through libc. Both sides expose the same surface.

use crate::error::{Result, ShadeError};

#[cfg(unix)]
const PAGE_SIZE: usize = 0x1000;

/// read memory at address into value
///
/// # Safety
/// address must be valid and readable for `size_of::<T>()` bytes
pub unsafe fn read_memory<T: Copy>(address: usize) -> Result<T> {
    if address == 0 {
        return Err(ShadeError::NullPointer {
            context: "read_memory",
        });
    }

    // SAFETY: caller ensures address validity
    Ok(unsafe { (address as *const T).read_unaligned() })
}

/// make `[address, address + size)` writable and executable
///
/// returns an opaque token the guard uses to restore the previous state.
#[cfg(windows)]
fn unprotect(address: usize, size: usize) -> Result<u32> {
    const PAGE_EXECUTE_READWRITE: u32 = 0x40;

    let mut old_protect: u32 = 0;
    let result = unsafe {
        VirtualProtect(
            address as *mut _,
            size,
            PAGE_EXECUTE_READWRITE,
            &mut old_protect,
        )
    };

    if result == 0 {
        Err(ShadeError::ProtectionChangeFailed { address, size })
    } else {
        Ok(old_protect)
    }
}

#[cfg(windows)]
fn reprotect(address: usize, size: usize, old_protect: u32) -> Result<()> {
    let mut ignored: u32 = 0;
    let result = unsafe { VirtualProtect(address as *mut _, size, old_protect, &mut ignored) };

    if result == 0 {
        Err(ShadeError::ProtectionChangeFailed { address, size })
    } else {
        Ok(())
    }
}

#[cfg(unix)]
fn page_span(address: usize, size: usize) -> (usize, usize) {
    let start = address & !(PAGE_SIZE - 1);
    let end = (address + size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    (start, end - start)
}

#[cfg(unix)]
fn unprotect(address: usize, size: usize) -> Result<u32> {
    let (start, span) = page_span(address, size);

    let result = unsafe {
        libc::mprotect(
            start as *mut libc::c_void,
            span,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
    };

    if result != 0 {
        Err(ShadeError::ProtectionChangeFailed { address, size })
    } else {
        Ok(0)
    }
}

// mprotect has no "query previous" counterpart; patched regions are code, so
// the guard restores them to read + execute.
#[cfg(unix)]
fn reprotect(address: usize, size: usize, _token: u32) -> Result<()> {
    let (start, span) = page_span(address, size);

    let result = unsafe {
        libc::mprotect(
            start as *mut libc::c_void,
            span,
            libc::PROT_READ | libc::PROT_EXEC,
        )
    };

    if result != 0 {
        Err(ShadeError::ProtectionChangeFailed { address, size })
    } else {
        Ok(())
    }
}

/// RAII guard that makes a code region writable for its lifetime
pub struct ProtectionGuard {
    address: usize,
    size: usize,
    token: u32,
}

impl ProtectionGuard {
    /// make the region writable, returning a guard that restores on drop
    pub fn new(address: usize, size: usize) -> Result<Self> {
        let token = unprotect(address, size)?;
        Ok(Self {
            address,
            size,
            token,
        })
    }
}

impl Drop for ProtectionGuard {
    fn drop(&mut self) {
        let _ = reprotect(self.address, self.size, self.token);
    }
}

/// flush the instruction cache for a patched region
#[cfg(windows)]
pub fn flush_icache(address: usize, size: usize) -> Result<()> {
    let result = unsafe { FlushInstructionCache(GetCurrentProcess(), address as *const _, size) };

    if result == 0 {
        Err(ShadeError::OsError {
            code: unsafe { GetLastError() } as i32,
            context: "FlushInstructionCache",
        })
    } else {
        Ok(())
    }
}

/// flush the instruction cache for a patched region
///
/// x86 keeps instruction and data caches coherent, so this is a no-op.
#[cfg(unix)]
pub fn flush_icache(_address: usize, _size: usize) -> Result<()> {
    Ok(())
}

#[cfg(windows)]
#[link(name = "kernel32")]
extern "system" {
    fn VirtualProtect(
        lpAddress: *mut core::ffi::c_void,
        dwSize: usize,
        flNewProtect: u32,
        lpflOldProtect: *mut u32,
    ) -> i32;

    fn FlushInstructionCache(
        hProcess: *mut core::ffi::c_void,
        lpBaseAddress: *const core::ffi::c_void,
        dwSize: usize,
    ) -> i32;

    fn GetCurrentProcess() -> *mut core::ffi::c_void;

    fn GetLastError() -> u32;
}
