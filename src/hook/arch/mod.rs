//! Architecture abstraction for detour installation
//!
//! Trait-based abstraction over x86 and x86_64, with compile-time selection
//! of the native architecture.

mod x64;
mod x86;

pub use x64::X64;
pub use x86::X86;

/// native architecture type alias based on target
#[cfg(target_arch = "x86_64")]
pub type NativeArch = X64;

#[cfg(target_arch = "x86")]
pub type NativeArch = X86;

/// architecture-specific code generation trait
///
/// implementors provide the instruction encoding and decoding needed to
/// carve prologues and emit detour stubs on their architecture.
pub trait Architecture: Sized + 'static {
    /// size of a near relative jump instruction (jmp rel32)
    const JMP_REL_SIZE: usize;

    /// size of an absolute jump stub (varies by architecture)
    const JMP_ABS_SIZE: usize;

    /// encode a near relative jump from source to target
    ///
    /// returns None if the distance exceeds the rel32 range (±2GB)
    fn encode_jmp_rel(source: usize, target: usize) -> Option<Vec<u8>>;

    /// encode an absolute jump (architecture-specific stub)
    fn encode_jmp_abs(target: usize) -> Vec<u8>;

    /// encode a NOP sled of the specified size
    fn encode_nop_sled(size: usize) -> Vec<u8>;

    /// find instruction boundary at or after `required_size` bytes
    fn find_instruction_boundary(code: &[u8], required_size: usize) -> Option<usize>;

    /// relocate an instruction that was moved to a new address
    ///
    /// returns the relocated bytes, or None if it cannot be relocated.
    fn relocate_instruction(
        instruction: &[u8],
        old_address: usize,
        new_address: usize,
    ) -> Option<Vec<u8>>;

    /// check if an instruction needs relocation when moved
    fn needs_relocation(instruction: &[u8], address: usize) -> bool;

    /// bytes a detour stub needs for this target/detour pair
    fn preferred_hook_size(target: usize, detour: usize) -> usize {
        let distance = (target as i64 - detour as i64).unsigned_abs();
        if distance <= i32::MAX as u64 {
            Self::JMP_REL_SIZE
        } else {
            Self::JMP_ABS_SIZE
        }
    }
}

/// shared multi-byte NOP sled encoder (same encoding on x86 and x64)
pub(crate) fn nop_sled(size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size);
    let mut remaining = size;

    while remaining > 0 {
        let chunk: &[u8] = match remaining {
            1 => &[0x90],
            2 => &[0x66, 0x90],
            3 => &[0x0F, 0x1F, 0x00],
            4 => &[0x0F, 0x1F, 0x40, 0x00],
            5 => &[0x0F, 0x1F, 0x44, 0x00, 0x00],
            6 => &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
            7 => &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],
            _ => &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        };
        bytes.extend_from_slice(chunk);
        remaining -= chunk.len();
    }

    bytes
}
