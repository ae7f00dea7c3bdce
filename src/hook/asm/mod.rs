//! Instruction-level support for the hook layer
//!
//! Wraps iced-x86 for decoding, boundary detection, relocation, and
//! thunk-following target resolution.

pub mod decoder;
pub mod relocator;

pub use decoder::{DecodedInstruction, InstructionDecoder};
pub use relocator::{InstructionRelocator, RelocationResult};

use iced_x86::FlowControl;

use crate::config::ThunkResolution;
use crate::util::memory::read_memory;

/// follow thunks at `address` to locate the real entry point
///
/// decodes one instruction per step: a relative call/jmp is followed to its
/// branch target, and (when the strategy allows) a RIP-indirect `jmp` is
/// followed through its pointer slot. stops at the first instruction that is
/// neither, or when `max_depth` is exhausted.
///
/// reads process memory at `address`; the caller must pass an address inside
/// mapped, readable code.
pub fn resolve_entry(address: usize, strategy: &ThunkResolution) -> usize {
    const DECODE_WINDOW: usize = 16;

    let decoder = InstructionDecoder::native();
    let mut current = address;

    for _ in 0..strategy.max_depth {
        if current == 0 {
            break;
        }

        // SAFETY: caller guarantees `current` points into mapped code
        let bytes = unsafe { core::slice::from_raw_parts(current as *const u8, DECODE_WINDOW) };

        let Some(insn) = decoder.decode_at(current, bytes) else {
            break;
        };

        let next = match insn.flow {
            FlowControl::UnconditionalBranch | FlowControl::Call => insn.branch_target,
            FlowControl::IndirectBranch if strategy.follow_indirect => insn
                .rip_target
                // SAFETY: the slot address comes from a decoded RIP-relative
                // operand inside mapped code
                .and_then(|slot| unsafe { read_memory::<usize>(slot as usize) }.ok())
                .map(|t| t as u64),
            _ => None,
        };

        match next {
            Some(target) if target != 0 => current = target as usize,
            _ => break,
        }
    }

    current
}
