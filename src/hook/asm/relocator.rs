//! Instruction relocation using iced-x86
//!
//! Moves prologue instructions into trampoline memory, adjusting relative
//! branches and RIP-relative operands for the new address. Short branches
//! that no longer reach are expanded; far branches fall back to absolute
//! jump stubs.

use iced_x86::{
    BlockEncoder, BlockEncoderOptions, ConditionCode, Decoder, DecoderOptions, FlowControl,
    Instruction, InstructionBlock, OpKind,
};

/// result of relocating an instruction
#[derive(Debug)]
pub struct RelocationResult {
    /// the relocated instruction bytes (empty on failure)
    pub bytes: Vec<u8>,
    /// whether relocation was successful
    pub success: bool,
    /// error message if relocation failed
    pub error: Option<String>,
}

impl RelocationResult {
    fn ok(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            success: true,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            bytes: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// instruction relocator using iced-x86
pub struct InstructionRelocator {
    bitness: u32,
}

impl InstructionRelocator {
    /// create 64-bit relocator
    pub fn x64() -> Self {
        Self { bitness: 64 }
    }

    /// create 32-bit relocator
    pub fn x86() -> Self {
        Self { bitness: 32 }
    }

    /// check if the instruction at `address` must be rewritten when moved
    pub fn needs_relocation(&self, bytes: &[u8], address: u64) -> bool {
        self.decode(bytes, address)
            .map(|i| is_position_dependent(&i, self.bitness))
            .unwrap_or(false)
    }

    /// relocate a single instruction from `old_address` to `new_address`
    pub fn relocate_instruction(
        &self,
        bytes: &[u8],
        old_address: u64,
        new_address: u64,
    ) -> RelocationResult {
        let Some(instruction) = self.decode(bytes, old_address) else {
            return RelocationResult::fail("cannot decode instruction");
        };

        let length = instruction.len();

        if !is_position_dependent(&instruction, self.bitness) {
            return RelocationResult::ok(bytes[..length].to_vec());
        }

        // re-encode at the new IP; iced recomputes rel32/RIP displacements.
        // DONT_FIX_BRANCHES makes out-of-range targets an error instead of
        // silently emitting stub code, so we can choose the fallback shape.
        let mut moved = instruction;
        moved.set_ip(new_address);

        let block = InstructionBlock::new(core::slice::from_ref(&moved), new_address);
        match BlockEncoder::encode(self.bitness, block, BlockEncoderOptions::DONT_FIX_BRANCHES) {
            Ok(encoded) => RelocationResult::ok(encoded.code_buffer),
            Err(_) => self.relocate_far(&instruction, new_address),
        }
    }

    fn decode(&self, bytes: &[u8], address: u64) -> Option<Instruction> {
        if bytes.is_empty() {
            return None;
        }

        let mut decoder = Decoder::with_ip(self.bitness, bytes, address, DecoderOptions::NONE);
        if !decoder.can_decode() {
            return None;
        }

        let instruction = decoder.decode();
        if instruction.is_invalid() {
            None
        } else {
            Some(instruction)
        }
    }

    /// fallback for branches whose target is out of rel32 range at the new IP
    fn relocate_far(&self, instruction: &Instruction, _new_address: u64) -> RelocationResult {
        let target = match instruction.op0_kind() {
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
                instruction.near_branch_target()
            }
            _ => return RelocationResult::fail("operand cannot be redirected"),
        };

        match instruction.flow_control() {
            FlowControl::UnconditionalBranch => RelocationResult::ok(self.abs_jump(target)),
            FlowControl::Call => {
                if self.bitness == 64 {
                    // call [rip+0]; addr64
                    let mut bytes = vec![0xFF, 0x15, 0x00, 0x00, 0x00, 0x00];
                    bytes.extend_from_slice(&target.to_le_bytes());
                    RelocationResult::ok(bytes)
                } else {
                    RelocationResult::fail("call target out of range")
                }
            }
            FlowControl::ConditionalBranch => {
                // invert the condition to skip over an absolute jump
                let Some(nibble) = condition_nibble(instruction.condition_code()) else {
                    return RelocationResult::fail("unsupported conditional branch");
                };

                let stub = self.abs_jump(target);
                let mut bytes = vec![0x70 + (nibble ^ 1), stub.len() as u8];
                bytes.extend_from_slice(&stub);
                RelocationResult::ok(bytes)
            }
            _ => RelocationResult::fail("RIP-relative target out of range after relocation"),
        }
    }

    fn abs_jump(&self, target: u64) -> Vec<u8> {
        if self.bitness == 64 {
            // jmp [rip+0]; addr64
            let mut bytes = vec![0xFF, 0x25, 0x00, 0x00, 0x00, 0x00];
            bytes.extend_from_slice(&target.to_le_bytes());
            bytes
        } else {
            // push imm32; ret
            let mut bytes = vec![0x68];
            bytes.extend_from_slice(&(target as u32).to_le_bytes());
            bytes.push(0xC3);
            bytes
        }
    }
}

fn is_position_dependent(instruction: &Instruction, bitness: u32) -> bool {
    match instruction.flow_control() {
        FlowControl::UnconditionalBranch | FlowControl::ConditionalBranch | FlowControl::Call => {
            matches!(
                instruction.op0_kind(),
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
            )
        }
        _ => bitness == 64 && instruction.is_ip_rel_memory_operand(),
    }
}

/// opcode nibble for a Jcc condition (0x0 = JO .. 0xF = JG)
fn condition_nibble(cc: ConditionCode) -> Option<u8> {
    let nibble = match cc {
        ConditionCode::o => 0x0,
        ConditionCode::no => 0x1,
        ConditionCode::b => 0x2,
        ConditionCode::ae => 0x3,
        ConditionCode::e => 0x4,
        ConditionCode::ne => 0x5,
        ConditionCode::be => 0x6,
        ConditionCode::a => 0x7,
        ConditionCode::s => 0x8,
        ConditionCode::ns => 0x9,
        ConditionCode::p => 0xA,
        ConditionCode::np => 0xB,
        ConditionCode::l => 0xC,
        ConditionCode::ge => 0xD,
        ConditionCode::le => 0xE,
        ConditionCode::g => 0xF,
        ConditionCode::None => return None,
    };
    Some(nibble)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_nop() {
        let relocator = InstructionRelocator::x64();
        let result = relocator.relocate_instruction(&[0x90], 0x1000, 0x2000);

        assert!(result.success);
        assert_eq!(result.bytes, vec![0x90]);
    }

    #[test]
    fn test_relocate_push() {
        let relocator = InstructionRelocator::x64();
        let result = relocator.relocate_instruction(&[0x55], 0x1000, 0x2000);

        assert!(result.success);
        assert_eq!(result.bytes, vec![0x55]);
    }

    #[test]
    fn test_relocate_jmp_rel32() {
        let relocator = InstructionRelocator::x64();
        // jmp +0x100 from 0x1000 (target: 0x1105)
        let result = relocator.relocate_instruction(&[0xE9, 0x00, 0x01, 0x00, 0x00], 0x1000, 0x2000);

        assert!(result.success);
        assert_eq!(result.bytes.len(), 5);
        assert_eq!(result.bytes[0], 0xE9);

        // new offset: 0x1105 - 0x2000 - 5 = -0xF00
        let new_offset = i32::from_le_bytes(result.bytes[1..5].try_into().unwrap());
        assert_eq!(new_offset, -0xF00);
    }

    #[test]
    fn test_relocate_call_rel32() {
        let relocator = InstructionRelocator::x64();
        // call +0 from 0x1000 (target: 0x1005)
        let result = relocator.relocate_instruction(&[0xE8, 0x00, 0x00, 0x00, 0x00], 0x1000, 0x2000);

        assert!(result.success);
        assert_eq!(result.bytes[0], 0xE8);

        // new offset: 0x1005 - 0x2000 - 5 = -0x1000
        let new_offset = i32::from_le_bytes(result.bytes[1..5].try_into().unwrap());
        assert_eq!(new_offset, -0x1000);
    }

    #[test]
    fn test_relocate_jmp_far() {
        let relocator = InstructionRelocator::x64();
        // jmp +0 from a low address, relocated far beyond rel32 range
        let result =
            relocator.relocate_instruction(&[0xE9, 0x00, 0x00, 0x00, 0x00], 0x1000, 0x2_0000_0000);

        assert!(result.success);
        // expanded to jmp [rip+0]; addr64
        assert_eq!(&result.bytes[..2], &[0xFF, 0x25]);
        let addr = u64::from_le_bytes(result.bytes[6..14].try_into().unwrap());
        assert_eq!(addr, 0x1005);
    }

    #[test]
    fn test_relocate_jcc_far() {
        let relocator = InstructionRelocator::x64();
        // jz +0x10 from 0x1000 (target 0x1012), moved out of rel32 range
        let result = relocator.relocate_instruction(&[0x74, 0x10], 0x1000, 0x2_0000_0000);

        assert!(result.success);
        // inverted short jnz skipping a 14-byte absolute jump
        assert_eq!(result.bytes[0], 0x75);
        assert_eq!(result.bytes[1], 14);
        assert_eq!(&result.bytes[2..4], &[0xFF, 0x25]);
        let addr = u64::from_le_bytes(result.bytes[8..16].try_into().unwrap());
        assert_eq!(addr, 0x1012);
    }

    #[test]
    fn test_needs_relocation() {
        let relocator = InstructionRelocator::x64();

        assert!(relocator.needs_relocation(&[0xE9, 0x00, 0x00, 0x00, 0x00], 0x1000));
        assert!(relocator.needs_relocation(&[0xE8, 0x00, 0x00, 0x00, 0x00], 0x1000));
        // mov rax, [rip+disp]
        assert!(relocator.needs_relocation(&[0x48, 0x8B, 0x05, 0x00, 0x00, 0x00, 0x00], 0x1000));
        assert!(!relocator.needs_relocation(&[0x55], 0x1000));
        assert!(!relocator.needs_relocation(&[0x90], 0x1000));
    }
}
