//! x86 (32-bit) architecture implementation

use super::Architecture;
use crate::hook::asm::{InstructionDecoder, InstructionRelocator};

/// x86 (32-bit) architecture
pub struct X86;

impl Architecture for X86 {
    // E9 rel32 - 5 bytes
    const JMP_REL_SIZE: usize = 5;

    // push imm32; ret - 6 bytes
    const JMP_ABS_SIZE: usize = 6;

    fn encode_jmp_rel(source: usize, target: usize) -> Option<Vec<u8>> {
        // the full 32-bit address space is reachable with rel32
        let offset = (target as i32).wrapping_sub((source as i32).wrapping_add(5));

        let mut bytes = Vec::with_capacity(5);
        bytes.push(0xE9);
        bytes.extend_from_slice(&offset.to_le_bytes());
        Some(bytes)
    }

    fn encode_jmp_abs(target: usize) -> Vec<u8> {
        // push imm32; ret
        let mut bytes = Vec::with_capacity(6);
        bytes.push(0x68);
        bytes.extend_from_slice(&(target as u32).to_le_bytes());
        bytes.push(0xC3);
        bytes
    }

    fn encode_nop_sled(size: usize) -> Vec<u8> {
        super::nop_sled(size)
    }

    fn find_instruction_boundary(code: &[u8], required_size: usize) -> Option<usize> {
        InstructionDecoder::x86().find_boundary(0, code, required_size)
    }

    fn relocate_instruction(
        instruction: &[u8],
        old_address: usize,
        new_address: usize,
    ) -> Option<Vec<u8>> {
        let result = InstructionRelocator::x86().relocate_instruction(
            instruction,
            old_address as u64,
            new_address as u64,
        );

        if result.success {
            Some(result.bytes)
        } else {
            None
        }
    }

    fn needs_relocation(instruction: &[u8], address: usize) -> bool {
        InstructionRelocator::x86().needs_relocation(instruction, address as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jmp_rel() {
        let bytes = X86::encode_jmp_rel(0x1000, 0x1100).unwrap();
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], 0xE9);
    }

    #[test]
    fn test_encode_jmp_abs() {
        let bytes = X86::encode_jmp_abs(0x1234_5678);
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0x68);
        assert_eq!(bytes[5], 0xC3);
        let addr = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(addr, 0x1234_5678);
    }

    #[test]
    fn test_find_instruction_boundary() {
        // push ebp; mov ebp, esp; sub esp, 0x28
        let code = [0x55, 0x89, 0xE5, 0x83, 0xEC, 0x28];

        let boundary = X86::find_instruction_boundary(&code, 5).unwrap();
        assert!(boundary >= 5);
        assert!(boundary <= 6);
    }
}
