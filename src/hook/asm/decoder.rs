//! Instruction decoding using iced-x86
//!
//! Provides instruction lengths, boundary detection, and branch-target
//! analysis for prologue carving and thunk resolution.

use iced_x86::{Decoder, DecoderOptions, FlowControl, Instruction, OpKind};

/// decoded instruction with the metadata the hook layer needs
#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    /// the raw iced-x86 instruction
    pub inner: Instruction,
    /// instruction length in bytes
    pub length: usize,
    /// flow-control classification
    pub flow: FlowControl,
    /// whether instruction uses relative addressing that needs relocation
    pub is_relative: bool,
    /// for relative branches, the computed absolute target address
    pub branch_target: Option<u64>,
    /// whether this is a RIP-relative memory access
    pub is_rip_relative: bool,
    /// computed absolute address for RIP-relative access
    pub rip_target: Option<u64>,
}

/// instruction decoder using iced-x86
pub struct InstructionDecoder {
    bitness: u32,
}

impl InstructionDecoder {
    /// create decoder for current architecture
    #[cfg(target_arch = "x86_64")]
    pub fn native() -> Self {
        Self { bitness: 64 }
    }

    #[cfg(target_arch = "x86")]
    pub fn native() -> Self {
        Self { bitness: 32 }
    }

    /// create 64-bit decoder
    pub fn x64() -> Self {
        Self { bitness: 64 }
    }

    /// create 32-bit decoder
    pub fn x86() -> Self {
        Self { bitness: 32 }
    }

    /// decode a single instruction at the given address
    pub fn decode_at(&self, address: usize, bytes: &[u8]) -> Option<DecodedInstruction> {
        if bytes.is_empty() {
            return None;
        }

        let mut decoder = Decoder::with_ip(self.bitness, bytes, address as u64, DecoderOptions::NONE);

        if !decoder.can_decode() {
            return None;
        }

        let instruction = decoder.decode();
        if instruction.is_invalid() {
            return None;
        }

        Some(self.analyze(instruction))
    }

    /// decode instructions until at least `min_bytes` are covered
    pub fn decode_until_size(
        &self,
        address: usize,
        bytes: &[u8],
        min_bytes: usize,
    ) -> Vec<DecodedInstruction> {
        let mut result = Vec::new();
        let mut total_size = 0;

        let mut decoder = Decoder::with_ip(self.bitness, bytes, address as u64, DecoderOptions::NONE);

        while decoder.can_decode() && total_size < min_bytes {
            let instruction = decoder.decode();
            if instruction.is_invalid() {
                break;
            }
            let decoded = self.analyze(instruction);
            total_size += decoded.length;
            result.push(decoded);
        }

        result
    }

    /// find instruction boundary at or after `required_size`
    pub fn find_boundary(&self, address: usize, bytes: &[u8], required_size: usize) -> Option<usize> {
        let instructions = self.decode_until_size(address, bytes, required_size);
        if instructions.is_empty() {
            return None;
        }

        let total: usize = instructions.iter().map(|i| i.length).sum();
        if total >= required_size {
            Some(total)
        } else {
            None
        }
    }

    fn analyze(&self, instruction: Instruction) -> DecodedInstruction {
        let length = instruction.len();
        let flow = instruction.flow_control();

        let mut is_relative = false;
        let mut branch_target = None;

        if matches!(
            flow,
            FlowControl::UnconditionalBranch | FlowControl::ConditionalBranch | FlowControl::Call
        ) && matches!(
            instruction.op0_kind(),
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
        ) {
            is_relative = true;
            branch_target = Some(instruction.near_branch_target());
        }

        let mut is_rip_relative = false;
        let mut rip_target = None;

        if self.bitness == 64 && instruction.is_ip_rel_memory_operand() {
            is_rip_relative = true;
            is_relative = true;
            rip_target = Some(instruction.ip_rel_memory_address());
        }

        DecodedInstruction {
            inner: instruction,
            length,
            flow,
            is_relative,
            branch_target,
            is_rip_relative,
            rip_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nop() {
        let decoder = InstructionDecoder::x64();
        let decoded = decoder.decode_at(0x1000, &[0x90]).unwrap();

        assert_eq!(decoded.length, 1);
        assert!(!decoded.is_relative);
        assert_eq!(decoded.flow, FlowControl::Next);
    }

    #[test]
    fn test_decode_jmp_rel32() {
        let decoder = InstructionDecoder::x64();
        // jmp +0x100 from 0x1000 -> target 0x1105
        let decoded = decoder.decode_at(0x1000, &[0xE9, 0x00, 0x01, 0x00, 0x00]).unwrap();

        assert_eq!(decoded.length, 5);
        assert!(decoded.is_relative);
        assert_eq!(decoded.flow, FlowControl::UnconditionalBranch);
        assert_eq!(decoded.branch_target, Some(0x1105));
    }

    #[test]
    fn test_decode_call_rel32() {
        let decoder = InstructionDecoder::x64();
        // call +0 from 0x1000 -> target 0x1005
        let decoded = decoder.decode_at(0x1000, &[0xE8, 0x00, 0x00, 0x00, 0x00]).unwrap();

        assert_eq!(decoded.length, 5);
        assert!(decoded.is_relative);
        assert_eq!(decoded.flow, FlowControl::Call);
        assert_eq!(decoded.branch_target, Some(0x1005));
    }

    #[test]
    fn test_decode_rip_relative() {
        let decoder = InstructionDecoder::x64();
        // mov rax, [rip+0x12345678] = 48 8B 05 78 56 34 12
        let decoded = decoder
            .decode_at(0x1000, &[0x48, 0x8B, 0x05, 0x78, 0x56, 0x34, 0x12])
            .unwrap();

        assert_eq!(decoded.length, 7);
        assert!(decoded.is_rip_relative);
        // target = IP + insn_len + disp = 0x1000 + 7 + 0x12345678
        assert_eq!(decoded.rip_target, Some(0x1234667F));
    }

    #[test]
    fn test_decode_indirect_jmp() {
        let decoder = InstructionDecoder::x64();
        // jmp [rip+0] = FF 25 00 00 00 00
        let decoded = decoder
            .decode_at(0x1000, &[0xFF, 0x25, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        assert_eq!(decoded.flow, FlowControl::IndirectBranch);
        assert!(decoded.is_rip_relative);
        // slot immediately follows the instruction
        assert_eq!(decoded.rip_target, Some(0x1006));
    }

    #[test]
    fn test_find_boundary() {
        let decoder = InstructionDecoder::x64();
        // typical x64 prologue: push rbp; mov rbp, rsp; sub rsp, 0x28
        let prologue = [0x55, 0x48, 0x89, 0xE5, 0x48, 0x83, 0xEC, 0x28];

        let boundary = decoder.find_boundary(0x1000, &prologue, 5).unwrap();
        assert!(boundary >= 5);
        assert!(boundary <= 8);
    }

    #[test]
    fn test_boundary_exact() {
        let decoder = InstructionDecoder::x64();
        // mov eax, imm32 is exactly 5 bytes
        let code = [0xB8, 0x11, 0x11, 0x00, 0x00, 0xC3];

        assert_eq!(decoder.find_boundary(0x1000, &code, 5), Some(5));
    }

    #[test]
    fn test_boundary_truncated() {
        let decoder = InstructionDecoder::x64();
        // only 3 bytes of code, need 5
        assert_eq!(decoder.find_boundary(0x1000, &[0x90, 0x90, 0x90], 5), None);
    }
}
