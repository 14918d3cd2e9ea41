//! Decoding of the handful of x86-64 instruction shapes the installer patches.

use iced_x86::{Code, Decoder, DecoderOptions, Instruction, OpKind, Register};

use installer_common::{fatal, guarantee};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NativeInstructionKind {
    /// `call rel32`
    Call,
    /// `jmp rel32`
    Jump,
    /// `mov r64, imm64`
    MovLiteral64,
    /// `call r64`, as found in inlined vtable stubs
    CallRegister,
    Other,
}

/// Byte range of an operand, as an offset into the instruction section.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OperandLocation {
    pub offset: usize,
    pub size: usize,
}

#[derive(Clone, Debug)]
pub struct NativeInstruction {
    pub offset: usize,
    pub length: usize,
    pub kind: NativeInstructionKind,
    pub displacement: Option<OperandLocation>,
    pub immediate: Option<OperandLocation>,
    pub register: Option<Register>,
    instruction: Instruction,
}

impl NativeInstruction {
    /// Decodes the instruction at `offset` of `code`, which is assembled at address `base`.
    pub fn at(code: &[u8], offset: usize, base: u64) -> Self {
        guarantee!(offset < code.len(), "instruction offset {} outside of code of size {}", offset, code.len());
        let mut decoder = Decoder::with_ip(64, &code[offset..], base + offset as u64, DecoderOptions::NONE);
        let instruction = decoder.decode();
        if instruction.is_invalid() {
            fatal!("undecodable instruction at offset {}", offset);
        }
        let constant_offsets = decoder.get_constant_offsets(&instruction);
        let displacement = if constant_offsets.has_displacement() {
            Some(OperandLocation { offset: offset + constant_offsets.displacement_offset(), size: constant_offsets.displacement_size() })
        } else {
            None
        };
        let immediate = if constant_offsets.has_immediate() {
            Some(OperandLocation { offset: offset + constant_offsets.immediate_offset(), size: constant_offsets.immediate_size() })
        } else {
            None
        };
        let kind = match instruction.code() {
            Code::Call_rel32_64 => NativeInstructionKind::Call,
            Code::Jmp_rel32_64 => NativeInstructionKind::Jump,
            Code::Mov_r64_imm64 => NativeInstructionKind::MovLiteral64,
            Code::Call_rm64 if instruction.op0_kind() == OpKind::Register => NativeInstructionKind::CallRegister,
            _ => NativeInstructionKind::Other,
        };
        let register = match kind {
            NativeInstructionKind::MovLiteral64 | NativeInstructionKind::CallRegister => Some(instruction.op0_register()),
            _ => None
        };
        Self {
            offset,
            length: instruction.len(),
            kind,
            displacement,
            immediate,
            register,
            instruction,
        }
    }

    pub fn is_call(&self) -> bool {
        self.kind == NativeInstructionKind::Call
    }

    pub fn is_jump(&self) -> bool {
        self.kind == NativeInstructionKind::Jump
    }

    pub fn is_mov_literal64(&self) -> bool {
        self.kind == NativeInstructionKind::MovLiteral64
    }

    pub fn is_call_reg(&self) -> bool {
        self.kind == NativeInstructionKind::CallRegister
    }

    pub fn next_instruction_offset(&self) -> usize {
        self.offset + self.length
    }

    /// The rel32 of a direct call or jump, always the last four bytes of the instruction.
    pub fn branch_operand(&self) -> OperandLocation {
        guarantee!(self.is_call() || self.is_jump(), "{:?} at {} has no branch operand", self.kind, self.offset);
        OperandLocation { offset: self.next_instruction_offset() - 4, size: 4 }
    }

    pub fn imm64_operand(&self) -> OperandLocation {
        match self.immediate {
            Some(immediate) if immediate.size == 8 => immediate,
            _ => fatal!("instruction at {} ({}) has no 64 bit immediate", self.offset, self.instruction)
        }
    }

    pub fn disp32_operand(&self) -> OperandLocation {
        match self.displacement {
            Some(displacement) if displacement.size == 4 => displacement,
            _ => fatal!("instruction at {} ({}) has no 32 bit displacement", self.offset, self.instruction)
        }
    }

    pub fn is_ip_relative(&self) -> bool {
        self.instruction.is_ip_rel_memory_operand()
    }

    pub fn iced(&self) -> &Instruction {
        &self.instruction
    }
}

/// rel32 needed to reach `target` from the end of an instruction ending at `next_instruction_address`.
pub fn pc_relative_displacement(target: u64, next_instruction_address: u64) -> i32 {
    let disp = target.wrapping_sub(next_instruction_address) as i64;
    guarantee!(disp == disp as i32 as i64, "displacement {:#x} to {:#x} does not fit in 32 bits", disp, target);
    disp as i32
}

#[cfg(test)]
mod tests {
    use iced_x86::Register;

    use crate::native_instruction::{NativeInstruction, NativeInstructionKind, OperandLocation, pc_relative_displacement};

    #[test]
    fn decodes_call_jump_and_mov_shapes() {
        let code = [
            0xE8, 0, 0, 0, 0, // call rel32
            0xE9, 0, 0, 0, 0, // jmp rel32
            0x49, 0xBA, 0, 0, 0, 0, 0, 0, 0, 0, // mov r10, imm64
            0x41, 0xFF, 0xD2, // call r10
        ];
        let call = NativeInstruction::at(&code, 0, 0x1000);
        assert_eq!(call.kind, NativeInstructionKind::Call);
        assert_eq!(call.next_instruction_offset(), 5);
        assert_eq!(call.branch_operand(), OperandLocation { offset: 1, size: 4 });
        let jump = NativeInstruction::at(&code, 5, 0x1000);
        assert!(jump.is_jump());
        let mov = NativeInstruction::at(&code, 10, 0x1000);
        assert!(mov.is_mov_literal64());
        assert_eq!(mov.register, Some(Register::R10));
        assert_eq!(mov.imm64_operand(), OperandLocation { offset: 12, size: 8 });
        let call_reg = NativeInstruction::at(&code, 20, 0x1000);
        assert!(call_reg.is_call_reg());
        assert_eq!(call_reg.next_instruction_offset(), 23);
    }

    #[test]
    fn locates_rip_relative_displacement() {
        // movsd xmm0, [rip + 0]
        let code = [0xF2, 0x0F, 0x10, 0x05, 0, 0, 0, 0];
        let load = NativeInstruction::at(&code, 0, 0);
        assert_eq!(load.kind, NativeInstructionKind::Other);
        assert!(load.is_ip_relative());
        assert_eq!(load.disp32_operand(), OperandLocation { offset: 4, size: 4 });
        assert_eq!(load.next_instruction_offset(), 8);
    }

    #[test]
    fn displacement_is_relative_to_next_instruction() {
        assert_eq!(pc_relative_displacement(0x2000, 0x1005), 0xFFB);
        assert_eq!(pc_relative_displacement(0x1000, 0x1005), -5);
    }

    #[test]
    #[should_panic(expected = "does not fit in 32 bits")]
    fn far_displacement_is_fatal() {
        pc_relative_displacement(0x7fff_0000_0000, 0x1000);
    }
}
